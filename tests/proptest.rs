// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Property-based tests for the marketplace engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! operations.

mod common;

use casefund::{
    Case, CaseId, CaseStatus, InvestmentStatus, Marketplace, MarketplaceError, UserId,
    WithdrawalMethod, settlement::split_returns,
};
use chrono::Utc;
use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 5000.00).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_status() -> impl Strategy<Value = CaseStatus> {
    prop::sample::select(CaseStatus::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    Invest { investor: u64, amount: Decimal },
    Cancel { pick: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u64..5, arb_amount()).prop_map(|(investor, amount)| Op::Invest { investor, amount }),
        1 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
    ]
}

// =============================================================================
// Funding Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// `current_funding` never exceeds the goal and always equals the sum of
    /// live investments.
    #[test]
    fn funding_never_exceeds_goal(
        goal in (100i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let market = Marketplace::new();
        let case_id = published_case(&market, goal);

        for op in ops {
            match op {
                Op::Invest { investor: n, amount } => {
                    let remaining = {
                        let case = market.case(case_id).unwrap();
                        case.funding_goal - case.current_funding
                    };
                    match market.create_investment(&investor(n), case_id, amount) {
                        Ok(_) => prop_assert!(amount <= remaining),
                        Err(MarketplaceError::FundingExceeded { .. }) => {
                            prop_assert!(amount > remaining)
                        }
                        Err(MarketplaceError::InvalidStateTransition { .. }) => {
                            let status = market.case(case_id).unwrap().status;
                            prop_assert_eq!(status, CaseStatus::Funded)
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                }
                Op::Cancel { pick } => {
                    let pending: Vec<_> = market
                        .investments_for_case(case_id)
                        .unwrap()
                        .into_iter()
                        .filter(|inv| inv.status == InvestmentStatus::Pending)
                        .collect();
                    if let Some(inv) = pending.get(pick % pending.len().max(1)) {
                        let _ = market.cancel_investment(&admin(), inv.id);
                    }
                }
            }

            let case = market.case(case_id).unwrap();
            prop_assert!(case.current_funding <= case.funding_goal);
            let live: Decimal = market
                .investments_for_case(case_id)
                .unwrap()
                .iter()
                .filter(|inv| inv.status != InvestmentStatus::Cancelled)
                .map(|inv| inv.amount)
                .sum();
            prop_assert_eq!(case.current_funding, live);
            prop_assert_eq!(
                case.status == CaseStatus::Funded,
                case.current_funding == case.funding_goal
            );
        }
    }

    /// Creating then cancelling a pending investment restores funding exactly,
    /// unless the investment filled the goal and the case is already funded.
    #[test]
    fn create_then_cancel_restores_funding(
        first in arb_amount(),
        second in arb_amount(),
        fills_goal in any::<bool>(),
    ) {
        let goal = if fills_goal { first + second } else { dec!(20000) };
        let market = Marketplace::new();
        let case_id = published_case(&market, goal);
        market.create_investment(&investor(1), case_id, first).unwrap();
        let before = market.case(case_id).unwrap().current_funding;

        let investment = market
            .create_investment(&investor(2), case_id, second)
            .unwrap()
            .value;
        let cancelled = market.cancel_investment(&investor(2), investment.id);

        let case = market.case(case_id).unwrap();
        if fills_goal {
            prop_assert!(matches!(
                cancelled,
                Err(MarketplaceError::InvalidStateTransition { .. })
            ), "expected InvalidStateTransition, got {:?}", cancelled);
            prop_assert_eq!(case.status, CaseStatus::Funded);
            prop_assert_eq!(case.current_funding, goal);
        } else {
            prop_assert!(cancelled.is_ok());
            prop_assert_eq!(case.current_funding, before);
        }
    }
}

// =============================================================================
// State Machine Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A transition succeeds iff it is in the table; a refused one leaves the
    /// case untouched.
    #[test]
    fn transition_legal_iff_in_table(from in arb_status(), to in arb_status()) {
        let mut case = Case::new(CaseId(1), UserId(1), submission(dec!(1000)), Utc::now());
        case.status = from;
        let before = case.clone();

        match case.transition_to(to, Utc::now()) {
            Ok(previous) => {
                prop_assert!(from.allowed_transitions().contains(&to));
                prop_assert_eq!(previous, from);
                prop_assert_eq!(case.status, to);
            }
            Err(_) => {
                prop_assert!(!from.can_transition_to(to));
                prop_assert_eq!(case, before);
            }
        }
    }
}

// =============================================================================
// Settlement and Withdrawal Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Rounded shares always add up to the rounded net distributable.
    #[test]
    fn shares_sum_to_net(
        net in (1i64..=1_000_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        amounts in prop::collection::vec(arb_amount(), 1..12),
    ) {
        let market = Marketplace::new();
        let goal: Decimal = amounts.iter().copied().sum();
        let case_id = published_case(&market, goal);
        for (i, amount) in amounts.iter().enumerate() {
            fund(&market, case_id, &investor(i as u64), *amount);
        }
        let investments = market.investments_for_case(case_id).unwrap();

        let split = split_returns(net, &investments, dec!(10));
        let total: Decimal = split.iter().map(|r| r.proportional_return).sum();
        prop_assert_eq!(total, net);
        for share in &split {
            prop_assert!(share.success_commission >= Decimal::ZERO);
            prop_assert!(share.actual_return <= share.proportional_return);
            prop_assert_eq!(
                share.actual_return,
                share.proportional_return - share.success_commission
            );
        }
    }

    /// A withdrawal's net amount is always its amount minus the fee.
    #[test]
    fn withdrawal_net_is_amount_minus_fee(amount in arb_amount()) {
        let market = Marketplace::new();
        let (case_id, _, _) = won_case(&market);
        market.distribute_returns(&admin(), case_id).unwrap();

        let withdrawal = market
            .request_withdrawal(&investor(1), amount, WithdrawalMethod::BankTransfer, String::new())
            .unwrap()
            .value;
        prop_assert_eq!(withdrawal.net_amount, withdrawal.amount - withdrawal.fee);
        prop_assert!(withdrawal.fee >= Decimal::ZERO);
    }
}
