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

//! Investment accounting.
//!
//! Investments are only accepted while a case is `published`. The room-left
//! check and the `current_funding` increment happen under the case lock, so
//! concurrent investors can never push a case past its goal. An over-sized
//! request is rejected with the remaining capacity rather than clamped.

use crate::MarketplaceError;
use crate::base::{CaseId, InvestmentId, Principal, Role, percent_of};
use crate::case::{CaseStatus, check_amount};
use crate::engine::{Marketplace, require_admin};
use crate::error::Result;
use crate::event::{Committed, DomainEvent};
use crate::investment::{Investment, InvestmentStatus};
use crate::lifecycle::status_changed;
use crate::store::{Repository, Sequence, UnitOfWork};
use crate::transaction::{Direction, Transaction, TransactionKind, TransactionStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

impl<R: Repository> Marketplace<R> {
    /// Commits `amount` of the investor's capital to a published case.
    ///
    /// Charges the platform commission up front and records both ledger rows
    /// as pending until the payment is confirmed. Reaching the goal flips the
    /// case to `funded`.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::InvalidStateTransition`] - case is not published.
    /// - [`MarketplaceError::FundingExceeded`] - `amount` is more than the room left.
    /// - [`MarketplaceError::ValidationFailed`] - non-positive or sub-cent amount.
    pub fn create_investment(
        &self,
        principal: &Principal,
        case_id: CaseId,
        amount: Decimal,
    ) -> Result<Committed<Investment>> {
        if principal.role != Role::Investor {
            return Err(MarketplaceError::Unauthorized);
        }
        check_amount("amount", amount)?;

        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        if case.status != CaseStatus::Published {
            return Err(MarketplaceError::transition(
                "case",
                case.status,
                CaseStatus::Funded,
            ));
        }
        let remaining = case.remaining_funding();
        if amount > remaining {
            debug!(
                case_id = %case_id,
                requested = %amount,
                remaining = %remaining,
                "investment exceeds goal"
            );
            return Err(MarketplaceError::FundingExceeded {
                requested: amount,
                remaining,
            });
        }

        let now = Utc::now();
        let policy = self.policy();
        let id = InvestmentId(self.repository().next_id(Sequence::Investment));
        let investment = Investment {
            id,
            case_id,
            investor_id: principal.user_id,
            amount,
            expected_return_percentage: case.expected_return,
            expected_return_amount: percent_of(amount, case.expected_return),
            status: InvestmentStatus::Pending,
            platform_commission_percentage: policy.platform_commission_percentage,
            platform_commission_amount: percent_of(amount, policy.platform_commission_percentage),
            success_commission_percentage: policy.success_commission_percentage,
            success_commission_amount: Decimal::ZERO,
            actual_return: None,
            payment_reference: None,
            created_at: now,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        let mut unit = UnitOfWork::new();
        unit.record(
            Transaction::new(
                self.next_transaction_id(),
                TransactionKind::Investment,
                Direction::In,
                amount,
                TransactionStatus::Pending,
                now,
            )
            .for_case(case_id)
            .for_investment(id)
            .for_user(principal.user_id)
            .described(format!("Investment in case {case_id}")),
        );
        if investment.platform_commission_amount > Decimal::ZERO {
            unit.record(
                Transaction::new(
                    self.next_transaction_id(),
                    TransactionKind::PlatformCommission,
                    Direction::In,
                    investment.platform_commission_amount,
                    TransactionStatus::Pending,
                    now,
                )
                .for_case(case_id)
                .for_investment(id)
                .for_user(principal.user_id)
                .described(format!(
                    "Platform commission {}% on investment {id}",
                    investment.platform_commission_percentage
                )),
            );
        }

        let mut events = vec![DomainEvent::InvestmentCreated {
            case_id,
            investment_id: id,
            investor_id: principal.user_id,
            amount,
        }];

        case.current_funding += amount;
        case.updated_at = now;
        if case.current_funding >= case.funding_goal {
            let from = case.transition_to(CaseStatus::Funded, now)?;
            case.funded_at = Some(now);
            events.push(status_changed(&case, from));
            events.push(DomainEvent::FundingGoalReached {
                case_id,
                victim_id: case.victim_id,
                lawyer_id: case.lawyer_id,
                funding_goal: case.funding_goal,
            });
        }
        debug_assert!(case.current_funding <= case.funding_goal);

        unit.put_investment(investment.clone()).put_case(case.clone());
        self.commit(unit)?;

        info!(
            case_id = %case_id,
            investment_id = %id,
            investor_id = %principal.user_id,
            amount = %amount,
            current_funding = %case.current_funding,
            funding_goal = %case.funding_goal,
            "investment created"
        );
        Ok(Committed::new(investment, events))
    }

    /// Marks a pending investment as paid and settles its ledger rows.
    pub fn confirm_investment(
        &self,
        principal: &Principal,
        investment_id: InvestmentId,
        payment_reference: String,
    ) -> Result<Committed<Investment>> {
        require_admin(principal)?;
        if payment_reference.trim().is_empty() {
            return Err(MarketplaceError::validation(
                "payment_reference",
                "must not be empty",
            ));
        }
        let case_id = self.investment(investment_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut investment = self.investment(investment_id)?;
        if investment.status != InvestmentStatus::Pending {
            return Err(MarketplaceError::transition(
                "investment",
                investment.status,
                InvestmentStatus::Confirmed,
            ));
        }
        let now = Utc::now();
        investment.status = InvestmentStatus::Confirmed;
        investment.confirmed_at = Some(now);
        investment.payment_reference = Some(payment_reference);

        let mut unit = UnitOfWork::new();
        for row in self.repository().transactions_for_investment(investment_id)? {
            if row.status == TransactionStatus::Pending {
                unit.record(row.advanced(TransactionStatus::Completed, now)?);
            }
        }
        unit.put_investment(investment.clone());
        self.commit(unit)?;

        info!(investment_id = %investment_id, case_id = %case_id, "investment confirmed");
        let events = vec![DomainEvent::InvestmentConfirmed {
            case_id,
            investment_id,
            investor_id: investment.investor_id,
        }];
        Ok(Committed::new(investment, events))
    }

    /// Cancels a pending investment and gives its amount back to the case.
    ///
    /// Only the investor or an admin may cancel, and only while the case is
    /// still raising (`published`).
    pub fn cancel_investment(
        &self,
        principal: &Principal,
        investment_id: InvestmentId,
    ) -> Result<Committed<Investment>> {
        let case_id = self.investment(investment_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut investment = self.investment(investment_id)?;
        if !principal.is_admin() && investment.investor_id != principal.user_id {
            return Err(MarketplaceError::Unauthorized);
        }
        if investment.status != InvestmentStatus::Pending {
            return Err(MarketplaceError::transition(
                "investment",
                investment.status,
                InvestmentStatus::Cancelled,
            ));
        }
        let mut case = self.case(case_id)?;
        if case.status != CaseStatus::Published {
            return Err(MarketplaceError::transition(
                "case",
                case.status,
                CaseStatus::Published,
            ));
        }

        let now = Utc::now();
        case.current_funding -= investment.amount;
        case.updated_at = now;
        investment.status = InvestmentStatus::Cancelled;
        investment.cancelled_at = Some(now);

        let mut unit = UnitOfWork::new();
        for row in self.repository().transactions_for_investment(investment_id)? {
            if row.status == TransactionStatus::Pending {
                unit.record(row.advanced(TransactionStatus::Failed, now)?);
            }
        }
        unit.put_investment(investment.clone()).put_case(case.clone());
        self.commit(unit)?;

        info!(
            investment_id = %investment_id,
            case_id = %case_id,
            current_funding = %case.current_funding,
            "investment cancelled"
        );
        let events = vec![DomainEvent::InvestmentCancelled {
            case_id,
            investment_id,
            investor_id: investment.investor_id,
            amount: investment.amount,
        }];
        Ok(Committed::new(investment, events))
    }
}
