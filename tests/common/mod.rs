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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use casefund::{
    BidProposal, CaseClosure, CaseId, CaseStatus, CaseSubmission, InvestmentId, LawyerTerms,
    Marketplace, Outcome, Principal, Repository, UserId,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

pub fn admin() -> Principal {
    Principal::admin(UserId(1))
}

pub fn victim() -> Principal {
    Principal::victim(UserId(2))
}

pub fn lawyer() -> Principal {
    Principal::lawyer(UserId(3))
}

pub fn other_lawyer() -> Principal {
    Principal::lawyer(UserId(4))
}

pub fn investor(n: u64) -> Principal {
    Principal::investor(UserId(100 + n))
}

pub fn submission(goal: Decimal) -> CaseSubmission {
    CaseSubmission {
        title: "Unpaid overtime".into(),
        description: "Two years of unpaid overtime at a warehouse".into(),
        category: "labor".into(),
        company: "Acme Logistics".into(),
        funding_goal: goal,
        deadline: None,
        bid_deadline: None,
    }
}

pub fn terms(goal: Decimal) -> LawyerTerms {
    LawyerTerms {
        funding_goal: goal,
        expected_return: dec!(20),
        success_rate: dec!(70),
        evaluation_fee: Decimal::ZERO,
        success_fee_percentage: dec!(10),
        fixed_fee: dec!(2000000),
    }
}

pub fn proposal(goal: Decimal) -> BidProposal {
    BidProposal {
        funding_goal_proposed: goal,
        expected_return_percentage: dec!(25),
        lawyer_evaluation_fee: dec!(500),
        lawyer_success_fee_percentage: dec!(15),
        lawyer_fixed_fee: dec!(1000),
        success_probability: dec!(65),
        estimated_duration_months: 18,
        legal_strategy: "Demand letter, then file suit".into(),
        experience_summary: "Ten years of employment litigation".into(),
        additional_notes: None,
    }
}

pub fn evaluate<R: Repository>(market: &Marketplace<R>, case_id: CaseId, target: CaseStatus) {
    market
        .evaluate(&admin(), case_id, target, BTreeMap::new())
        .unwrap();
}

/// A fresh case in `approved_for_bidding`.
pub fn case_open_for_bidding<R: Repository>(market: &Marketplace<R>) -> CaseId {
    let case = market
        .submit(&victim(), submission(dec!(50000)))
        .unwrap()
        .into_value();
    evaluate(market, case.id, CaseStatus::UnderAdminReview);
    evaluate(market, case.id, CaseStatus::ApprovedForBidding);
    case.id
}

/// A `published` case taken directly by [`lawyer`] with [`terms`].
pub fn published_case<R: Repository>(market: &Marketplace<R>, goal: Decimal) -> CaseId {
    let case = market
        .submit(&victim(), submission(goal))
        .unwrap()
        .into_value();
    market
        .assign_lawyer_direct(&lawyer(), case.id, terms(goal))
        .unwrap();
    evaluate(market, case.id, CaseStatus::Published);
    case.id
}

/// Invests and confirms the payment.
pub fn fund<R: Repository>(
    market: &Marketplace<R>,
    case_id: CaseId,
    who: &Principal,
    amount: Decimal,
) -> InvestmentId {
    let investment = market
        .create_investment(who, case_id, amount)
        .unwrap()
        .into_value();
    market
        .confirm_investment(&admin(), investment.id, format!("pay-{}", investment.id))
        .unwrap();
    investment.id
}

pub fn closure(outcome: Outcome, recovered: Decimal, legal_costs: Decimal) -> CaseClosure {
    CaseClosure {
        outcome,
        amount_recovered: recovered,
        legal_costs,
        outcome_description: "Settled in court".into(),
        resolution_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
    }
}

/// Goal 10,000,000 funded 3,000,000 + 7,000,000, closed as won with
/// 10,000,000 recovered and 1,000,000 legal costs. Lawyer terms: fixed fee
/// 2,000,000, success fee 10%.
pub fn won_case<R: Repository>(market: &Marketplace<R>) -> (CaseId, InvestmentId, InvestmentId) {
    let case_id = published_case(market, dec!(10000000));
    let first = fund(market, case_id, &investor(1), dec!(3000000));
    let second = fund(market, case_id, &investor(2), dec!(7000000));
    market
        .close(
            &lawyer(),
            case_id,
            closure(Outcome::Won, dec!(10000000), dec!(1000000)),
        )
        .unwrap();
    (case_id, first, second)
}
