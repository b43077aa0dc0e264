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

//! Domain events.
//!
//! Operations do not talk to a notification framework. Each successful call
//! returns a [`Committed`] value carrying the events it produced, and the
//! boundary decides how to deliver them (see [`crate::notify`]).

use crate::base::{BidId, CaseId, InvestmentId, UserId, WithdrawalId};
use crate::case::{CaseStatus, Outcome};
use crate::withdrawal::WithdrawalStatus;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    CaseSubmitted {
        case_id: CaseId,
        victim_id: UserId,
    },
    CaseStatusChanged {
        case_id: CaseId,
        victim_id: UserId,
        lawyer_id: Option<UserId>,
        from: CaseStatus,
        to: CaseStatus,
    },
    LawyerAssigned {
        case_id: CaseId,
        victim_id: UserId,
        lawyer_id: UserId,
    },
    BidSubmitted {
        case_id: CaseId,
        bid_id: BidId,
        lawyer_id: UserId,
    },
    BidReviewed {
        case_id: CaseId,
        bid_id: BidId,
        lawyer_id: UserId,
        score: u8,
    },
    BidAccepted {
        case_id: CaseId,
        bid_id: BidId,
        lawyer_id: UserId,
    },
    BidRejected {
        case_id: CaseId,
        bid_id: BidId,
        lawyer_id: UserId,
        feedback: String,
    },
    BidWithdrawn {
        case_id: CaseId,
        bid_id: BidId,
        lawyer_id: UserId,
    },
    InvestmentCreated {
        case_id: CaseId,
        investment_id: InvestmentId,
        investor_id: UserId,
        amount: Decimal,
    },
    InvestmentConfirmed {
        case_id: CaseId,
        investment_id: InvestmentId,
        investor_id: UserId,
    },
    InvestmentCancelled {
        case_id: CaseId,
        investment_id: InvestmentId,
        investor_id: UserId,
        amount: Decimal,
    },
    FundingGoalReached {
        case_id: CaseId,
        victim_id: UserId,
        lawyer_id: Option<UserId>,
        funding_goal: Decimal,
    },
    CaseClosed {
        case_id: CaseId,
        victim_id: UserId,
        outcome: Outcome,
        amount_recovered: Decimal,
    },
    LawyerPaid {
        case_id: CaseId,
        lawyer_id: UserId,
        amount: Decimal,
    },
    ReturnPaid {
        case_id: CaseId,
        investment_id: InvestmentId,
        investor_id: UserId,
        amount: Decimal,
    },
    WithdrawalStatusChanged {
        withdrawal_id: WithdrawalId,
        user_id: UserId,
        status: WithdrawalStatus,
    },
}

impl DomainEvent {
    pub fn case_id(&self) -> Option<CaseId> {
        match self {
            Self::CaseSubmitted { case_id, .. }
            | Self::CaseStatusChanged { case_id, .. }
            | Self::LawyerAssigned { case_id, .. }
            | Self::BidSubmitted { case_id, .. }
            | Self::BidReviewed { case_id, .. }
            | Self::BidAccepted { case_id, .. }
            | Self::BidRejected { case_id, .. }
            | Self::BidWithdrawn { case_id, .. }
            | Self::InvestmentCreated { case_id, .. }
            | Self::InvestmentConfirmed { case_id, .. }
            | Self::InvestmentCancelled { case_id, .. }
            | Self::FundingGoalReached { case_id, .. }
            | Self::CaseClosed { case_id, .. }
            | Self::LawyerPaid { case_id, .. }
            | Self::ReturnPaid { case_id, .. } => Some(*case_id),
            Self::WithdrawalStatusChanged { .. } => None,
        }
    }
}

/// Result of a committed operation plus the events it raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Committed<T> {
    pub fn new(value: T, events: Vec<DomainEvent>) -> Self {
        Self { value, events }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Committed<U> {
        Committed {
            value: f(self.value),
            events: self.events,
        }
    }
}
