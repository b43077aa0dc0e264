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

//! Case entity and its lifecycle state machine.
//!
//! Two flows share one transition table. The bidding flow:
//!
//! ```text
//! submitted ─► under_admin_review ─► approved_for_bidding ─► receiving_bids ─► bids_closed
//!                                           ▲                      │              │
//!                                           └──────── reopen ──────┼──────────────┘
//!                                                                  ▼
//!                                   lawyer_assigned ◄──────────────┘
//!                                          │
//!                                          ▼
//!                         published ─► funded ─► in_progress ─► completed
//! ```
//!
//! The direct flow, used when a lawyer takes a case without bidding:
//! `submitted / under_review ─► approved ─► published ─► ...`.
//!
//! `rejected` is reachable from the early review states. `completed` and
//! `rejected` are terminal.

use crate::MarketplaceError;
use crate::base::{CaseId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Submitted,
    UnderAdminReview,
    UnderReview,
    ApprovedForBidding,
    ReceivingBids,
    BidsClosed,
    LawyerAssigned,
    Approved,
    Published,
    Funded,
    InProgress,
    Completed,
    Rejected,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 13] = [
        Self::Submitted,
        Self::UnderAdminReview,
        Self::UnderReview,
        Self::ApprovedForBidding,
        Self::ReceivingBids,
        Self::BidsClosed,
        Self::LawyerAssigned,
        Self::Approved,
        Self::Published,
        Self::Funded,
        Self::InProgress,
        Self::Completed,
        Self::Rejected,
    ];

    /// Targets reachable from this status in one step.
    pub fn allowed_transitions(self) -> &'static [CaseStatus] {
        use CaseStatus::*;
        match self {
            Submitted => &[UnderAdminReview, UnderReview, Approved, Rejected],
            UnderAdminReview => &[ApprovedForBidding, Rejected],
            UnderReview => &[Approved, Rejected],
            ApprovedForBidding => &[ReceivingBids],
            ReceivingBids => &[BidsClosed, LawyerAssigned],
            BidsClosed => &[LawyerAssigned, ApprovedForBidding],
            LawyerAssigned => &[Published],
            Approved => &[Published],
            Published => &[Funded],
            Funded => &[InProgress, Completed],
            InProgress => &[Completed],
            Completed | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, target: CaseStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Lawyers may submit proposals.
    pub fn is_open_for_bidding(self) -> bool {
        matches!(self, Self::ApprovedForBidding | Self::ReceivingBids)
    }

    /// A winning bid may be selected.
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::ReceivingBids | Self::BidsClosed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderAdminReview => "under_admin_review",
            Self::UnderReview => "under_review",
            Self::ApprovedForBidding => "approved_for_bidding",
            Self::ReceivingBids => "receiving_bids",
            Self::BidsClosed => "bids_closed",
            Self::LawyerAssigned => "lawyer_assigned",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Funded => "funded",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| MarketplaceError::validation("status", format!("unknown status `{s}`")))
    }
}

/// Result of the legal proceedings, recorded at closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    Lost,
    Settled,
    Dismissed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Settled => "settled",
            Self::Dismissed => "dismissed",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Outcome {
    type Err = MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            "settled" => Ok(Self::Settled),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(MarketplaceError::validation(
                "outcome",
                format!("must be one of won, lost, settled, dismissed (got `{other}`)"),
            )),
        }
    }
}

/// Victim-supplied description of a new case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSubmission {
    pub title: String,
    pub description: String,
    pub category: String,
    pub company: String,
    /// Victim's estimate; replaced by the winning proposal.
    pub funding_goal: Decimal,
    pub deadline: Option<DateTime<Utc>>,
    pub bid_deadline: Option<DateTime<Utc>>,
}

impl CaseSubmission {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.title.trim().is_empty() {
            return Err(MarketplaceError::validation("title", "must not be empty"));
        }
        check_fee("funding_goal", self.funding_goal)
    }
}

/// Economic terms a lawyer brings to a case, from a bid or direct assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawyerTerms {
    pub funding_goal: Decimal,
    pub expected_return: Decimal,
    pub success_rate: Decimal,
    pub evaluation_fee: Decimal,
    pub success_fee_percentage: Decimal,
    pub fixed_fee: Decimal,
}

impl LawyerTerms {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        check_amount("funding_goal", self.funding_goal)?;
        check_percentage("expected_return", self.expected_return)?;
        check_percentage("success_rate", self.success_rate)?;
        check_fee("evaluation_fee", self.evaluation_fee)?;
        check_percentage("success_fee_percentage", self.success_fee_percentage)?;
        check_fee("fixed_fee", self.fixed_fee)
    }
}

fn check_positive(field: &'static str, value: Decimal) -> Result<(), MarketplaceError> {
    if value <= Decimal::ZERO {
        return Err(MarketplaceError::validation(field, "must be positive"));
    }
    Ok(())
}

fn check_cents(field: &'static str, value: Decimal) -> Result<(), MarketplaceError> {
    if crate::base::round_money(value) != value {
        return Err(MarketplaceError::validation(
            field,
            "must have at most two decimal places",
        ));
    }
    Ok(())
}

/// A positive amount with no fraction of a cent.
pub(crate) fn check_amount(field: &'static str, value: Decimal) -> Result<(), MarketplaceError> {
    check_positive(field, value)?;
    check_cents(field, value)
}

/// A fee or estimate: zero allowed, no fraction of a cent.
pub(crate) fn check_fee(field: &'static str, value: Decimal) -> Result<(), MarketplaceError> {
    check_non_negative(field, value)?;
    check_cents(field, value)
}

pub(crate) fn check_non_negative(
    field: &'static str,
    value: Decimal,
) -> Result<(), MarketplaceError> {
    if value < Decimal::ZERO {
        return Err(MarketplaceError::validation(field, "must not be negative"));
    }
    Ok(())
}

pub(crate) fn check_percentage(
    field: &'static str,
    value: Decimal,
) -> Result<(), MarketplaceError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(MarketplaceError::validation(
            field,
            "must be between 0 and 100",
        ));
    }
    Ok(())
}

/// A legal claim submitted by a victim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub company: String,
    pub victim_id: UserId,
    pub lawyer_id: Option<UserId>,
    pub status: CaseStatus,

    pub funding_goal: Decimal,
    pub current_funding: Decimal,
    pub success_rate: Decimal,
    pub expected_return: Decimal,
    pub deadline: Option<DateTime<Utc>>,
    pub is_public_marketplace: bool,
    pub bid_deadline: Option<DateTime<Utc>>,

    pub lawyer_evaluation_fee: Decimal,
    pub lawyer_success_fee_percentage: Decimal,
    pub lawyer_fixed_fee: Decimal,
    pub lawyer_total_compensation: Option<Decimal>,
    pub lawyer_paid_at: Option<DateTime<Utc>>,

    pub outcome: Option<Outcome>,
    pub amount_recovered: Option<Decimal>,
    pub legal_costs: Option<Decimal>,
    pub outcome_description: Option<String>,
    pub resolution_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Opaque reviewer metadata merged in by each evaluation.
    pub evaluation: BTreeMap<String, serde_json::Value>,
    pub evaluated_by: Option<UserId>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub funded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn new(
        id: CaseId,
        victim_id: UserId,
        submission: CaseSubmission,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: submission.title,
            description: submission.description,
            category: submission.category,
            company: submission.company,
            victim_id,
            lawyer_id: None,
            status: CaseStatus::Submitted,
            funding_goal: submission.funding_goal,
            current_funding: Decimal::ZERO,
            success_rate: Decimal::ZERO,
            expected_return: Decimal::ZERO,
            deadline: submission.deadline,
            is_public_marketplace: false,
            bid_deadline: submission.bid_deadline,
            lawyer_evaluation_fee: Decimal::ZERO,
            lawyer_success_fee_percentage: Decimal::ZERO,
            lawyer_fixed_fee: Decimal::ZERO,
            lawyer_total_compensation: None,
            lawyer_paid_at: None,
            outcome: None,
            amount_recovered: None,
            legal_costs: None,
            outcome_description: None,
            resolution_date: None,
            closed_at: None,
            evaluation: BTreeMap::new(),
            evaluated_by: None,
            evaluated_at: None,
            published_at: None,
            funded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the case to `target` if the transition table allows it.
    ///
    /// On error the case is left untouched.
    pub fn transition_to(
        &mut self,
        target: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<CaseStatus, MarketplaceError> {
        if !self.status.can_transition_to(target) {
            return Err(MarketplaceError::transition("case", self.status, target));
        }
        let previous = self.status;
        self.status = target;
        self.updated_at = now;
        Ok(previous)
    }

    /// Capacity left before the funding goal is reached.
    pub fn remaining_funding(&self) -> Decimal {
        (self.funding_goal - self.current_funding).max(Decimal::ZERO)
    }

    pub fn apply_terms(&mut self, lawyer_id: UserId, terms: &LawyerTerms) {
        self.lawyer_id = Some(lawyer_id);
        self.funding_goal = terms.funding_goal;
        self.expected_return = terms.expected_return;
        self.success_rate = terms.success_rate;
        self.lawyer_evaluation_fee = terms.evaluation_fee;
        self.lawyer_success_fee_percentage = terms.success_fee_percentage;
        self.lawyer_fixed_fee = terms.fixed_fee;
    }

    pub fn is_assigned_lawyer(&self, user_id: UserId) -> bool {
        self.lawyer_id == Some(user_id)
    }
}
