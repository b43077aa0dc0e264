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

//! Lawyer proposals against a case.
//!
//! ```text
//! draft ──► submitted ──► under_review ──► accepted
//!   │           │              │
//!   │           │              └──► rejected
//!   └───────────┴──────────────┴──► withdrawn
//! ```

use crate::MarketplaceError;
use crate::base::{BidId, CaseId, UserId};
use crate::case::{LawyerTerms, check_amount, check_fee, check_percentage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feedback attached to bids that lose to the selected proposal.
pub const NOT_SELECTED_FEEDBACK: &str = "Another proposal was selected for this case.";

pub const MIN_DURATION_MONTHS: u32 = 1;
pub const MAX_DURATION_MONTHS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Withdrawn,
}

impl BidStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Withdrawn)
    }

    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }

    pub fn is_withdrawable(self) -> bool {
        matches!(self, Self::Draft | Self::Submitted | Self::UnderReview)
    }

    /// Visible to admins and eligible to win.
    pub fn is_competing(self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview)
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        };
        f.write_str(name)
    }
}

/// Economic and technical terms of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidProposal {
    pub funding_goal_proposed: Decimal,
    pub expected_return_percentage: Decimal,
    pub lawyer_evaluation_fee: Decimal,
    pub lawyer_success_fee_percentage: Decimal,
    pub lawyer_fixed_fee: Decimal,
    pub success_probability: Decimal,
    pub estimated_duration_months: u32,
    pub legal_strategy: String,
    pub experience_summary: String,
    pub additional_notes: Option<String>,
}

impl BidProposal {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        check_amount("funding_goal_proposed", self.funding_goal_proposed)?;
        check_percentage(
            "expected_return_percentage",
            self.expected_return_percentage,
        )?;
        check_fee("lawyer_evaluation_fee", self.lawyer_evaluation_fee)?;
        check_percentage(
            "lawyer_success_fee_percentage",
            self.lawyer_success_fee_percentage,
        )?;
        check_fee("lawyer_fixed_fee", self.lawyer_fixed_fee)?;
        check_percentage("success_probability", self.success_probability)?;
        if !(MIN_DURATION_MONTHS..=MAX_DURATION_MONTHS).contains(&self.estimated_duration_months) {
            return Err(MarketplaceError::validation(
                "estimated_duration_months",
                format!("must be between {MIN_DURATION_MONTHS} and {MAX_DURATION_MONTHS}"),
            ));
        }
        if self.legal_strategy.trim().is_empty() {
            return Err(MarketplaceError::validation(
                "legal_strategy",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Terms copied onto the case when this proposal wins.
    pub fn terms(&self) -> LawyerTerms {
        LawyerTerms {
            funding_goal: self.funding_goal_proposed,
            expected_return: self.expected_return_percentage,
            success_rate: self.success_probability,
            evaluation_fee: self.lawyer_evaluation_fee,
            success_fee_percentage: self.lawyer_success_fee_percentage,
            fixed_fee: self.lawyer_fixed_fee,
        }
    }
}

/// A lawyer's proposal to represent a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawyerBid {
    pub id: BidId,
    pub case_id: CaseId,
    pub lawyer_id: UserId,
    pub proposal: BidProposal,
    pub status: BidStatus,
    pub admin_score: Option<u8>,
    pub admin_feedback: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LawyerBid {
    pub fn new(
        id: BidId,
        case_id: CaseId,
        lawyer_id: UserId,
        proposal: BidProposal,
        status: BidStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            case_id,
            lawyer_id,
            proposal,
            status,
            admin_score: None,
            admin_feedback: None,
            reviewed_by: None,
            reviewed_at: None,
            submitted_at: (status == BidStatus::Submitted).then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Closes a losing or refused bid with reviewer feedback.
    pub fn reject(&mut self, reviewer: UserId, feedback: &str, now: DateTime<Utc>) {
        self.status = BidStatus::Rejected;
        self.admin_feedback = Some(feedback.to_owned());
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.updated_at = now;
    }
}
