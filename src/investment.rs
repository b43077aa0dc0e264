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

//! Investor positions in a case.

use crate::base::{CaseId, InvestmentId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

//  pending ──confirm──► confirmed ──case in_progress──► active
//     │                     │                             │
//     └──cancel──► cancelled└───────────distribute────────┴──► completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl InvestmentStatus {
    /// Paid-in capital that takes part in distribution.
    pub fn is_settleable(self) -> bool {
        matches!(self, Self::Confirmed | Self::Active)
    }
}

impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub case_id: CaseId,
    pub investor_id: UserId,
    pub amount: Decimal,
    pub expected_return_percentage: Decimal,
    pub expected_return_amount: Decimal,
    pub status: InvestmentStatus,
    pub platform_commission_percentage: Decimal,
    pub platform_commission_amount: Decimal,
    pub success_commission_percentage: Decimal,
    pub success_commission_amount: Decimal,
    pub actual_return: Option<Decimal>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
