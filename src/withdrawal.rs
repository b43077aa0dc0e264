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

//! Payout requests.
//!
//! ```text
//! pending ──► approved ──► processing ──► completed
//!    │           │              │
//!    ▼           ▼              ▼
//! rejected   cancelled      cancelled
//! ```
//!
//! A pending request may also be cancelled by its owner.

use crate::base::{TransactionId, UserId, WithdrawalId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl WithdrawalStatus {
    /// Whether the request still holds (or has consumed) part of the balance.
    pub fn reserves_balance(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Approved | Self::Processing | Self::Completed
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Processing)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMethod {
    BankTransfer,
    Paypal,
    Other,
}

impl std::str::FromStr for WithdrawalMethod {
    type Err = crate::MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "paypal" => Ok(Self::Paypal),
            "other" => Ok(Self::Other),
            other => Err(crate::MarketplaceError::validation(
                "method",
                format!("unknown withdrawal method `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: Decimal,
    /// Fixed at creation.
    pub fee: Decimal,
    /// Always `amount - fee`.
    pub net_amount: Decimal,
    pub status: WithdrawalStatus,
    pub method: WithdrawalMethod,
    pub details: String,
    pub approved_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub transfer_reference: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
