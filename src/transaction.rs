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

//! Ledger rows.
//!
//! Rows are immutable apart from their status, which follows:
//! - [`Pending`] → [`Processing`] → [`Completed`] or [`Failed`]
//! - [`Pending`] → [`Completed`] or [`Failed`]
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Processing`]: TransactionStatus::Processing
//! [`Completed`]: TransactionStatus::Completed
//! [`Failed`]: TransactionStatus::Failed

use crate::MarketplaceError;
use crate::base::{CaseId, InvestmentId, TransactionId, UserId, WithdrawalId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Investment,
    PlatformCommission,
    SuccessCommission,
    LawyerPayment,
    InvestorReturn,
    Withdrawal,
    GatewayFee,
    Refund,
}

impl TransactionKind {
    /// Kinds that credit a user's withdrawable balance.
    pub fn is_earning(self) -> bool {
        matches!(self, Self::InvestorReturn | Self::LawyerPayment)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Investment => "investment",
            Self::PlatformCommission => "platform_commission",
            Self::SuccessCommission => "success_commission",
            Self::LawyerPayment => "lawyer_payment",
            Self::InvestorReturn => "investor_return",
            Self::Withdrawal => "withdrawal",
            Self::GatewayFee => "gateway_fee",
            Self::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// Money flow relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::Out => "out",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn can_advance_to(self, target: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, target),
            (Pending, Processing) | (Pending | Processing, Completed | Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub case_id: Option<CaseId>,
    pub investment_id: Option<InvestmentId>,
    pub withdrawal_id: Option<WithdrawalId>,
    pub user_id: Option<UserId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        kind: TransactionKind,
        direction: Direction,
        amount: Decimal,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            direction,
            amount,
            status,
            case_id: None,
            investment_id: None,
            withdrawal_id: None,
            user_id: None,
            description: String::new(),
            created_at: now,
            processed_at: (status == TransactionStatus::Completed).then_some(now),
        }
    }

    pub fn for_case(mut self, case_id: CaseId) -> Self {
        self.case_id = Some(case_id);
        self
    }

    pub fn for_investment(mut self, investment_id: InvestmentId) -> Self {
        self.investment_id = Some(investment_id);
        self
    }

    pub fn for_withdrawal(mut self, withdrawal_id: WithdrawalId) -> Self {
        self.withdrawal_id = Some(withdrawal_id);
        self
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns a copy with the status advanced, or an error if the move is illegal.
    pub fn advanced(
        &self,
        target: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<Transaction, MarketplaceError> {
        if !self.status.can_advance_to(target) {
            return Err(MarketplaceError::transition(
                "transaction",
                self.status,
                target,
            ));
        }
        let mut next = self.clone();
        next.status = target;
        if matches!(
            target,
            TransactionStatus::Completed | TransactionStatus::Failed
        ) {
            next.processed_at = Some(now);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(status: TransactionStatus) -> Transaction {
        Transaction::new(
            TransactionId(1),
            TransactionKind::Investment,
            Direction::In,
            dec!(100.00),
            status,
            Utc::now(),
        )
    }

    #[test]
    fn status_moves_forward_only() {
        use TransactionStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Pending.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Failed));
        assert!(!Processing.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Completed));
    }

    #[test]
    fn advanced_stamps_processed_at() {
        let pending = row(TransactionStatus::Pending);
        assert!(pending.processed_at.is_none());
        let done = pending
            .advanced(TransactionStatus::Completed, Utc::now())
            .unwrap();
        assert!(done.processed_at.is_some());
        assert_eq!(done.amount, pending.amount);
    }

    #[test]
    fn advancing_completed_row_fails() {
        let done = row(TransactionStatus::Completed);
        assert!(matches!(
            done.advanced(TransactionStatus::Failed, Utc::now()),
            Err(MarketplaceError::InvalidStateTransition {
                entity: "transaction",
                ..
            })
        ));
    }

    #[test]
    fn earning_kinds() {
        assert!(TransactionKind::InvestorReturn.is_earning());
        assert!(TransactionKind::LawyerPayment.is_earning());
        assert!(!TransactionKind::SuccessCommission.is_earning());
    }
}
