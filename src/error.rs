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

//! Error types for marketplace operations.
//!
//! Every operation fails with a [`MarketplaceError`]. Errors are recoverable by the
//! caller: correcting input and retrying is always possible, except for
//! [`MarketplaceError::Storage`], which reports a persistence-layer fault.

use crate::store::StoreError;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Marketplace operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceError {
    /// The entity is not in a state that allows the requested change
    #[error("invalid {entity} state transition: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Caller does not own the entity or lacks the required role
    #[error("not authorized to perform this action")]
    Unauthorized,

    /// Input is malformed or out of range
    #[error("validation failed for `{field}`: {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    /// Investment would push the case past its funding goal
    #[error("investment of {requested} exceeds remaining funding capacity of {remaining}")]
    FundingExceeded {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Distribution preconditions are not met
    #[error("case is not distributable: {reason}")]
    NotDistributable { reason: NotDistributableReason },

    /// Withdrawal exceeds the derived available balance
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Lawyer already holds a bid on the case
    #[error("lawyer already submitted a bid for this case")]
    DuplicateBid,

    /// Persistence-layer fault
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Why a case cannot be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotDistributableReason {
    NotCompleted,
    NotWon,
    NothingRecovered,
    AlreadyDistributed,
}

impl fmt::Display for NotDistributableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotCompleted => "case is not completed",
            Self::NotWon => "case outcome is not won",
            Self::NothingRecovered => "no amount was recovered",
            Self::AlreadyDistributed => "returns were already distributed",
        };
        f.write_str(reason)
    }
}

/// Coarse error classes the boundary maps onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    StateConflict,
    Authorization,
    NotFound,
    Inconsistency,
    Infrastructure,
}

impl MarketplaceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationFailed { .. } => ErrorCategory::Validation,
            Self::InvalidStateTransition { .. }
            | Self::DuplicateBid
            | Self::FundingExceeded { .. }
            | Self::InsufficientBalance { .. } => ErrorCategory::StateConflict,
            Self::Unauthorized => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::NotDistributable { .. } => ErrorCategory::Inconsistency,
            Self::Storage(_) => ErrorCategory::Infrastructure,
        }
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn transition(
        entity: &'static str,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = MarketplaceError> = std::result::Result<T, E>;
