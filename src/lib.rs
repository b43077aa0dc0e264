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

//! # casefund
//!
//! Core engine of a legal-case crowdfunding marketplace. Victims submit
//! claims, lawyers bid to represent them, investors fund the approved cases,
//! and when a case is won the recovery is split between the lawyer, the
//! investors and the platform. Earned balances are paid out through
//! withdrawal requests.
//!
//! ## Core Components
//!
//! - [`Marketplace`]: every workflow operation, generic over its [`Repository`]
//! - [`Case`] and [`CaseStatus`]: the case record and its transition table
//! - [`LawyerBid`]: lawyer proposals and their review
//! - [`Investment`], [`Withdrawal`], [`Transaction`]: money movements
//! - [`DomainEvent`] and [`Outbox`]: notifications raised by committed operations
//! - [`Policy`]: commission and fee percentages, loadable from TOML
//! - [`MarketplaceError`]: error taxonomy shared by all operations
//!
//! ## Example
//!
//! ```
//! use casefund::{CaseStatus, CaseSubmission, Marketplace, Principal, UserId};
//! use rust_decimal_macros::dec;
//! use std::collections::BTreeMap;
//!
//! let market = Marketplace::new();
//! let victim = Principal::victim(UserId(1));
//! let admin = Principal::admin(UserId(2));
//!
//! let case = market
//!     .submit(
//!         &victim,
//!         CaseSubmission {
//!             title: "Unpaid overtime".into(),
//!             description: "Two years of unpaid overtime".into(),
//!             category: "labor".into(),
//!             company: "Acme Logistics".into(),
//!             funding_goal: dec!(50000),
//!             deadline: None,
//!             bid_deadline: None,
//!         },
//!     )?
//!     .into_value();
//!
//! let case = market
//!     .evaluate(&admin, case.id, CaseStatus::UnderAdminReview, BTreeMap::new())?
//!     .into_value();
//! assert_eq!(case.status, CaseStatus::UnderAdminReview);
//!
//! // Skipping straight to publication is not in the transition table.
//! assert!(market
//!     .evaluate(&admin, case.id, CaseStatus::Published, BTreeMap::new())
//!     .is_err());
//! # Ok::<(), casefund::MarketplaceError>(())
//! ```
//!
//! ## Thread Safety
//!
//! [`Marketplace`] is `Sync`. Operations on the same case are serialized by a
//! per-case lock and withdrawals by a per-user lock; everything else runs in
//! parallel. Each operation commits all of its writes at once or none of them.

pub mod base;
pub mod bid;
mod bidding;
pub mod case;
pub mod config;
mod engine;
pub mod error;
pub mod event;
mod funding;
pub mod investment;
pub mod ledger;
mod lifecycle;
pub mod notify;
mod payout;
pub mod settlement;
pub mod store;
pub mod transaction;
pub mod withdrawal;

pub use base::{
    BidId, CaseId, InvestmentId, Principal, Role, TransactionId, UserId, WithdrawalId,
};
pub use bid::{BidProposal, BidStatus, LawyerBid};
pub use bidding::{MAX_ADMIN_SCORE, MIN_ADMIN_SCORE};
pub use case::{Case, CaseStatus, CaseSubmission, LawyerTerms, Outcome};
pub use config::{ConfigError, Policy};
pub use engine::Marketplace;
pub use error::{ErrorCategory, MarketplaceError, NotDistributableReason};
pub use event::{Committed, DomainEvent};
pub use investment::{Investment, InvestmentStatus};
pub use lifecycle::CaseClosure;
pub use notify::{DispatchReport, Notification, NotificationSink, NotifyError, Outbox, Recipient};
pub use settlement::{DistributionSummary, InvestorReturn};
pub use store::{MemoryRepository, Repository, StoreError, UnitOfWork};
pub use transaction::{Direction, Transaction, TransactionKind, TransactionStatus};
pub use withdrawal::{Withdrawal, WithdrawalMethod, WithdrawalStatus};
