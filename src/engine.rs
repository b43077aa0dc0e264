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

//! Marketplace engine.
//!
//! [`Marketplace`] is the entry point the API layer talks to. It owns the
//! [`Repository`] and the fee [`Policy`]; the operations themselves live in
//! the workflow modules:
//!
//! | Module | Operations |
//! |--------|------------|
//! | [`lifecycle`](crate::lifecycle) | submit, evaluate, close, direct lawyer assignment |
//! | [`bidding`](crate::bidding) | bids, review, winner selection, open/close bidding |
//! | [`funding`](crate::funding) | create, confirm, cancel investments |
//! | [`settlement`](crate::settlement) | returns distribution |
//! | [`payout`](crate::payout) | withdrawals and available balance |
//!
//! # Atomicity
//!
//! Every operation stages its writes in a [`UnitOfWork`] and commits once.
//! Any error before the commit leaves storage untouched. Case-scoped
//! operations run under the case's row lock for their whole duration.

use crate::MarketplaceError;
use crate::base::{BidId, CaseId, InvestmentId, Principal, TransactionId, WithdrawalId};
use crate::bid::LawyerBid;
use crate::case::Case;
use crate::config::Policy;
use crate::error::Result;
use crate::investment::Investment;
use crate::store::{MemoryRepository, Repository, Sequence, UnitOfWork};
use crate::transaction::Transaction;
use crate::withdrawal::Withdrawal;

/// Case lifecycle and settlement engine.
///
/// # Invariants
///
/// - A case's `current_funding` never exceeds its `funding_goal`.
/// - At most one bid per case is `accepted`.
/// - Returns are distributed at most once per case.
/// - Withdrawable balances are derived from the ledger, never stored.
pub struct Marketplace<R: Repository = MemoryRepository> {
    repository: R,
    policy: Policy,
}

impl Marketplace<MemoryRepository> {
    /// Creates an in-memory marketplace with the default fee policy.
    pub fn new() -> Self {
        Self::with_repository(MemoryRepository::new(), Policy::default())
    }

    pub fn with_policy(policy: Policy) -> Self {
        Self::with_repository(MemoryRepository::new(), policy)
    }
}

impl Default for Marketplace<MemoryRepository> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Repository> Marketplace<R> {
    pub fn with_repository(repository: R, policy: Policy) -> Self {
        Self { repository, policy }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn case(&self, id: CaseId) -> Result<Case> {
        self.repository
            .case(id)?
            .ok_or_else(|| MarketplaceError::not_found("case", id))
    }

    pub fn cases(&self) -> Result<Vec<Case>> {
        Ok(self.repository.cases()?)
    }

    pub fn bid(&self, id: BidId) -> Result<LawyerBid> {
        self.repository
            .bid(id)?
            .ok_or_else(|| MarketplaceError::not_found("bid", id))
    }

    pub fn bids_for_case(&self, case_id: CaseId) -> Result<Vec<LawyerBid>> {
        Ok(self.repository.bids_for_case(case_id)?)
    }

    pub fn investment(&self, id: InvestmentId) -> Result<Investment> {
        self.repository
            .investment(id)?
            .ok_or_else(|| MarketplaceError::not_found("investment", id))
    }

    pub fn investments_for_case(&self, case_id: CaseId) -> Result<Vec<Investment>> {
        Ok(self.repository.investments_for_case(case_id)?)
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.repository
            .withdrawal(id)?
            .ok_or_else(|| MarketplaceError::not_found("withdrawal", id))
    }

    /// The full ledger in append order.
    pub fn ledger(&self) -> Result<Vec<Transaction>> {
        Ok(self.repository.transactions()?)
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId(self.repository.next_id(Sequence::Transaction))
    }

    pub(crate) fn commit(&self, unit: UnitOfWork) -> Result<()> {
        Ok(self.repository.commit(unit)?)
    }
}

/// Fails with [`MarketplaceError::Unauthorized`] unless the caller is an admin.
pub(crate) fn require_admin(principal: &Principal) -> Result<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(MarketplaceError::Unauthorized)
    }
}
