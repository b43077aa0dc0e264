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

//! Persistence capability.
//!
//! The core reads through [`Repository`] and writes exclusively through
//! [`Repository::commit`], which applies a [`UnitOfWork`] all-or-nothing.
//! Case-scoped operations hold the lock returned by [`Repository::case_lock`]
//! from their first read to the commit, so checks such as "room left under the
//! funding goal" cannot race with a concurrent write to the same case.
//!
//! [`MemoryRepository`] is the in-process implementation.

use crate::base::{BidId, CaseId, InvestmentId, TransactionId, UserId, WithdrawalId};
use crate::bid::LawyerBid;
use crate::case::Case;
use crate::investment::Investment;
use crate::ledger::Ledger;
use crate::transaction::Transaction;
use crate::withdrawal::Withdrawal;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

/// Name of the unique index over `(case_id, lawyer_id)` on bids.
pub const BID_UNIQUE_CONSTRAINT: &str = "lawyer_bids_case_id_lawyer_id_unique";

/// Persistence-layer failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: &'static str },

    #[error("ledger row {0} is immutable")]
    ImmutableRow(TransactionId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// ID sequences handed out by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Case,
    Bid,
    Investment,
    Withdrawal,
    Transaction,
}

impl Sequence {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Self::Case => 0,
            Self::Bid => 1,
            Self::Investment => 2,
            Self::Withdrawal => 3,
            Self::Transaction => 4,
        }
    }
}

/// A single staged upsert.
#[derive(Debug, Clone)]
pub enum Write {
    Case(Case),
    Bid(LawyerBid),
    Investment(Investment),
    Withdrawal(Withdrawal),
    Transaction(Transaction),
}

/// Writes staged by one operation. Dropping it without committing discards them.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    writes: Vec<Write>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_case(&mut self, case: Case) -> &mut Self {
        self.writes.push(Write::Case(case));
        self
    }

    pub fn put_bid(&mut self, bid: LawyerBid) -> &mut Self {
        self.writes.push(Write::Bid(bid));
        self
    }

    pub fn put_investment(&mut self, investment: Investment) -> &mut Self {
        self.writes.push(Write::Investment(investment));
        self
    }

    pub fn put_withdrawal(&mut self, withdrawal: Withdrawal) -> &mut Self {
        self.writes.push(Write::Withdrawal(withdrawal));
        self
    }

    /// Stages a new ledger row or a status advance of an existing one.
    pub fn record(&mut self, transaction: Transaction) -> &mut Self {
        self.writes.push(Write::Transaction(transaction));
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Storage consumed by the marketplace core.
pub trait Repository: Send + Sync {
    fn next_id(&self, sequence: Sequence) -> u64;

    /// Row lock serializing every operation on one case.
    fn case_lock(&self, case_id: CaseId) -> Arc<Mutex<()>>;

    /// Lock serializing balance-affecting operations for one user.
    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>>;

    fn case(&self, id: CaseId) -> Result<Option<Case>, StoreError>;
    fn cases(&self) -> Result<Vec<Case>, StoreError>;
    fn bid(&self, id: BidId) -> Result<Option<LawyerBid>, StoreError>;
    fn bids_for_case(&self, case_id: CaseId) -> Result<Vec<LawyerBid>, StoreError>;
    fn investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError>;
    fn investments_for_case(&self, case_id: CaseId) -> Result<Vec<Investment>, StoreError>;
    fn withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError>;
    fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError>;
    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;
    fn transactions(&self) -> Result<Vec<Transaction>, StoreError>;
    fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;
    fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Applies every write in `unit` or none of them.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UniqueViolation`] - a bid reuses a `(case_id, lawyer_id)` pair.
    /// - [`StoreError::ImmutableRow`] - a ledger row would be rewritten.
    /// - [`StoreError::Unavailable`] - the backing store is down.
    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError>;
}

/// In-memory [`Repository`].
///
/// Tables are [`DashMap`]s. Commits run under the write side of a gate that
/// every read takes shared, so readers never observe half of a unit of work.
#[derive(Debug)]
pub struct MemoryRepository {
    cases: DashMap<CaseId, Case>,
    bids: DashMap<BidId, LawyerBid>,
    /// Unique index backing [`BID_UNIQUE_CONSTRAINT`].
    bid_index: DashMap<(CaseId, UserId), BidId>,
    investments: DashMap<InvestmentId, Investment>,
    withdrawals: DashMap<WithdrawalId, Withdrawal>,
    ledger: Ledger,
    case_locks: DashMap<CaseId, Arc<Mutex<()>>>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    sequences: [AtomicU64; Sequence::COUNT],
    gate: RwLock<()>,
    unavailable: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            cases: DashMap::new(),
            bids: DashMap::new(),
            bid_index: DashMap::new(),
            investments: DashMap::new(),
            withdrawals: DashMap::new(),
            ledger: Ledger::new(),
            case_locks: DashMap::new(),
            user_locks: DashMap::new(),
            sequences: std::array::from_fn(|_| AtomicU64::new(0)),
            gate: RwLock::new(()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: while set, every commit fails with
    /// [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn validate(&self, unit: &UnitOfWork) -> Result<(), StoreError> {
        let mut staged_pairs: HashMap<(CaseId, UserId), BidId> = HashMap::new();
        for write in unit.writes() {
            match write {
                Write::Bid(bid) => {
                    let pair = (bid.case_id, bid.lawyer_id);
                    let taken_elsewhere = self
                        .bid_index
                        .get(&pair)
                        .is_some_and(|owner| *owner != bid.id);
                    let moved_pair = self
                        .bids
                        .get(&bid.id)
                        .is_some_and(|stored| (stored.case_id, stored.lawyer_id) != pair);
                    let staged_twice = *staged_pairs.entry(pair).or_insert(bid.id) != bid.id;
                    if taken_elsewhere || moved_pair || staged_twice {
                        return Err(StoreError::UniqueViolation {
                            constraint: BID_UNIQUE_CONSTRAINT,
                        });
                    }
                }
                Write::Transaction(row) => self.ledger.check(row)?,
                Write::Case(_) | Write::Investment(_) | Write::Withdrawal(_) => {}
            }
        }
        Ok(())
    }

    fn apply(&self, write: Write) {
        match write {
            Write::Case(case) => {
                self.cases.insert(case.id, case);
            }
            Write::Bid(bid) => {
                self.bid_index.insert((bid.case_id, bid.lawyer_id), bid.id);
                self.bids.insert(bid.id, bid);
            }
            Write::Investment(investment) => {
                self.investments.insert(investment.id, investment);
            }
            Write::Withdrawal(withdrawal) => {
                self.withdrawals.insert(withdrawal.id, withdrawal);
            }
            Write::Transaction(row) => self.ledger.apply(row),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl FnMut(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

impl Repository for MemoryRepository {
    fn next_id(&self, sequence: Sequence) -> u64 {
        self.sequences[sequence.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    fn case_lock(&self, case_id: CaseId) -> Arc<Mutex<()>> {
        Arc::clone(self.case_locks.entry(case_id).or_default().value())
    }

    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.user_locks.entry(user_id).or_default().value())
    }

    fn case(&self, id: CaseId) -> Result<Option<Case>, StoreError> {
        let _read = self.gate.read();
        Ok(self.cases.get(&id).map(|case| case.clone()))
    }

    fn cases(&self) -> Result<Vec<Case>, StoreError> {
        let _read = self.gate.read();
        let rows = self.cases.iter().map(|c| c.value().clone()).collect();
        Ok(sorted_by(rows, |c: &Case| c.id))
    }

    fn bid(&self, id: BidId) -> Result<Option<LawyerBid>, StoreError> {
        let _read = self.gate.read();
        Ok(self.bids.get(&id).map(|bid| bid.clone()))
    }

    fn bids_for_case(&self, case_id: CaseId) -> Result<Vec<LawyerBid>, StoreError> {
        let _read = self.gate.read();
        let rows = self
            .bids
            .iter()
            .filter(|bid| bid.case_id == case_id)
            .map(|bid| bid.value().clone())
            .collect();
        Ok(sorted_by(rows, |b: &LawyerBid| b.id))
    }

    fn investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError> {
        let _read = self.gate.read();
        Ok(self.investments.get(&id).map(|inv| inv.clone()))
    }

    fn investments_for_case(&self, case_id: CaseId) -> Result<Vec<Investment>, StoreError> {
        let _read = self.gate.read();
        let rows = self
            .investments
            .iter()
            .filter(|inv| inv.case_id == case_id)
            .map(|inv| inv.value().clone())
            .collect();
        Ok(sorted_by(rows, |i: &Investment| i.id))
    }

    fn withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        let _read = self.gate.read();
        Ok(self.withdrawals.get(&id).map(|w| w.clone()))
    }

    fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let _read = self.gate.read();
        let rows = self
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.value().clone())
            .collect();
        Ok(sorted_by(rows, |w: &Withdrawal| w.id))
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let _read = self.gate.read();
        Ok(self.ledger.get(id))
    }

    fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let _read = self.gate.read();
        Ok(self.ledger.rows())
    }

    fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        let _read = self.gate.read();
        Ok(self.ledger.rows_for_user(user_id))
    }

    fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let _read = self.gate.read();
        Ok(self
            .ledger
            .select(|row| row.investment_id == Some(investment_id)))
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit refused".into()));
        }
        let _write = self.gate.write();
        self.validate(&unit)?;
        for write in unit.writes {
            self.apply(write);
        }
        Ok(())
    }
}
