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

//! Append-only transaction ledger.
//!
//! Rows are keyed by [`TransactionId`]. A row can be written once; later writes
//! for the same ID may only advance its status. Validation and application are
//! split so the repository can check a whole unit of work before touching any
//! table.

use crate::base::{TransactionId, UserId};
use crate::store::StoreError;
use crate::transaction::Transaction;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// A thread-safe ledger with duplicate detection.
#[derive(Debug, Default)]
pub struct Ledger {
    rows: DashMap<TransactionId, Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Checks that `row` is either new or a legal status advance of the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ImmutableRow`] when an existing row would change
    /// anything other than a forward status move.
    pub fn check(&self, row: &Transaction) -> Result<(), StoreError> {
        let Some(existing) = self.rows.get(&row.id) else {
            return Ok(());
        };
        let same_entry = existing.kind == row.kind
            && existing.direction == row.direction
            && existing.amount == row.amount
            && existing.case_id == row.case_id
            && existing.investment_id == row.investment_id
            && existing.withdrawal_id == row.withdrawal_id
            && existing.user_id == row.user_id;
        if !same_entry || !existing.status.can_advance_to(row.status) {
            return Err(StoreError::ImmutableRow(row.id));
        }
        Ok(())
    }

    /// Writes a row previously accepted by [`Ledger::check`].
    pub fn apply(&self, row: Transaction) {
        match self.rows.entry(row.id) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                stored.status = row.status;
                stored.processed_at = row.processed_at;
            }
            Entry::Vacant(entry) => {
                entry.insert(row);
            }
        }
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.rows.get(&id).map(|row| row.clone())
    }

    /// All rows in ID (append) order.
    pub fn rows(&self) -> Vec<Transaction> {
        self.select(|_| true)
    }

    pub fn rows_for_user(&self, user_id: UserId) -> Vec<Transaction> {
        self.select(|row| row.user_id == Some(user_id))
    }

    pub fn select(&self, predicate: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self
            .rows
            .iter()
            .filter(|row| predicate(row.value()))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Direction, TransactionKind, TransactionStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn row(id: u64, status: TransactionStatus) -> Transaction {
        Transaction::new(
            TransactionId(id),
            TransactionKind::InvestorReturn,
            Direction::Out,
            dec!(10.00),
            status,
            Utc::now(),
        )
        .for_user(UserId(5))
    }

    #[test]
    fn new_rows_are_accepted() {
        let ledger = Ledger::new();
        let r = row(1, TransactionStatus::Pending);
        ledger.check(&r).unwrap();
        ledger.apply(r.clone());
        assert_eq!(ledger.get(TransactionId(1)), Some(r));
    }

    #[test]
    fn status_advance_is_accepted() {
        let ledger = Ledger::new();
        ledger.apply(row(1, TransactionStatus::Pending));
        let done = row(1, TransactionStatus::Completed);
        ledger.check(&done).unwrap();
        ledger.apply(done);
        assert_eq!(
            ledger.get(TransactionId(1)).unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[test]
    fn rewriting_amount_is_rejected() {
        let ledger = Ledger::new();
        ledger.apply(row(1, TransactionStatus::Pending));
        let mut tampered = row(1, TransactionStatus::Completed);
        tampered.amount = dec!(99.00);
        assert_eq!(
            ledger.check(&tampered),
            Err(StoreError::ImmutableRow(TransactionId(1)))
        );
    }

    #[test]
    fn duplicate_insert_of_same_status_is_rejected() {
        let ledger = Ledger::new();
        ledger.apply(row(1, TransactionStatus::Completed));
        assert!(ledger.check(&row(1, TransactionStatus::Completed)).is_err());
    }

    #[test]
    fn rows_come_back_in_id_order() {
        let ledger = Ledger::new();
        for id in [3, 1, 2] {
            ledger.apply(row(id, TransactionStatus::Completed));
        }
        let ids: Vec<_> = ledger.rows().into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(ledger.rows_for_user(UserId(5)).len(), 3);
        assert!(ledger.rows_for_user(UserId(6)).is_empty());
    }
}
