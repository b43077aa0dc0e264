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

//! Withdrawals of earned balance.
//!
//! A user's available balance is derived from the ledger on every call:
//! completed investor returns and lawyer payments credited to them, minus
//! every withdrawal that is in flight or already paid out. Nothing caches it,
//! so the balance check in [`Marketplace::request_withdrawal`] runs under the
//! user's lock to keep two concurrent requests from both passing.

use crate::MarketplaceError;
use crate::base::{Principal, UserId, WithdrawalId, percent_of};
use crate::case::check_amount;
use crate::engine::{Marketplace, require_admin};
use crate::error::Result;
use crate::event::{Committed, DomainEvent};
use crate::store::{Repository, Sequence, UnitOfWork};
use crate::transaction::{Direction, Transaction, TransactionKind, TransactionStatus};
use crate::withdrawal::{Withdrawal, WithdrawalMethod, WithdrawalStatus};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};

fn changed(withdrawal: &Withdrawal) -> Vec<DomainEvent> {
    vec![DomainEvent::WithdrawalStatusChanged {
        withdrawal_id: withdrawal.id,
        user_id: withdrawal.user_id,
        status: withdrawal.status,
    }]
}

fn require_status(
    withdrawal: &Withdrawal,
    expected: WithdrawalStatus,
    target: WithdrawalStatus,
) -> Result<()> {
    if withdrawal.status != expected {
        return Err(MarketplaceError::transition(
            "withdrawal",
            withdrawal.status,
            target,
        ));
    }
    Ok(())
}

impl<R: Repository> Marketplace<R> {
    pub fn available_balance(&self, user_id: UserId) -> Result<Decimal> {
        let earned: Decimal = self
            .repository()
            .transactions_for_user(user_id)?
            .iter()
            .filter(|row| {
                row.kind.is_earning()
                    && row.direction == Direction::Out
                    && row.status == TransactionStatus::Completed
            })
            .map(|row| row.amount)
            .sum();
        let reserved: Decimal = self
            .repository()
            .withdrawals_for_user(user_id)?
            .iter()
            .filter(|w| w.status.reserves_balance())
            .map(|w| w.amount)
            .sum();
        Ok(earned - reserved)
    }

    pub fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        Ok(self.repository().withdrawals_for_user(user_id)?)
    }

    /// Requests a payout of `amount` from the caller's own balance.
    ///
    /// The fee is fixed here and never recomputed.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::InsufficientBalance`] - `amount` exceeds the available balance.
    /// - [`MarketplaceError::ValidationFailed`] - non-positive or sub-cent amount.
    pub fn request_withdrawal(
        &self,
        principal: &Principal,
        amount: Decimal,
        method: WithdrawalMethod,
        details: String,
    ) -> Result<Committed<Withdrawal>> {
        check_amount("amount", amount)?;

        let lock = self.repository().user_lock(principal.user_id);
        let _guard = lock.lock();

        let available = self.available_balance(principal.user_id)?;
        if amount > available {
            debug!(
                user_id = %principal.user_id,
                requested = %amount,
                available = %available,
                "withdrawal exceeds balance"
            );
            return Err(MarketplaceError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        let fee = percent_of(amount, self.policy().withdrawal_fee_percentage);
        let withdrawal = Withdrawal {
            id: WithdrawalId(self.repository().next_id(Sequence::Withdrawal)),
            user_id: principal.user_id,
            amount,
            fee,
            net_amount: amount - fee,
            status: WithdrawalStatus::Pending,
            method,
            details,
            approved_by: None,
            rejection_reason: None,
            transaction_id: None,
            transfer_reference: None,
            requested_at: Utc::now(),
            approved_at: None,
            processed_at: None,
            completed_at: None,
        };
        let mut unit = UnitOfWork::new();
        unit.put_withdrawal(withdrawal.clone());
        self.commit(unit)?;

        info!(
            withdrawal_id = %withdrawal.id,
            user_id = %principal.user_id,
            amount = %amount,
            fee = %fee,
            "withdrawal requested"
        );
        let events = changed(&withdrawal);
        Ok(Committed::new(withdrawal, events))
    }

    pub fn approve_withdrawal(
        &self,
        principal: &Principal,
        withdrawal_id: WithdrawalId,
    ) -> Result<Committed<Withdrawal>> {
        require_admin(principal)?;
        self.update_withdrawal(withdrawal_id, |withdrawal, _| {
            require_status(withdrawal, WithdrawalStatus::Pending, WithdrawalStatus::Approved)?;
            withdrawal.status = WithdrawalStatus::Approved;
            withdrawal.approved_by = Some(principal.user_id);
            withdrawal.approved_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn reject_withdrawal(
        &self,
        principal: &Principal,
        withdrawal_id: WithdrawalId,
        reason: String,
    ) -> Result<Committed<Withdrawal>> {
        require_admin(principal)?;
        if reason.trim().is_empty() {
            return Err(MarketplaceError::validation("reason", "must not be empty"));
        }
        self.update_withdrawal(withdrawal_id, |withdrawal, _| {
            require_status(withdrawal, WithdrawalStatus::Pending, WithdrawalStatus::Rejected)?;
            withdrawal.status = WithdrawalStatus::Rejected;
            withdrawal.rejection_reason = Some(reason);
            Ok(())
        })
    }

    /// Starts the transfer and records the outgoing ledger row.
    pub fn process_withdrawal(
        &self,
        principal: &Principal,
        withdrawal_id: WithdrawalId,
    ) -> Result<Committed<Withdrawal>> {
        require_admin(principal)?;
        self.update_withdrawal(withdrawal_id, |withdrawal, unit| {
            require_status(withdrawal, WithdrawalStatus::Approved, WithdrawalStatus::Processing)?;
            let now = Utc::now();
            let row = Transaction::new(
                self.next_transaction_id(),
                TransactionKind::Withdrawal,
                Direction::Out,
                withdrawal.net_amount,
                TransactionStatus::Processing,
                now,
            )
            .for_withdrawal(withdrawal.id)
            .for_user(withdrawal.user_id)
            .described(format!("Payout for withdrawal {}", withdrawal.id));
            withdrawal.transaction_id = Some(row.id);
            withdrawal.status = WithdrawalStatus::Processing;
            withdrawal.processed_at = Some(now);
            unit.record(row);
            Ok(())
        })
    }

    /// Marks the transfer as done once the payment provider confirms it.
    pub fn complete_withdrawal(
        &self,
        principal: &Principal,
        withdrawal_id: WithdrawalId,
        transfer_reference: String,
    ) -> Result<Committed<Withdrawal>> {
        require_admin(principal)?;
        if transfer_reference.trim().is_empty() {
            return Err(MarketplaceError::validation(
                "transfer_reference",
                "must not be empty",
            ));
        }
        self.update_withdrawal(withdrawal_id, |withdrawal, unit| {
            require_status(withdrawal, WithdrawalStatus::Processing, WithdrawalStatus::Completed)?;
            let now = Utc::now();
            if let Some(row) = self.linked_row(withdrawal)? {
                unit.record(row.advanced(TransactionStatus::Completed, now)?);
            }
            withdrawal.status = WithdrawalStatus::Completed;
            withdrawal.transfer_reference = Some(transfer_reference);
            withdrawal.completed_at = Some(now);
            Ok(())
        })
    }

    /// Cancels a request that has not been paid out yet, releasing its hold on
    /// the balance.
    pub fn cancel_withdrawal(
        &self,
        principal: &Principal,
        withdrawal_id: WithdrawalId,
    ) -> Result<Committed<Withdrawal>> {
        self.update_withdrawal(withdrawal_id, |withdrawal, unit| {
            if !principal.is_admin() && withdrawal.user_id != principal.user_id {
                return Err(MarketplaceError::Unauthorized);
            }
            if !withdrawal.status.is_cancellable() {
                return Err(MarketplaceError::transition(
                    "withdrawal",
                    withdrawal.status,
                    WithdrawalStatus::Cancelled,
                ));
            }
            if let Some(row) = self.linked_row(withdrawal)? {
                unit.record(row.advanced(TransactionStatus::Failed, Utc::now())?);
            }
            withdrawal.status = WithdrawalStatus::Cancelled;
            Ok(())
        })
    }

    fn linked_row(&self, withdrawal: &Withdrawal) -> Result<Option<Transaction>> {
        match withdrawal.transaction_id {
            Some(id) => Ok(self.repository().transaction(id)?),
            None => Ok(None),
        }
    }

    /// Loads a withdrawal under its owner's lock, applies `change`, and commits
    /// the result together with whatever ledger rows `change` staged.
    fn update_withdrawal<F>(
        &self,
        withdrawal_id: WithdrawalId,
        change: F,
    ) -> Result<Committed<Withdrawal>>
    where
        F: FnOnce(&mut Withdrawal, &mut UnitOfWork) -> Result<()>,
    {
        let user_id = self.withdrawal(withdrawal_id)?.user_id;
        let lock = self.repository().user_lock(user_id);
        let _guard = lock.lock();

        let mut withdrawal = self.withdrawal(withdrawal_id)?;
        let from = withdrawal.status;
        let mut unit = UnitOfWork::new();
        change(&mut withdrawal, &mut unit)?;
        unit.put_withdrawal(withdrawal.clone());
        self.commit(unit)?;

        info!(
            withdrawal_id = %withdrawal_id,
            user_id = %user_id,
            from = %from,
            to = %withdrawal.status,
            "withdrawal updated"
        );
        let events = changed(&withdrawal);
        Ok(Committed::new(withdrawal, events))
    }
}
