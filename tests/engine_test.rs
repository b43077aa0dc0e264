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

//! Marketplace public API integration tests.

mod common;

use casefund::{
    CaseStatus, ErrorCategory, Marketplace, MarketplaceError, Notification, NotificationSink,
    NotifyError, Outbox, Recipient, StoreError, TransactionKind,
};
use common::*;
use parking_lot::Mutex;
use rust_decimal_macros::dec;

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.seen.lock().push(notification.clone());
        Ok(())
    }
}

struct DownSink;

impl NotificationSink for DownSink {
    fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("smtp down".into()))
    }
}

#[test]
fn storage_outage_commits_nothing() {
    let market = Marketplace::new();
    let case_id = published_case(&market, dec!(1000));

    market.repository().set_unavailable(true);
    let err = market
        .create_investment(&investor(1), case_id, dec!(1000))
        .unwrap_err();
    assert!(matches!(
        err,
        MarketplaceError::Storage(StoreError::Unavailable(_))
    ));
    assert_eq!(err.category(), ErrorCategory::Infrastructure);

    market.repository().set_unavailable(false);
    let case = market.case(case_id).unwrap();
    assert_eq!(case.current_funding, dec!(0));
    assert_eq!(case.status, CaseStatus::Published);
    assert!(market.investments_for_case(case_id).unwrap().is_empty());
    assert!(market.ledger().unwrap().is_empty());

    market
        .create_investment(&investor(1), case_id, dec!(1000))
        .unwrap();
    assert_eq!(market.case(case_id).unwrap().status, CaseStatus::Funded);
}

#[test]
fn settlement_notifies_every_party() {
    let market = Marketplace::new();
    let (case_id, _, _) = won_case(&market);
    let committed = market.distribute_returns(&admin(), case_id).unwrap();

    let outbox = Outbox::default();
    outbox.publish(&committed.events);
    let sink = RecordingSink::default();
    let report = outbox.dispatch(&sink);
    assert_eq!(report.delivered, 3);
    assert_eq!(outbox.pending(), 0);

    let seen = sink.seen.lock();
    let recipients: Vec<_> = seen.iter().map(|n| n.recipient).collect();
    assert!(recipients.contains(&Recipient::User(lawyer().user_id)));
    assert!(recipients.contains(&Recipient::User(investor(1).user_id)));
    assert!(recipients.contains(&Recipient::User(investor(2).user_id)));
}

#[test]
fn notification_failure_does_not_undo_the_commit() {
    let market = Marketplace::new();
    let case_id = published_case(&market, dec!(1000));
    let committed = market
        .create_investment(&investor(1), case_id, dec!(1000))
        .unwrap();

    let outbox = Outbox::new(2);
    let queued = outbox.publish(&committed.events);
    assert!(queued > 0);

    let first = outbox.dispatch(&DownSink);
    assert_eq!(first.retried, queued);
    let second = outbox.dispatch(&DownSink);
    assert_eq!(second.dropped, queued);
    assert_eq!(outbox.pending(), 0);

    assert_eq!(market.case(case_id).unwrap().status, CaseStatus::Funded);
    assert_eq!(
        market.ledger().unwrap()[0].kind,
        TransactionKind::Investment
    );
}

#[test]
fn error_categories() {
    let market = Marketplace::new();
    let case_id = published_case(&market, dec!(1000));

    let cases = [
        (
            market.create_investment(&investor(1), case_id, dec!(5000)),
            ErrorCategory::StateConflict,
        ),
        (
            market.create_investment(&investor(1), case_id, dec!(0)),
            ErrorCategory::Validation,
        ),
        (
            market.create_investment(&victim(), case_id, dec!(10)),
            ErrorCategory::Authorization,
        ),
        (
            market.create_investment(&investor(1), casefund::CaseId(999), dec!(10)),
            ErrorCategory::NotFound,
        ),
    ];
    for (result, expected) in cases {
        assert_eq!(result.unwrap_err().category(), expected);
    }

    let err = market.distribute_returns(&admin(), case_id).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Inconsistency);
}

#[test]
fn unauthorized_errors_hide_details() {
    let market = Marketplace::new();
    let case_id = published_case(&market, dec!(1000));
    let err = market
        .distribute_returns(&investor(1), case_id)
        .unwrap_err();
    assert_eq!(err.to_string(), "not authorized to perform this action");
}
