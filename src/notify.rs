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

//! Notification outbox.
//!
//! Domain events are translated into [`Notification`]s and queued in an
//! [`Outbox`]. [`Outbox::dispatch`] drains the queue into a
//! [`NotificationSink`]; failed deliveries are re-queued until they run out of
//! attempts. Delivery is at-least-once and never affects the financial commit
//! that produced the event.

use crate::base::{Role, UserId};
use crate::event::DomainEvent;
use crossbeam::queue::SegQueue;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Who receives a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification sink unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivery mechanism supplied by the boundary (mail, push, websocket, ...).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

impl DomainEvent {
    /// Translates the event into the notifications the platform sends for it.
    pub fn notifications(&self) -> Vec<Notification> {
        use DomainEvent::*;
        use Recipient::{Role as ToRole, User as ToUser};

        let metadata = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let note = |recipient: Recipient, title: &str, message: String| Notification {
            recipient,
            title: title.to_owned(),
            message,
            metadata: metadata.clone(),
        };

        match self {
            CaseSubmitted { case_id, .. } => vec![note(
                ToRole(Role::Admin),
                "New case submitted",
                format!("Case {case_id} is waiting for review."),
            )],
            CaseStatusChanged {
                case_id,
                victim_id,
                lawyer_id,
                from,
                to,
            } => {
                let message = format!("Case {case_id} moved from {from} to {to}.");
                let mut notes = vec![note(
                    ToUser(*victim_id),
                    "Case status updated",
                    message.clone(),
                )];
                if let Some(lawyer_id) = lawyer_id {
                    notes.push(note(ToUser(*lawyer_id), "Case status updated", message));
                }
                notes
            }
            LawyerAssigned {
                case_id,
                victim_id,
                lawyer_id,
            } => vec![
                note(
                    ToUser(*victim_id),
                    "Lawyer assigned",
                    format!("A lawyer has been assigned to case {case_id}."),
                ),
                note(
                    ToUser(*lawyer_id),
                    "You have been assigned a case",
                    format!("You now represent case {case_id}."),
                ),
            ],
            BidSubmitted { case_id, bid_id, .. } => vec![note(
                ToRole(Role::Admin),
                "New bid received",
                format!("Bid {bid_id} was submitted for case {case_id}."),
            )],
            BidReviewed {
                bid_id,
                lawyer_id,
                score,
                ..
            } => vec![note(
                ToUser(*lawyer_id),
                "Bid under review",
                format!("Your bid {bid_id} was scored {score}/10."),
            )],
            BidAccepted {
                case_id, lawyer_id, ..
            } => vec![note(
                ToUser(*lawyer_id),
                "Bid accepted",
                format!("Your proposal for case {case_id} was selected."),
            )],
            BidRejected {
                case_id,
                lawyer_id,
                feedback,
                ..
            } => vec![note(
                ToUser(*lawyer_id),
                "Bid not selected",
                format!("Case {case_id}: {feedback}"),
            )],
            BidWithdrawn { case_id, bid_id, .. } => vec![note(
                ToRole(Role::Admin),
                "Bid withdrawn",
                format!("Bid {bid_id} on case {case_id} was withdrawn."),
            )],
            InvestmentCreated {
                case_id,
                investor_id,
                amount,
                ..
            } => vec![
                note(
                    ToUser(*investor_id),
                    "Investment registered",
                    format!(
                        "Your investment of {amount} in case {case_id} is pending confirmation."
                    ),
                ),
                note(
                    ToRole(Role::Admin),
                    "New investment",
                    format!("Case {case_id} received an investment of {amount}."),
                ),
            ],
            InvestmentConfirmed {
                case_id,
                investor_id,
                ..
            } => vec![note(
                ToUser(*investor_id),
                "Investment confirmed",
                format!("Your investment in case {case_id} is confirmed."),
            )],
            InvestmentCancelled {
                case_id,
                investor_id,
                amount,
                ..
            } => vec![note(
                ToUser(*investor_id),
                "Investment cancelled",
                format!("Your investment of {amount} in case {case_id} was cancelled."),
            )],
            FundingGoalReached {
                case_id,
                victim_id,
                lawyer_id,
                funding_goal,
            } => {
                let message = format!("Case {case_id} reached its funding goal of {funding_goal}.");
                let mut notes = vec![
                    note(ToUser(*victim_id), "Funding goal reached", message.clone()),
                    note(ToRole(Role::Admin), "Funding goal reached", message.clone()),
                ];
                if let Some(lawyer_id) = lawyer_id {
                    notes.push(note(ToUser(*lawyer_id), "Funding goal reached", message));
                }
                notes
            }
            CaseClosed {
                case_id,
                victim_id,
                outcome,
                amount_recovered,
            } => {
                let message =
                    format!("Case {case_id} closed as {outcome}; recovered {amount_recovered}.");
                vec![
                    note(ToUser(*victim_id), "Case closed", message.clone()),
                    note(ToRole(Role::Admin), "Case closed", message),
                ]
            }
            LawyerPaid {
                case_id,
                lawyer_id,
                amount,
            } => vec![note(
                ToUser(*lawyer_id),
                "Compensation paid",
                format!("You were credited {amount} for case {case_id}."),
            )],
            ReturnPaid {
                case_id,
                investor_id,
                amount,
                ..
            } => vec![note(
                ToUser(*investor_id),
                "Returns distributed",
                format!("You were credited {amount} from case {case_id}."),
            )],
            WithdrawalStatusChanged {
                withdrawal_id,
                user_id,
                status,
            } => {
                let mut notes = vec![note(
                    ToUser(*user_id),
                    "Withdrawal updated",
                    format!("Withdrawal {withdrawal_id} is now {status}."),
                )];
                if *status == crate::withdrawal::WithdrawalStatus::Pending {
                    notes.push(note(
                        ToRole(Role::Admin),
                        "Withdrawal requested",
                        format!("Withdrawal {withdrawal_id} awaits approval."),
                    ));
                }
                notes
            }
        }
    }
}

#[derive(Debug)]
struct Delivery {
    notification: Notification,
    attempts: u32,
}

/// Counts from one [`Outbox::dispatch`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
}

/// Lock-free queue of notifications awaiting delivery.
#[derive(Debug)]
pub struct Outbox {
    queue: SegQueue<Delivery>,
    max_attempts: u32,
}

impl Outbox {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            queue: SegQueue::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queues the notifications for `events`; returns how many were queued.
    pub fn publish(&self, events: &[DomainEvent]) -> usize {
        let mut queued = 0;
        for notification in events.iter().flat_map(DomainEvent::notifications) {
            self.queue.push(Delivery {
                notification,
                attempts: 0,
            });
            queued += 1;
        }
        queued
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Attempts every queued delivery once.
    ///
    /// Failures go back on the queue for the next pass until they reach the
    /// attempt limit, then they are dropped and logged.
    pub fn dispatch(&self, sink: &dyn NotificationSink) -> DispatchReport {
        let mut report = DispatchReport::default();
        for _ in 0..self.queue.len() {
            let Some(mut delivery) = self.queue.pop() else {
                break;
            };
            match sink.notify(&delivery.notification) {
                Ok(()) => {
                    debug!(title = %delivery.notification.title, "notification delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    delivery.attempts += 1;
                    if delivery.attempts >= self.max_attempts {
                        error!(
                            title = %delivery.notification.title,
                            attempts = delivery.attempts,
                            error = %e,
                            "dropping notification"
                        );
                        report.dropped += 1;
                    } else {
                        warn!(
                            title = %delivery.notification.title,
                            attempts = delivery.attempts,
                            error = %e,
                            "notification delivery failed, will retry"
                        );
                        self.queue.push(delivery);
                        report.retried += 1;
                    }
                }
            }
        }
        report
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::CaseId;
    use crate::case::CaseStatus;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FlakySink {
        failures_left: Mutex<u32>,
        delivered: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for FlakySink {
        fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(NotifyError::Unavailable("smtp timeout".into()));
            }
            self.delivered.lock().push(notification.clone());
            Ok(())
        }
    }

    fn status_change(lawyer: Option<UserId>) -> DomainEvent {
        DomainEvent::CaseStatusChanged {
            case_id: CaseId(4),
            victim_id: UserId(1),
            lawyer_id: lawyer,
            from: CaseStatus::Published,
            to: CaseStatus::Funded,
        }
    }

    #[test]
    fn status_change_notifies_victim_and_lawyer() {
        let notes = status_change(Some(UserId(2))).notifications();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].recipient, Recipient::User(UserId(1)));
        assert_eq!(notes[1].recipient, Recipient::User(UserId(2)));
        assert_eq!(notes[0].message, "Case 4 moved from published to funded.");
        assert_eq!(notes[0].metadata["event"], "case_status_changed");
    }

    #[test]
    fn dispatch_delivers_everything_on_healthy_sink() {
        let outbox = Outbox::default();
        assert_eq!(outbox.publish(&[status_change(None)]), 1);
        let sink = FlakySink::default();
        let report = outbox.dispatch(&sink);
        assert_eq!(report.delivered, 1);
        assert_eq!(outbox.pending(), 0);
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[test]
    fn failed_delivery_is_retried_on_next_pass() {
        let outbox = Outbox::new(3);
        outbox.publish(&[status_change(None)]);
        let sink = FlakySink {
            failures_left: Mutex::new(1),
            ..Default::default()
        };
        let first = outbox.dispatch(&sink);
        assert_eq!(first.retried, 1);
        assert_eq!(outbox.pending(), 1);

        let second = outbox.dispatch(&sink);
        assert_eq!(second.delivered, 1);
        assert_eq!(outbox.pending(), 0);
    }

    #[test]
    fn delivery_is_dropped_after_max_attempts() {
        let outbox = Outbox::new(2);
        outbox.publish(&[status_change(None)]);
        let sink = FlakySink {
            failures_left: Mutex::new(10),
            ..Default::default()
        };
        outbox.dispatch(&sink);
        let report = outbox.dispatch(&sink);
        assert_eq!(report.dropped, 1);
        assert_eq!(outbox.pending(), 0);
    }
}
