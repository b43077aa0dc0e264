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

//! Bid evaluation.
//!
//! Lawyers propose terms while a case is open for bidding; admins score the
//! proposals and pick a winner. Selecting a winner copies its terms onto the
//! case, accepts it and rejects every other live bid in a single commit.

use crate::MarketplaceError;
use crate::base::{BidId, CaseId, Principal, Role};
use crate::bid::{BidProposal, BidStatus, LawyerBid, NOT_SELECTED_FEEDBACK};
use crate::case::{Case, CaseStatus};
use crate::engine::{Marketplace, require_admin};
use crate::error::Result;
use crate::event::{Committed, DomainEvent};
use crate::lifecycle::status_changed;
use crate::store::{Repository, Sequence, StoreError, UnitOfWork};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub const MIN_ADMIN_SCORE: u8 = 1;
pub const MAX_ADMIN_SCORE: u8 = 10;

/// Checks that `case` accepts proposals at `now`.
fn ensure_open_for_bidding(case: &Case, now: DateTime<Utc>) -> Result<()> {
    if !case.status.is_open_for_bidding() {
        return Err(MarketplaceError::transition(
            "case",
            case.status,
            CaseStatus::ReceivingBids,
        ));
    }
    if let Some(deadline) = case.bid_deadline {
        if now > deadline {
            return Err(MarketplaceError::validation(
                "bid_deadline",
                format!("bidding closed at {deadline}"),
            ));
        }
    }
    Ok(())
}

/// Stages the first-bid move `approved_for_bidding -> receiving_bids`.
fn open_receiving(
    case: &mut Case,
    now: DateTime<Utc>,
    unit: &mut UnitOfWork,
    events: &mut Vec<DomainEvent>,
) -> Result<()> {
    if case.status == CaseStatus::ApprovedForBidding {
        let from = case.transition_to(CaseStatus::ReceivingBids, now)?;
        unit.put_case(case.clone());
        events.push(status_changed(case, from));
    }
    Ok(())
}

fn owned_by(bid: &LawyerBid, principal: &Principal) -> Result<()> {
    if bid.lawyer_id != principal.user_id {
        return Err(MarketplaceError::Unauthorized);
    }
    Ok(())
}

impl<R: Repository> Marketplace<R> {
    /// Submits a proposal for `case_id`.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::InvalidStateTransition`] - case not open for bidding.
    /// - [`MarketplaceError::ValidationFailed`] - proposal out of range or past the bid deadline.
    /// - [`MarketplaceError::DuplicateBid`] - the lawyer already bid on this case.
    pub fn submit_bid(
        &self,
        principal: &Principal,
        case_id: CaseId,
        proposal: BidProposal,
    ) -> Result<Committed<LawyerBid>> {
        self.place_bid(principal, case_id, proposal, BidStatus::Submitted)
    }

    /// Saves a proposal without submitting it. Drafts hold the lawyer's single
    /// slot on the case.
    pub fn draft_bid(
        &self,
        principal: &Principal,
        case_id: CaseId,
        proposal: BidProposal,
    ) -> Result<Committed<LawyerBid>> {
        self.place_bid(principal, case_id, proposal, BidStatus::Draft)
    }

    fn place_bid(
        &self,
        principal: &Principal,
        case_id: CaseId,
        proposal: BidProposal,
        status: BidStatus,
    ) -> Result<Committed<LawyerBid>> {
        if principal.role != Role::Lawyer {
            return Err(MarketplaceError::Unauthorized);
        }
        proposal.validate()?;

        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        let now = Utc::now();
        ensure_open_for_bidding(&case, now)?;

        let id = BidId(self.repository().next_id(Sequence::Bid));
        let bid = LawyerBid::new(id, case_id, principal.user_id, proposal, status, now);

        let mut unit = UnitOfWork::new();
        let mut events = Vec::new();
        unit.put_bid(bid.clone());
        if status == BidStatus::Submitted {
            open_receiving(&mut case, now, &mut unit, &mut events)?;
            events.push(DomainEvent::BidSubmitted {
                case_id,
                bid_id: id,
                lawyer_id: principal.user_id,
            });
        }

        self.repository().commit(unit).map_err(|e| match e {
            StoreError::UniqueViolation { .. } => {
                debug!(case_id = %case_id, lawyer_id = %principal.user_id, "duplicate bid refused");
                MarketplaceError::DuplicateBid
            }
            other => other.into(),
        })?;

        info!(
            case_id = %case_id,
            bid_id = %id,
            lawyer_id = %principal.user_id,
            status = %status,
            "bid placed"
        );
        Ok(Committed::new(bid, events))
    }

    /// Submits a previously drafted bid.
    pub fn submit_draft_bid(
        &self,
        principal: &Principal,
        bid_id: BidId,
    ) -> Result<Committed<LawyerBid>> {
        let case_id = self.bid(bid_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut bid = self.bid(bid_id)?;
        owned_by(&bid, principal)?;
        if bid.status != BidStatus::Draft {
            return Err(MarketplaceError::transition(
                "bid",
                bid.status,
                BidStatus::Submitted,
            ));
        }
        let mut case = self.case(case_id)?;
        let now = Utc::now();
        ensure_open_for_bidding(&case, now)?;

        bid.status = BidStatus::Submitted;
        bid.submitted_at = Some(now);
        bid.updated_at = now;

        let mut unit = UnitOfWork::new();
        let mut events = Vec::new();
        unit.put_bid(bid.clone());
        open_receiving(&mut case, now, &mut unit, &mut events)?;
        events.push(DomainEvent::BidSubmitted {
            case_id,
            bid_id,
            lawyer_id: bid.lawyer_id,
        });
        self.commit(unit)?;

        info!(case_id = %case_id, bid_id = %bid_id, "draft bid submitted");
        Ok(Committed::new(bid, events))
    }

    /// Replaces the terms of a draft or submitted bid while the case still
    /// takes bids.
    pub fn update_bid(
        &self,
        principal: &Principal,
        bid_id: BidId,
        proposal: BidProposal,
    ) -> Result<Committed<LawyerBid>> {
        proposal.validate()?;
        let case_id = self.bid(bid_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut bid = self.bid(bid_id)?;
        owned_by(&bid, principal)?;
        if !bid.status.is_editable() {
            return Err(MarketplaceError::transition("bid", bid.status, "edited"));
        }
        let now = Utc::now();
        ensure_open_for_bidding(&self.case(case_id)?, now)?;
        bid.proposal = proposal;
        bid.updated_at = now;

        let mut unit = UnitOfWork::new();
        unit.put_bid(bid.clone());
        self.commit(unit)?;

        info!(bid_id = %bid_id, "bid updated");
        Ok(Committed::new(bid, Vec::new()))
    }

    /// Withdraws a bid. The lawyer keeps no second slot on the case.
    pub fn withdraw_bid(
        &self,
        principal: &Principal,
        bid_id: BidId,
    ) -> Result<Committed<LawyerBid>> {
        let case_id = self.bid(bid_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut bid = self.bid(bid_id)?;
        owned_by(&bid, principal)?;
        if !bid.status.is_withdrawable() {
            return Err(MarketplaceError::transition(
                "bid",
                bid.status,
                BidStatus::Withdrawn,
            ));
        }
        bid.status = BidStatus::Withdrawn;
        bid.updated_at = Utc::now();

        let mut unit = UnitOfWork::new();
        unit.put_bid(bid.clone());
        self.commit(unit)?;

        info!(bid_id = %bid_id, case_id = %case_id, "bid withdrawn");
        let events = vec![DomainEvent::BidWithdrawn {
            case_id,
            bid_id,
            lawyer_id: bid.lawyer_id,
        }];
        Ok(Committed::new(bid, events))
    }

    /// Scores a bid (1-10) and puts it under review.
    pub fn review_bid(
        &self,
        principal: &Principal,
        bid_id: BidId,
        score: u8,
        feedback: String,
    ) -> Result<Committed<LawyerBid>> {
        require_admin(principal)?;
        if !(MIN_ADMIN_SCORE..=MAX_ADMIN_SCORE).contains(&score) {
            return Err(MarketplaceError::validation(
                "admin_score",
                format!("must be between {MIN_ADMIN_SCORE} and {MAX_ADMIN_SCORE}"),
            ));
        }
        let case_id = self.bid(bid_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut bid = self.bid(bid_id)?;
        if !bid.status.is_competing() {
            return Err(MarketplaceError::transition(
                "bid",
                bid.status,
                BidStatus::UnderReview,
            ));
        }
        let now = Utc::now();
        bid.status = BidStatus::UnderReview;
        bid.admin_score = Some(score);
        bid.admin_feedback = Some(feedback);
        bid.reviewed_by = Some(principal.user_id);
        bid.reviewed_at = Some(now);
        bid.updated_at = now;

        let mut unit = UnitOfWork::new();
        unit.put_bid(bid.clone());
        self.commit(unit)?;

        info!(bid_id = %bid_id, score, reviewer = %principal.user_id, "bid reviewed");
        let events = vec![DomainEvent::BidReviewed {
            case_id,
            bid_id,
            lawyer_id: bid.lawyer_id,
            score,
        }];
        Ok(Committed::new(bid, events))
    }

    /// Turns down a single live bid.
    pub fn reject_bid(
        &self,
        principal: &Principal,
        bid_id: BidId,
        feedback: String,
    ) -> Result<Committed<LawyerBid>> {
        require_admin(principal)?;
        let case_id = self.bid(bid_id)?.case_id;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut bid = self.bid(bid_id)?;
        if bid.status.is_terminal() {
            return Err(MarketplaceError::transition(
                "bid",
                bid.status,
                BidStatus::Rejected,
            ));
        }
        bid.reject(principal.user_id, &feedback, Utc::now());

        let mut unit = UnitOfWork::new();
        unit.put_bid(bid.clone());
        self.commit(unit)?;

        info!(bid_id = %bid_id, case_id = %case_id, "bid rejected");
        let events = vec![DomainEvent::BidRejected {
            case_id,
            bid_id,
            lawyer_id: bid.lawyer_id,
            feedback,
        }];
        Ok(Committed::new(bid, events))
    }

    /// Selects the winning bid for a case.
    ///
    /// In one commit: copies the winner's terms onto the case, assigns its
    /// lawyer, moves the case to `lawyer_assigned`, accepts the winner and
    /// rejects every other non-terminal bid with [`NOT_SELECTED_FEEDBACK`].
    pub fn assign_lawyer_from_bid(
        &self,
        principal: &Principal,
        case_id: CaseId,
        bid_id: BidId,
    ) -> Result<Committed<Case>> {
        require_admin(principal)?;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        let mut winner = self.bid(bid_id)?;
        if winner.case_id != case_id {
            return Err(MarketplaceError::validation(
                "bid_id",
                "bid does not belong to this case",
            ));
        }
        if !case.status.is_assignable() {
            return Err(MarketplaceError::transition(
                "case",
                case.status,
                CaseStatus::LawyerAssigned,
            ));
        }
        if !winner.status.is_competing() {
            return Err(MarketplaceError::transition(
                "bid",
                winner.status,
                BidStatus::Accepted,
            ));
        }

        let now = Utc::now();
        case.apply_terms(winner.lawyer_id, &winner.proposal.terms());
        let from = case.transition_to(CaseStatus::LawyerAssigned, now)?;

        winner.status = BidStatus::Accepted;
        winner.reviewed_by = Some(principal.user_id);
        winner.reviewed_at = Some(now);
        winner.updated_at = now;

        let mut unit = UnitOfWork::new();
        let mut events = vec![
            status_changed(&case, from),
            DomainEvent::LawyerAssigned {
                case_id,
                victim_id: case.victim_id,
                lawyer_id: winner.lawyer_id,
            },
            DomainEvent::BidAccepted {
                case_id,
                bid_id,
                lawyer_id: winner.lawyer_id,
            },
        ];
        unit.put_case(case.clone());
        unit.put_bid(winner.clone());

        let losers = self
            .repository()
            .bids_for_case(case_id)?
            .into_iter()
            .filter(|bid| bid.id != bid_id && !bid.status.is_terminal());
        let mut rejected = 0usize;
        for mut loser in losers {
            loser.reject(principal.user_id, NOT_SELECTED_FEEDBACK, now);
            events.push(DomainEvent::BidRejected {
                case_id,
                bid_id: loser.id,
                lawyer_id: loser.lawyer_id,
                feedback: NOT_SELECTED_FEEDBACK.to_owned(),
            });
            unit.put_bid(loser);
            rejected += 1;
        }

        self.commit(unit)?;

        info!(
            case_id = %case_id,
            bid_id = %bid_id,
            lawyer_id = %winner.lawyer_id,
            rejected,
            "lawyer assigned from bid"
        );
        Ok(Committed::new(case, events))
    }

    /// Stops accepting proposals: `receiving_bids -> bids_closed`.
    pub fn close_bidding(&self, principal: &Principal, case_id: CaseId) -> Result<Committed<Case>> {
        self.move_bidding(principal, case_id, CaseStatus::BidsClosed)
    }

    /// Reopens a closed round: `bids_closed -> approved_for_bidding`.
    pub fn reopen_bidding(
        &self,
        principal: &Principal,
        case_id: CaseId,
    ) -> Result<Committed<Case>> {
        self.move_bidding(principal, case_id, CaseStatus::ApprovedForBidding)
    }

    fn move_bidding(
        &self,
        principal: &Principal,
        case_id: CaseId,
        target: CaseStatus,
    ) -> Result<Committed<Case>> {
        require_admin(principal)?;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        let expected = match target {
            CaseStatus::BidsClosed => CaseStatus::ReceivingBids,
            _ => CaseStatus::BidsClosed,
        };
        if case.status != expected {
            return Err(MarketplaceError::transition("case", case.status, target));
        }
        let from = case.transition_to(target, Utc::now())?;

        let mut unit = UnitOfWork::new();
        unit.put_case(case.clone());
        self.commit(unit)?;

        info!(case_id = %case_id, from = %from, to = %target, "bidding round moved");
        let events = vec![status_changed(&case, from)];
        Ok(Committed::new(case, events))
    }
}
