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

//! Case lifecycle operations: submission, admin evaluation, direct lawyer
//! assignment and closure.

use crate::MarketplaceError;
use crate::base::{CaseId, Principal, Role, round_money};
use crate::case::{Case, CaseStatus, CaseSubmission, LawyerTerms, Outcome, check_non_negative};
use crate::engine::Marketplace;
use crate::error::Result;
use crate::event::{Committed, DomainEvent};
use crate::investment::InvestmentStatus;
use crate::store::{Repository, Sequence, UnitOfWork};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of the proceedings, reported when a case is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseClosure {
    pub outcome: Outcome,
    pub amount_recovered: Decimal,
    pub legal_costs: Decimal,
    pub outcome_description: String,
    pub resolution_date: NaiveDate,
}

pub(crate) fn status_changed(case: &Case, from: CaseStatus) -> DomainEvent {
    DomainEvent::CaseStatusChanged {
        case_id: case.id,
        victim_id: case.victim_id,
        lawyer_id: case.lawyer_id,
        from,
        to: case.status,
    }
}

impl<R: Repository> Marketplace<R> {
    /// Registers a new case owned by the submitting victim.
    pub fn submit(
        &self,
        principal: &Principal,
        submission: CaseSubmission,
    ) -> Result<Committed<Case>> {
        if principal.role != Role::Victim {
            return Err(MarketplaceError::Unauthorized);
        }
        submission.validate()?;

        let id = CaseId(self.repository().next_id(Sequence::Case));
        let case = Case::new(id, principal.user_id, submission, Utc::now());

        let mut unit = UnitOfWork::new();
        unit.put_case(case.clone());
        self.commit(unit)?;

        info!(case_id = %case.id, victim_id = %case.victim_id, "case submitted");
        let events = vec![DomainEvent::CaseSubmitted {
            case_id: case.id,
            victim_id: case.victim_id,
        }];
        Ok(Committed::new(case, events))
    }

    /// Moves a case to `target` and merges `evaluation` into its metadata.
    ///
    /// Admin only, except that the assigned lawyer may start proceedings
    /// (`funded -> in_progress`). `lawyer_assigned` and `completed` are reached
    /// through [`Marketplace::assign_lawyer_from_bid`] and [`Marketplace::close`].
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::InvalidStateTransition`] - the pair is not in the table.
    /// - [`MarketplaceError::ValidationFailed`] - reserved target, or publishing
    ///   without a lawyer or funding goal.
    pub fn evaluate(
        &self,
        principal: &Principal,
        case_id: CaseId,
        target: CaseStatus,
        evaluation: BTreeMap<String, serde_json::Value>,
    ) -> Result<Committed<Case>> {
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        let lawyer_starting =
            target == CaseStatus::InProgress && case.is_assigned_lawyer(principal.user_id);
        if !principal.is_admin() && !lawyer_starting {
            return Err(MarketplaceError::Unauthorized);
        }
        if matches!(target, CaseStatus::LawyerAssigned | CaseStatus::Completed) {
            return Err(MarketplaceError::validation(
                "status",
                format!("`{target}` is set by its dedicated operation"),
            ));
        }

        let now = Utc::now();
        let from = case
            .transition_to(target, now)
            .inspect_err(|e| debug!(case_id = %case_id, error = %e, "evaluation refused"))?;

        let mut unit = UnitOfWork::new();
        match target {
            CaseStatus::Published => {
                if case.lawyer_id.is_none() {
                    return Err(MarketplaceError::validation(
                        "lawyer_id",
                        "a case needs an assigned lawyer before publication",
                    ));
                }
                if case.funding_goal <= Decimal::ZERO {
                    return Err(MarketplaceError::validation(
                        "funding_goal",
                        "must be positive before publication",
                    ));
                }
                case.is_public_marketplace = true;
                case.published_at = Some(now);
            }
            CaseStatus::Funded => case.funded_at = Some(now),
            CaseStatus::InProgress => {
                for mut investment in self.repository().investments_for_case(case_id)? {
                    if investment.status == InvestmentStatus::Confirmed {
                        investment.status = InvestmentStatus::Active;
                        unit.put_investment(investment);
                    }
                }
            }
            _ => {}
        }

        case.evaluation.extend(evaluation);
        case.evaluated_by = Some(principal.user_id);
        case.evaluated_at = Some(now);
        unit.put_case(case.clone());
        self.commit(unit)?;

        info!(
            case_id = %case_id,
            from = %from,
            to = %target,
            by = %principal.user_id,
            "case status changed"
        );
        let events = vec![status_changed(&case, from)];
        Ok(Committed::new(case, events))
    }

    /// Lawyer self-service path: take a case without bidding.
    ///
    /// Legal from `submitted`, `under_review` or `approved` while no lawyer is
    /// assigned. Copies `terms` onto the case and leaves it `approved`.
    pub fn assign_lawyer_direct(
        &self,
        principal: &Principal,
        case_id: CaseId,
        terms: LawyerTerms,
    ) -> Result<Committed<Case>> {
        if principal.role != Role::Lawyer {
            return Err(MarketplaceError::Unauthorized);
        }
        terms.validate()?;

        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        if !matches!(
            case.status,
            CaseStatus::Submitted | CaseStatus::UnderReview | CaseStatus::Approved
        ) {
            return Err(MarketplaceError::transition(
                "case",
                case.status,
                CaseStatus::Approved,
            ));
        }
        if case.lawyer_id.is_some() {
            return Err(MarketplaceError::validation(
                "lawyer_id",
                "case already has a lawyer",
            ));
        }

        let now = Utc::now();
        let previous = case.status;
        case.apply_terms(principal.user_id, &terms);
        if case.status != CaseStatus::Approved {
            case.transition_to(CaseStatus::Approved, now)?;
        }
        case.updated_at = now;

        let mut unit = UnitOfWork::new();
        unit.put_case(case.clone());
        self.commit(unit)?;

        info!(case_id = %case_id, lawyer_id = %principal.user_id, "lawyer self-assigned");
        let mut events = vec![DomainEvent::LawyerAssigned {
            case_id,
            victim_id: case.victim_id,
            lawyer_id: principal.user_id,
        }];
        if previous != case.status {
            events.push(status_changed(&case, previous));
        }
        Ok(Committed::new(case, events))
    }

    /// Records the outcome of the proceedings and completes the case.
    ///
    /// Only the assigned lawyer or an admin may close, and only from `funded`
    /// or `in_progress`.
    pub fn close(
        &self,
        principal: &Principal,
        case_id: CaseId,
        closure: CaseClosure,
    ) -> Result<Committed<Case>> {
        check_non_negative("amount_recovered", closure.amount_recovered)?;
        check_non_negative("legal_costs", closure.legal_costs)?;

        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        if !principal.is_admin() && !case.is_assigned_lawyer(principal.user_id) {
            return Err(MarketplaceError::Unauthorized);
        }

        let now = Utc::now();
        let from = case.transition_to(CaseStatus::Completed, now)?;
        case.outcome = Some(closure.outcome);
        case.amount_recovered = Some(round_money(closure.amount_recovered));
        case.legal_costs = Some(round_money(closure.legal_costs));
        case.outcome_description = Some(closure.outcome_description);
        case.resolution_date = Some(closure.resolution_date);
        case.closed_at = Some(now);

        let mut unit = UnitOfWork::new();
        unit.put_case(case.clone());
        self.commit(unit)?;

        info!(
            case_id = %case_id,
            outcome = %closure.outcome,
            recovered = %closure.amount_recovered,
            "case closed"
        );
        let events = vec![
            status_changed(&case, from),
            DomainEvent::CaseClosed {
                case_id,
                victim_id: case.victim_id,
                outcome: closure.outcome,
                amount_recovered: closure.amount_recovered,
            },
        ];
        Ok(Committed::new(case, events))
    }
}
