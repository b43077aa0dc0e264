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

//! Returns distribution.
//!
//! Once a case is closed as won with a positive recovery, the admin triggers
//! [`Marketplace::distribute_returns`]. In one commit the lawyer is paid, the
//! rest of the recovery (after legal costs) is split across paid-in
//! investments pro rata, and the platform keeps a success commission on each
//! investor's profit.
//!
//! Intermediate math runs at full [`Decimal`] precision. Proportional returns
//! are allocated in whole cents so the shares always add up to the rounded
//! net distributable.

use crate::MarketplaceError;
use crate::base::{CaseId, InvestmentId, MONEY_SCALE, Principal, UserId, percent_of, round_money};
use crate::case::{Case, CaseStatus, Outcome};
use crate::engine::{Marketplace, require_admin};
use crate::error::{NotDistributableReason, Result};
use crate::event::{Committed, DomainEvent};
use crate::investment::{Investment, InvestmentStatus};
use crate::store::{Repository, UnitOfWork};
use crate::transaction::{Direction, Transaction, TransactionKind, TransactionStatus};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, info};

/// One investor's slice of a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvestorReturn {
    pub investment_id: InvestmentId,
    pub investor_id: UserId,
    pub invested: Decimal,
    pub proportional_return: Decimal,
    pub profit: Decimal,
    pub success_commission: Decimal,
    /// What the investor is credited: `proportional_return - success_commission`.
    pub actual_return: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionSummary {
    pub case_id: CaseId,
    pub lawyer_payment: Decimal,
    pub net_distributable: Decimal,
    pub investor_returns: Vec<InvestorReturn>,
    /// Sum of the success commissions.
    pub platform_commission: Decimal,
}

/// What the lawyer is owed for a closed case.
///
/// The evaluation fee is always due. The fixed fee is due on a win, and the
/// success fee percentage applies to a positive recovery on a win.
pub fn lawyer_compensation(case: &Case) -> Decimal {
    let mut total = case.lawyer_evaluation_fee;
    if case.outcome == Some(Outcome::Won) {
        total += case.lawyer_fixed_fee;
        if let Some(recovered) = case.amount_recovered.filter(|r| *r > Decimal::ZERO) {
            total += percent_of(recovered, case.lawyer_success_fee_percentage);
        }
    }
    round_money(total)
}

/// Splits `net` across `investments` in proportion to their amounts.
///
/// Only settleable (confirmed or active) investments take part. Each share is
/// truncated to the cent, then the leftover cents go one at a time to the
/// largest truncated remainders (earlier investments win ties). Returns an
/// empty split when there is nothing to share or nobody to share it with.
pub fn split_returns(
    net: Decimal,
    investments: &[Investment],
    success_commission_percentage: Decimal,
) -> Vec<InvestorReturn> {
    let net = round_money(net);
    let eligible: Vec<&Investment> = investments
        .iter()
        .filter(|inv| inv.status.is_settleable())
        .collect();
    let total: Decimal = eligible.iter().map(|inv| inv.amount).sum();
    if net <= Decimal::ZERO || total <= Decimal::ZERO {
        return Vec::new();
    }

    let mut shares: Vec<(Decimal, Decimal)> = eligible
        .iter()
        .map(|inv| {
            let exact = share_of(net, inv.amount, total);
            let truncated = exact.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);
            (truncated, exact - truncated)
        })
        .collect();

    let cent = Decimal::new(1, MONEY_SCALE);
    let mut leftover = net - shares.iter().map(|(share, _)| *share).sum::<Decimal>();
    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| shares[*b].1.cmp(&shares[*a].1));
    for i in order {
        if leftover <= Decimal::ZERO {
            break;
        }
        shares[i].0 += cent;
        leftover -= cent;
    }

    eligible
        .iter()
        .zip(shares)
        .map(|(inv, (proportional_return, _))| {
            let profit = (proportional_return - inv.amount).max(Decimal::ZERO);
            let success_commission = percent_of(profit, success_commission_percentage);
            InvestorReturn {
                investment_id: inv.id,
                investor_id: inv.investor_id,
                invested: inv.amount,
                proportional_return,
                profit,
                success_commission,
                actual_return: proportional_return - success_commission,
            }
        })
        .collect()
}

/// `net * part / whole` for `part <= whole`. Falls back to scaling by the
/// ratio when the product does not fit in a `Decimal`.
fn share_of(net: Decimal, part: Decimal, whole: Decimal) -> Decimal {
    match net.checked_mul(part) {
        Some(product) => product / whole,
        None => part / whole * net,
    }
}

fn distributable(case: &Case) -> Result<Decimal, NotDistributableReason> {
    if case.status != CaseStatus::Completed {
        return Err(NotDistributableReason::NotCompleted);
    }
    if case.outcome != Some(Outcome::Won) {
        return Err(NotDistributableReason::NotWon);
    }
    let recovered = match case.amount_recovered {
        Some(recovered) if recovered > Decimal::ZERO => recovered,
        _ => return Err(NotDistributableReason::NothingRecovered),
    };
    if case.lawyer_paid_at.is_some() {
        return Err(NotDistributableReason::AlreadyDistributed);
    }
    Ok(recovered)
}

impl<R: Repository> Marketplace<R> {
    /// Pays the lawyer and the investors of a won case.
    ///
    /// Runs at most once per case: a second call fails with
    /// [`NotDistributableReason::AlreadyDistributed`] and writes nothing.
    pub fn distribute_returns(
        &self,
        principal: &Principal,
        case_id: CaseId,
    ) -> Result<Committed<DistributionSummary>> {
        require_admin(principal)?;
        let lock = self.repository().case_lock(case_id);
        let _guard = lock.lock();

        let mut case = self.case(case_id)?;
        let recovered = match distributable(&case) {
            Ok(recovered) => recovered,
            Err(reason) => {
                debug!(case_id = %case_id, %reason, "distribution refused");
                return Err(MarketplaceError::NotDistributable { reason });
            }
        };

        let now = Utc::now();
        let mut unit = UnitOfWork::new();
        let mut events = Vec::new();

        let lawyer_payment = lawyer_compensation(&case);
        case.lawyer_total_compensation = Some(lawyer_payment);
        case.lawyer_paid_at = Some(now);
        case.updated_at = now;
        if let Some(lawyer_id) = case.lawyer_id.filter(|_| lawyer_payment > Decimal::ZERO) {
            unit.record(
                Transaction::new(
                    self.next_transaction_id(),
                    TransactionKind::LawyerPayment,
                    Direction::Out,
                    lawyer_payment,
                    TransactionStatus::Completed,
                    now,
                )
                .for_case(case_id)
                .for_user(lawyer_id)
                .described(format!("Lawyer compensation for case {case_id}")),
            );
            events.push(DomainEvent::LawyerPaid {
                case_id,
                lawyer_id,
                amount: lawyer_payment,
            });
        }

        let legal_costs = case.legal_costs.unwrap_or(Decimal::ZERO);
        let net_distributable =
            round_money((recovered - legal_costs - lawyer_payment).max(Decimal::ZERO));

        let investments = self.repository().investments_for_case(case_id)?;
        let investor_returns = split_returns(
            net_distributable,
            &investments,
            self.policy().success_commission_percentage,
        );

        for share in &investor_returns {
            let Some(mut investment) = investments
                .iter()
                .find(|inv| inv.id == share.investment_id)
                .cloned()
            else {
                continue;
            };
            investment.actual_return = Some(share.actual_return);
            investment.success_commission_amount = share.success_commission;
            investment.status = InvestmentStatus::Completed;
            investment.completed_at = Some(now);

            if share.actual_return > Decimal::ZERO {
                unit.record(
                    Transaction::new(
                        self.next_transaction_id(),
                        TransactionKind::InvestorReturn,
                        Direction::Out,
                        share.actual_return,
                        TransactionStatus::Completed,
                        now,
                    )
                    .for_case(case_id)
                    .for_investment(share.investment_id)
                    .for_user(share.investor_id)
                    .described(format!("Return on investment {}", share.investment_id)),
                );
            }
            if share.success_commission > Decimal::ZERO {
                unit.record(
                    Transaction::new(
                        self.next_transaction_id(),
                        TransactionKind::SuccessCommission,
                        Direction::In,
                        share.success_commission,
                        TransactionStatus::Completed,
                        now,
                    )
                    .for_case(case_id)
                    .for_investment(share.investment_id)
                    .for_user(share.investor_id)
                    .described(format!(
                        "Success commission on investment {}",
                        share.investment_id
                    )),
                );
            }
            unit.put_investment(investment);
            events.push(DomainEvent::ReturnPaid {
                case_id,
                investment_id: share.investment_id,
                investor_id: share.investor_id,
                amount: share.actual_return,
            });
        }
        unit.put_case(case);
        self.commit(unit)?;

        let platform_commission: Decimal =
            investor_returns.iter().map(|r| r.success_commission).sum();
        info!(
            case_id = %case_id,
            lawyer_payment = %lawyer_payment,
            net_distributable = %net_distributable,
            investors = investor_returns.len(),
            platform_commission = %platform_commission,
            "returns distributed"
        );
        let summary = DistributionSummary {
            case_id,
            lawyer_payment,
            net_distributable,
            investor_returns,
            platform_commission,
        };
        Ok(Committed::new(summary, events))
    }
}
