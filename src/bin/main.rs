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

use casefund::{
    BidId, BidProposal, CaseClosure, CaseId, CaseStatus, CaseSubmission, DomainEvent,
    InvestmentId, LawyerTerms, Marketplace, MarketplaceError, Notification, NotificationSink,
    NotifyError, Outbox, Policy, Principal, Role, UserId, WithdrawalId, WithdrawalMethod,
};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Marketplace replay - run a CSV script of marketplace operations
///
/// Replays each command against an in-memory marketplace and writes the
/// resulting ledger to stdout. Refused commands are logged and skipped.
#[derive(Parser, Debug)]
#[command(name = "casefund")]
#[command(about = "Replays legal-case marketplace operations from a CSV script", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: command,actor,role,case,target,amount,detail
    /// Example: cargo run -- script.csv > ledger.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Fee policy in TOML; defaults apply when omitted
    #[arg(long, value_name = "POLICY")]
    policy: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("casefund=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let policy = match &args.policy {
        Some(path) => match Policy::load(path) {
            Ok(policy) => policy,
            Err(e) => {
                eprintln!("Error loading policy: {e}");
                process::exit(1);
            }
        },
        None => Policy::default(),
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let market = Marketplace::with_policy(policy);
    let outbox = Outbox::default();
    if let Err(e) = replay(&market, &outbox, BufReader::new(file)) {
        eprintln!("Error replaying commands: {e}");
        process::exit(1);
    }

    let report = outbox.dispatch(&LogSink);
    info!(
        delivered = report.delivered,
        dropped = report.dropped,
        "notifications dispatched"
    );

    if let Err(e) = write_ledger(&market, std::io::stdout()) {
        eprintln!("Error writing output: {e}");
        process::exit(1);
    }
}

/// Delivers notifications to the log.
struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            recipient = ?notification.recipient,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[derive(Error, Debug)]
enum ReplayError {
    #[error("missing `{0}` column")]
    Missing(&'static str),

    #[error("bad `{field}` value `{value}`")]
    Malformed { field: &'static str, value: String },

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
}

/// One script line.
///
/// Fields: `command, actor, role, case, target, amount, detail`. `target`
/// names the entity or value the command acts on (a bid, investment or
/// withdrawal id, a case status, an outcome or a payout method). `detail`
/// carries free text or `key=value` pairs separated by `;`.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    command: String,
    actor: u64,
    role: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    case: Option<u64>,
    #[serde(default)]
    target: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    detail: String,
}

impl CsvRecord {
    fn principal(&self) -> Result<Principal, ReplayError> {
        let role: Role = self.role.to_lowercase().parse()?;
        Ok(Principal::new(UserId(self.actor), role))
    }

    fn case(&self) -> Result<CaseId, ReplayError> {
        self.case.map(CaseId).ok_or(ReplayError::Missing("case"))
    }

    fn amount(&self) -> Result<Decimal, ReplayError> {
        self.amount.ok_or(ReplayError::Missing("amount"))
    }

    fn target_id(&self) -> Result<u64, ReplayError> {
        if self.target.is_empty() {
            return Err(ReplayError::Missing("target"));
        }
        self.target.parse().map_err(|_| ReplayError::Malformed {
            field: "target",
            value: self.target.clone(),
        })
    }

    /// `detail` split into `key=value` pairs.
    fn options(&self) -> BTreeMap<&str, &str> {
        self.detail
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect()
    }

    fn option_decimal(&self, key: &'static str) -> Result<Decimal, ReplayError> {
        match self.options().get(key) {
            None => Ok(Decimal::ZERO),
            Some(value) => value.parse().map_err(|_| ReplayError::Malformed {
                field: key,
                value: (*value).to_owned(),
            }),
        }
    }

    fn terms(&self) -> Result<LawyerTerms, ReplayError> {
        Ok(LawyerTerms {
            funding_goal: self.amount()?,
            expected_return: self.option_decimal("return")?,
            success_rate: self.option_decimal("probability")?,
            evaluation_fee: self.option_decimal("evaluation_fee")?,
            success_fee_percentage: self.option_decimal("success_fee")?,
            fixed_fee: self.option_decimal("fixed_fee")?,
        })
    }

    fn proposal(&self) -> Result<BidProposal, ReplayError> {
        let terms = self.terms()?;
        let options = self.options();
        let months = options.get("months").copied().unwrap_or("12");
        Ok(BidProposal {
            funding_goal_proposed: terms.funding_goal,
            expected_return_percentage: terms.expected_return,
            lawyer_evaluation_fee: terms.evaluation_fee,
            lawyer_success_fee_percentage: terms.success_fee_percentage,
            lawyer_fixed_fee: terms.fixed_fee,
            success_probability: terms.success_rate,
            estimated_duration_months: months.parse().map_err(|_| ReplayError::Malformed {
                field: "months",
                value: months.to_owned(),
            })?,
            legal_strategy: options.get("strategy").copied().unwrap_or("litigation").to_owned(),
            experience_summary: options.get("experience").copied().unwrap_or_default().to_owned(),
            additional_notes: None,
        })
    }

    fn closure(&self) -> Result<CaseClosure, ReplayError> {
        let options = self.options();
        let resolution_date = match options.get("date") {
            Some(date) => date.parse::<NaiveDate>().map_err(|_| ReplayError::Malformed {
                field: "date",
                value: (*date).to_owned(),
            })?,
            None => Utc::now().date_naive(),
        };
        Ok(CaseClosure {
            outcome: self.target.parse()?,
            amount_recovered: self.amount.unwrap_or(Decimal::ZERO),
            legal_costs: self.option_decimal("legal_costs")?,
            outcome_description: options.get("note").copied().unwrap_or_default().to_owned(),
            resolution_date,
        })
    }

    /// Runs the command and returns the events it raised.
    fn apply(&self, market: &Marketplace) -> Result<Vec<DomainEvent>, ReplayError> {
        let who = self.principal()?;
        let events = match self.command.to_lowercase().as_str() {
            "submit" => {
                let submission = CaseSubmission {
                    title: self.detail.clone(),
                    description: self.detail.clone(),
                    category: "general".to_owned(),
                    company: String::new(),
                    funding_goal: self.amount()?,
                    deadline: None,
                    bid_deadline: None,
                };
                market.submit(&who, submission)?.events
            }
            "evaluate" => {
                let target: CaseStatus = self.target.parse()?;
                let evaluation = self
                    .options()
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), serde_json::Value::from(v)))
                    .collect();
                market.evaluate(&who, self.case()?, target, evaluation)?.events
            }
            "bid" => market.submit_bid(&who, self.case()?, self.proposal()?)?.events,
            "draft_bid" => market.draft_bid(&who, self.case()?, self.proposal()?)?.events,
            "submit_draft" => market.submit_draft_bid(&who, BidId(self.target_id()?))?.events,
            "update_bid" => {
                market
                    .update_bid(&who, BidId(self.target_id()?), self.proposal()?)?
                    .events
            }
            "withdraw_bid" => market.withdraw_bid(&who, BidId(self.target_id()?))?.events,
            "review_bid" => {
                let amount = self.amount()?;
                let score = amount.to_u8().ok_or_else(|| ReplayError::Malformed {
                    field: "amount",
                    value: amount.to_string(),
                })?;
                market
                    .review_bid(&who, BidId(self.target_id()?), score, self.detail.clone())?
                    .events
            }
            "reject_bid" => {
                market
                    .reject_bid(&who, BidId(self.target_id()?), self.detail.clone())?
                    .events
            }
            "assign" => {
                market
                    .assign_lawyer_from_bid(&who, self.case()?, BidId(self.target_id()?))?
                    .events
            }
            "assign_direct" => {
                market
                    .assign_lawyer_direct(&who, self.case()?, self.terms()?)?
                    .events
            }
            "close_bidding" => market.close_bidding(&who, self.case()?)?.events,
            "reopen_bidding" => market.reopen_bidding(&who, self.case()?)?.events,
            "invest" => {
                market
                    .create_investment(&who, self.case()?, self.amount()?)?
                    .events
            }
            "confirm" => {
                market
                    .confirm_investment(&who, InvestmentId(self.target_id()?), self.detail.clone())?
                    .events
            }
            "cancel_investment" => {
                market
                    .cancel_investment(&who, InvestmentId(self.target_id()?))?
                    .events
            }
            "close" => market.close(&who, self.case()?, self.closure()?)?.events,
            "distribute" => market.distribute_returns(&who, self.case()?)?.events,
            "withdraw" => {
                let method: WithdrawalMethod = self.target.parse()?;
                market
                    .request_withdrawal(&who, self.amount()?, method, self.detail.clone())?
                    .events
            }
            "approve_withdrawal" => {
                market
                    .approve_withdrawal(&who, WithdrawalId(self.target_id()?))?
                    .events
            }
            "reject_withdrawal" => {
                market
                    .reject_withdrawal(&who, WithdrawalId(self.target_id()?), self.detail.clone())?
                    .events
            }
            "process_withdrawal" => {
                market
                    .process_withdrawal(&who, WithdrawalId(self.target_id()?))?
                    .events
            }
            "complete_withdrawal" => {
                let id = WithdrawalId(self.target_id()?);
                market
                    .complete_withdrawal(&who, id, self.detail.clone())?
                    .events
            }
            "cancel_withdrawal" => {
                market
                    .cancel_withdrawal(&who, WithdrawalId(self.target_id()?))?
                    .events
            }
            other => return Err(ReplayError::UnknownCommand(other.to_owned())),
        };
        Ok(events)
    }
}

/// Replays commands from a CSV reader.
///
/// Commands that fail (malformed rows, refused operations) are logged and
/// skipped; later rows still run. Events raised by successful commands are
/// queued on `outbox`.
///
/// # CSV Format
///
/// ```csv
/// command,actor,role,case,target,amount,detail
/// submit,1,victim,,,50000,Unpaid overtime
/// evaluate,9,admin,1,under_admin_review,,
/// invest,20,investor,1,,1000,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
fn replay<R: Read>(market: &Marketplace, outbox: &Outbox, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line + 1, error = %e, "skipping malformed row");
                continue;
            }
        };
        match record.apply(market) {
            Ok(events) => {
                debug!(
                    line = line + 1,
                    command = %record.command,
                    events = events.len(),
                    "command applied"
                );
                outbox.publish(&events);
            }
            Err(e) => {
                warn!(line = line + 1, command = %record.command, error = %e, "command refused")
            }
        }
    }
    Ok(())
}

/// Flat view of a ledger row for CSV output.
#[derive(Debug, Serialize)]
struct LedgerRecord {
    id: String,
    kind: String,
    direction: String,
    amount: Decimal,
    status: String,
    case: Option<u64>,
    user: Option<u64>,
    description: String,
}

/// Writes the ledger as CSV, one row per transaction in id order.
///
/// # CSV Format
///
/// Columns: `id, kind, direction, amount, status, case, user, description`
fn write_ledger<W: Write>(
    market: &Marketplace,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);
    for row in market.ledger()? {
        wtr.serialize(LedgerRecord {
            id: row.id.to_string(),
            kind: row.kind.to_string(),
            direction: row.direction.to_string(),
            amount: row.amount,
            status: row.status.to_string(),
            case: row.case_id.map(|id| id.0),
            user: row.user_id.map(|id| id.0),
            description: row.description,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefund::{InvestmentStatus, TransactionKind};
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "command,actor,role,case,target,amount,detail\n";

    fn run(script: &str) -> (Marketplace, Outbox) {
        let market = Marketplace::new();
        let outbox = Outbox::default();
        let input = format!("{HEADER}{script}");
        replay(&market, &outbox, Cursor::new(input)).unwrap();
        (market, outbox)
    }

    const TO_PUBLISHED: &str = "\
submit,1,victim,,,10000,Unpaid overtime
evaluate,9,admin,1,under_admin_review,,
evaluate,9,admin,1,approved_for_bidding,,
bid,2,lawyer,1,,10000,return=20;fixed_fee=500;success_fee=10;months=6
assign,9,admin,1,1,,
evaluate,9,admin,1,published,,
";

    #[test]
    fn replays_case_to_publication() {
        let (market, _) = run(TO_PUBLISHED);
        let case = market.case(CaseId(1)).unwrap();
        assert_eq!(case.status, CaseStatus::Published);
        assert_eq!(case.lawyer_id, Some(UserId(2)));
        assert_eq!(case.lawyer_fixed_fee, dec!(500));
    }

    #[test]
    fn refused_commands_are_skipped() {
        let script = format!(
            "{TO_PUBLISHED}invest,20,investor,1,,20000,\ninvest,20,investor,1,,4000,\n"
        );
        let (market, _) = run(&script);
        let investments = market.investments_for_case(CaseId(1)).unwrap();
        assert_eq!(investments.len(), 1);
        assert_eq!(investments[0].amount, dec!(4000));
        assert_eq!(investments[0].status, InvestmentStatus::Pending);
    }

    #[test]
    fn skips_malformed_rows() {
        let script = "submit,not-a-number,victim,,,100,x\n\
                      submit,1,victim,,,100,Case\n\
                      frobnicate,1,victim,,,,\n";
        let (market, _) = run(script);
        assert_eq!(market.cases().unwrap().len(), 1);
    }

    #[test]
    fn events_reach_the_outbox() {
        let (_, outbox) = run("submit,1,victim,,,100,Case\n");
        assert!(outbox.pending() > 0);
    }

    #[test]
    fn writes_ledger_csv() {
        let script = format!("{TO_PUBLISHED}invest,20,investor,1,,1000,\n");
        let (market, _) = run(&script);

        let ledger = market.ledger().unwrap();
        assert_eq!(ledger[0].kind, TransactionKind::Investment);

        let mut output = Vec::new();
        write_ledger(&market, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("id,kind,direction,amount,status,case,user,description"));
        assert!(output.contains("TXN-00000001,investment,in,1000,pending,1,20,"));
        assert!(output.contains("platform_commission,in,75"));
    }
}
