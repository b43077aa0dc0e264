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

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! The marketplace serializes case-scoped work on per-case mutexes and
//! withdrawals on per-user mutexes, with a read/write gate around commits.
//! These tests hammer those locks from many threads and check both that no
//! cycle ever forms and that the guarded invariants hold afterwards.

mod common;

use casefund::{
    BidStatus, CaseStatus, InvestmentStatus, Marketplace, MarketplaceError, Principal, UserId,
    WithdrawalMethod,
};
use common::*;
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

// === Deadlock Detector ===

fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

// === Tests ===

/// Many investors racing for the last slots of one case never overfund it.
#[test]
fn concurrent_investments_never_overfund() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let case_id = published_case(&market, dec!(10000));

    const NUM_THREADS: u64 = 32;
    const OPS_PER_THREAD: usize = 20;
    let exceeded = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|n| {
            let market = market.clone();
            let exceeded = exceeded.clone();
            thread::spawn(move || {
                for _ in 0..OPS_PER_THREAD {
                    match market.create_investment(&investor(n), case_id, dec!(25)) {
                        Ok(_) => {}
                        Err(MarketplaceError::FundingExceeded { .. })
                        | Err(MarketplaceError::InvalidStateTransition { .. }) => {
                            exceeded.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                    let _ = market.case(case_id);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    // 32 × 20 × 25 = 16,000 requested against a 10,000 goal.
    let case = market.case(case_id).unwrap();
    assert_eq!(case.current_funding, dec!(10000));
    assert_eq!(case.status, CaseStatus::Funded);
    let invested: Decimal = market
        .investments_for_case(case_id)
        .unwrap()
        .iter()
        .map(|inv| inv.amount)
        .sum();
    assert_eq!(invested, dec!(10000));
    assert_eq!(exceeded.load(Ordering::SeqCst), 240);
}

/// Investing and cancelling in parallel keeps funding equal to live positions.
#[test]
fn concurrent_invest_and_cancel_stay_consistent() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let case_id = published_case(&market, dec!(1000000));

    let handles: Vec<_> = (0..16u64)
        .map(|n| {
            let market = market.clone();
            thread::spawn(move || {
                let who = investor(n);
                for i in 0..25 {
                    let investment = market
                        .create_investment(&who, case_id, dec!(10.5))
                        .unwrap()
                        .value;
                    if i % 2 == 0 {
                        market.cancel_investment(&who, investment.id).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    let investments = market.investments_for_case(case_id).unwrap();
    let live: Decimal = investments
        .iter()
        .filter(|inv| inv.status == InvestmentStatus::Pending)
        .map(|inv| inv.amount)
        .sum();
    assert_eq!(market.case(case_id).unwrap().current_funding, live);
    // 16 threads × 12 kept × 10.5
    assert_eq!(live, dec!(2016));
}

/// The same lawyer submitting from many threads lands exactly one bid.
#[test]
fn concurrent_duplicate_bids_land_once() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let case_id = case_open_for_bidding(&market);
    let duplicates = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let market = market.clone();
            let duplicates = duplicates.clone();
            thread::spawn(move || {
                match market.submit_bid(&lawyer(), case_id, proposal(dec!(40000))) {
                    Ok(_) => {}
                    Err(MarketplaceError::DuplicateBid) => {
                        duplicates.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    assert_eq!(market.bids_for_case(case_id).unwrap().len(), 1);
    assert_eq!(duplicates.load(Ordering::SeqCst), 15);
}

/// Racing winner selections accept exactly one bid.
#[test]
fn concurrent_assignments_accept_one_bid() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let case_id = case_open_for_bidding(&market);
    let bids: Vec<_> = (0..8u64)
        .map(|n| {
            market
                .submit_bid(&Principal::lawyer(UserId(500 + n)), case_id, proposal(dec!(40000)))
                .unwrap()
                .value
                .id
        })
        .collect();

    let handles: Vec<_> = bids
        .into_iter()
        .map(|bid_id| {
            let market = market.clone();
            thread::spawn(move || market.assign_lawyer_from_bid(&admin(), case_id, bid_id).is_ok())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().expect("Thread panicked"))
        .filter(|won| *won)
        .count();
    stop_deadlock_detector(detector);

    assert_eq!(winners, 1);
    let statuses: Vec<_> = market
        .bids_for_case(case_id)
        .unwrap()
        .into_iter()
        .map(|bid| bid.status)
        .collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == BidStatus::Accepted).count(),
        1
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == BidStatus::Rejected).count(),
        7
    );
}

/// Parallel withdrawal requests from one user never exceed the balance.
#[test]
fn concurrent_withdrawals_respect_balance() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let (case_id, _, _) = won_case(&market);
    market.distribute_returns(&admin(), case_id).unwrap();
    // investor 1 holds 1,800,000

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let market = market.clone();
            thread::spawn(move || {
                let _ = market.request_withdrawal(
                    &investor(1),
                    dec!(100000),
                    WithdrawalMethod::BankTransfer,
                    String::new(),
                );
                let _ = market.available_balance(investor(1).user_id);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    let requested = market.withdrawals_for_user(investor(1).user_id).unwrap();
    assert_eq!(requested.len(), 18);
    assert_eq!(
        market.available_balance(investor(1).user_id).unwrap(),
        Decimal::ZERO
    );
}

/// Mixed workload across several cases and users.
#[test]
fn no_deadlock_mixed_operations() {
    let detector = start_deadlock_detector();
    let market = Arc::new(Marketplace::new());
    let cases: Vec<_> = (0..4)
        .map(|_| published_case(&market, dec!(100000)))
        .collect();
    let cases = Arc::new(cases);

    let handles: Vec<_> = (0..12u64)
        .map(|n| {
            let market = market.clone();
            let cases = cases.clone();
            thread::spawn(move || {
                for i in 0..30usize {
                    let case_id = cases[(n as usize + i) % cases.len()];
                    match i % 4 {
                        0 | 1 => {
                            if let Ok(committed) =
                                market.create_investment(&investor(n), case_id, dec!(50))
                            {
                                if i % 8 == 0 {
                                    let _ = market
                                        .cancel_investment(&investor(n), committed.value.id);
                                } else {
                                    let _ = market.confirm_investment(
                                        &admin(),
                                        committed.value.id,
                                        format!("pay-{n}-{i}"),
                                    );
                                }
                            }
                        }
                        2 => {
                            let _ = market.ledger();
                            let _ = market.cases();
                        }
                        _ => {
                            let _ = market.available_balance(investor(n).user_id);
                            let _ = market.investments_for_case(case_id);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    stop_deadlock_detector(detector);

    for case_id in cases.iter() {
        let case = market.case(*case_id).unwrap();
        assert!(case.current_funding <= case.funding_goal);
    }
}
