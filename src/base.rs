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

//! Core identifier types, the acting principal, and money rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if $prefix.is_empty() {
                    write!(f, "{}", self.0)
                } else {
                    write!(f, "{}-{:08}", $prefix, self.0)
                }
            }
        }
    };
}

define_id!(
    /// Identifier of a platform user (victim, lawyer, investor or admin).
    UserId,
    ""
);
define_id!(
    /// Identifier of a legal case.
    CaseId,
    ""
);
define_id!(
    /// Identifier of a lawyer's bid on a case.
    BidId,
    ""
);
define_id!(
    /// Identifier of an investor's position in a case.
    InvestmentId,
    ""
);
define_id!(
    /// Identifier of a payout request. Displays as `WD-00000042`.
    WithdrawalId,
    "WD"
);
define_id!(
    /// Identifier of a ledger row. Displays as `TXN-00000042`.
    ///
    /// Transaction IDs are globally unique across every transaction kind.
    TransactionId,
    "TXN"
);

/// Role of an authenticated caller.
///
/// Role taxonomy is owned by the boundary; the core only uses the role to tell
/// administrators apart from the parties that own an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Victim,
    Lawyer,
    Investor,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Victim => "victim",
            Role::Lawyer => "lawyer",
            Role::Investor => "investor",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Role {
    type Err = crate::MarketplaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "victim" => Ok(Role::Victim),
            "lawyer" => Ok(Role::Lawyer),
            "investor" => Ok(Role::Investor),
            "admin" => Ok(Role::Admin),
            other => Err(crate::MarketplaceError::validation(
                "role",
                format!("unknown role `{other}`"),
            )),
        }
    }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn lawyer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Lawyer)
    }

    pub fn investor(user_id: UserId) -> Self {
        Self::new(user_id, Role::Investor)
    }

    pub fn victim(user_id: UserId) -> Self {
        Self::new(user_id, Role::Victim)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Number of fractional digits persisted for monetary values.
pub const MONEY_SCALE: u32 = 2;

/// Rounds a monetary amount to two decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `percentage`% of `amount`, rounded for persistence.
pub fn percent_of(amount: Decimal, percentage: Decimal) -> Decimal {
    round_money(amount * (percentage / Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn prefixed_ids_are_zero_padded() {
        assert_eq!(TransactionId(42).to_string(), "TXN-00000042");
        assert_eq!(WithdrawalId(7).to_string(), "WD-00000007");
        assert_eq!(CaseId(3).to_string(), "3");
    }

    #[test]
    fn round_money_uses_half_away_from_zero() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(0.135)), dec!(0.14));
        assert_eq!(round_money(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round_money(dec!(10)), dec!(10));
    }

    #[test]
    fn percent_of_rounds_result() {
        assert_eq!(percent_of(dec!(1000), dec!(7.5)), dec!(75.00));
        assert_eq!(percent_of(dec!(33.33), dec!(2)), dec!(0.67));
        assert_eq!(percent_of(dec!(100), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn percent_of_handles_large_amounts() {
        let large = dec!(70000000000000000000000000000);
        assert_eq!(percent_of(large, dec!(10)), dec!(7000000000000000000000000000));
        assert_eq!(percent_of(large, Decimal::ONE_HUNDRED), large);
    }

    #[test]
    fn principal_admin_check() {
        assert!(Principal::admin(UserId(1)).is_admin());
        assert!(!Principal::lawyer(UserId(1)).is_admin());
    }
}
