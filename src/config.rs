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

//! Commission and fee policy.
//!
//! Percentages are loaded from a TOML file; any key that is missing falls back
//! to the platform default.
//!
//! ```toml
//! platform_commission_percentage = "7.5"
//! success_commission_percentage = "10"
//! withdrawal_fee_percentage = "2"
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a [`Policy`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`{field}` must be between 0 and 100, got {value}")]
    OutOfRange { field: &'static str, value: Decimal },
}

/// Fee schedule applied by funding, settlement and withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Charged on the principal when an investment is created.
    pub platform_commission_percentage: Decimal,
    /// Charged on investor profit at distribution time.
    pub success_commission_percentage: Decimal,
    /// Deducted from every withdrawal.
    pub withdrawal_fee_percentage: Decimal,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            platform_commission_percentage: dec!(7.5),
            success_commission_percentage: dec!(10),
            withdrawal_fee_percentage: dec!(2),
        }
    }
}

impl Policy {
    /// Parses and validates a policy from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let policy: Policy = toml::from_str(contents)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Loads a policy file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading policy");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            (
                "platform_commission_percentage",
                self.platform_commission_percentage,
            ),
            (
                "success_commission_percentage",
                self.success_commission_percentage,
            ),
            ("withdrawal_fee_percentage", self.withdrawal_fee_percentage),
        ];
        for (field, value) in fields {
            if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}
