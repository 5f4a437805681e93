/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{collections::HashMap, fmt, str::FromStr};

use serde::Deserialize;
use tinyjson::JsonValue;

use crate::{Error, Result};

/// Default gas limit applied when none is configured
pub const DEFAULT_GAS_LIMIT: u64 = 4_000_000;
/// Default flat fee applied when none is configured
pub const DEFAULT_FEE: &str = "1000000uusd";

/// An amount of a single denomination, written as `<amount><denom>`,
/// e.g. `1200000uusd`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Coin {
    pub amount: u128,
    pub denom: String,
}

impl Coin {
    pub fn new(amount: u128, denom: &str) -> Self {
        Self { amount, denom: denom.to_string() }
    }

    /// Parse a comma separated coin list, e.g. `10uluna,500uusd`.
    /// An empty string yields an empty list.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',').map(str::trim).filter(|c| !c.is_empty()).map(Self::from_str).collect()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("amount".to_string(), JsonValue::String(self.amount.to_string())),
            ("denom".to_string(), JsonValue::String(self.denom.clone())),
        ]))
    }
}

impl FromStr for Coin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (amount, denom) = s.split_at(split);

        if amount.is_empty() {
            return Err(Error::InvalidCoin(format!("{s}: missing amount")))
        }

        if denom.is_empty() || !denom.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
            return Err(Error::InvalidCoin(format!("{s}: invalid denomination")))
        }

        let Ok(amount) = amount.parse::<u128>() else {
            return Err(Error::InvalidCoin(format!("{s}: amount out of range")))
        };

        Ok(Self { amount, denom: denom.to_string() })
    }
}

impl TryFrom<String> for Coin {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_str(&s)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Render a coin list as JSON
pub fn coins_to_json(coins: &[Coin]) -> JsonValue {
    JsonValue::Array(coins.iter().map(Coin::to_json).collect())
}

/// Gas limit plus a flat fee. Sessions carry a default policy which
/// individual calls may override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeePolicy {
    pub gas_limit: u64,
    pub amount: Coin,
}

impl FeePolicy {
    pub fn new(gas_limit: u64, amount: Coin) -> Self {
        Self { gas_limit, amount }
    }

    /// Build a policy from a gas limit and a textual fee like `1200000uusd`.
    pub fn parse(gas_limit: u64, fee: &str) -> Result<Self> {
        Ok(Self { gas_limit, amount: Coin::from_str(fee)? })
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(HashMap::from([
            ("gas_limit".to_string(), JsonValue::String(self.gas_limit.to_string())),
            ("amount".to_string(), JsonValue::Array(vec![self.amount.to_json()])),
        ]))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { gas_limit: DEFAULT_GAS_LIMIT, amount: Coin::new(1_000_000, "uusd") }
    }
}

impl fmt::Display for FeePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (gas limit {})", self.amount, self.gas_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coin() {
        let c = Coin::from_str("1200000uusd").unwrap();
        assert_eq!(c, Coin::new(1_200_000, "uusd"));
        assert_eq!(c.to_string(), "1200000uusd");

        assert!(Coin::from_str("uusd").is_err());
        assert!(Coin::from_str("100").is_err());
        assert!(Coin::from_str("10 uusd").is_err());
        assert!(Coin::from_str("").is_err());
    }

    #[test]
    fn parse_coin_list() {
        let coins = Coin::parse_list("10uluna, 500uusd").unwrap();
        assert_eq!(coins, vec![Coin::new(10, "uluna"), Coin::new(500, "uusd")]);
        assert!(Coin::parse_list("").unwrap().is_empty());
        assert!(Coin::parse_list("10uluna,bad").is_err());
    }

    #[test]
    fn default_fee_matches_literal() {
        let fee = FeePolicy::default();
        assert_eq!(fee, FeePolicy::parse(DEFAULT_GAS_LIMIT, DEFAULT_FEE).unwrap());
        assert_eq!(fee.to_string(), "1000000uusd (gas limit 4000000)");
    }

    #[test]
    fn fee_json_shape() {
        let fee = FeePolicy::parse(6_900_000, "1200000uusd").unwrap();
        let JsonValue::Object(map) = fee.to_json() else { panic!("fee is not an object") };
        assert_eq!(map["gas_limit"], JsonValue::String("6900000".to_string()));
        assert!(map["amount"].is_array());
    }
}
