//! Coin amounts and conversion to the smallest unit

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Zatoshis per coin
pub const COIN: u64 = 100_000_000;

const DECIMALS: usize = 8;

/// Amount in zatoshis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    /// Zero amount
    pub const ZERO: Amount = Amount(0);

    /// Amount from a raw zatoshi value
    pub const fn from_zatoshis(zatoshis: u64) -> Self {
        Self(zatoshis)
    }

    /// Amount from whole coins, scaled by [`COIN`]
    pub fn from_coins(coins: u64) -> Result<Self> {
        coins
            .checked_mul(COIN)
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("{} coins overflows", coins)))
    }

    /// Zatoshi value
    pub const fn zatoshis(&self) -> u64 {
        self.0
    }

    /// Value in coins, for display only
    pub fn as_coins_f64(&self) -> f64 {
        self.0 as f64 / COIN as f64
    }
}

impl FromStr for Amount {
    type Err = Error;

    /// Parse a decimal coin amount such as `"1.25"` without going through floats.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidAmount("empty amount".to_string()));
        }

        let (whole, frac) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };

        if frac.len() > DECIMALS {
            return Err(Error::InvalidAmount(format!(
                "'{}' has more than {} decimal places",
                trimmed, DECIMALS
            )));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) || (whole.is_empty() && frac.is_empty()) {
            return Err(Error::InvalidAmount(format!("'{}' is not a number", trimmed)));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| Error::InvalidAmount(format!("'{}' is too large", trimmed)))?
        };
        let frac_zats: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = DECIMALS)
                .parse()
                .map_err(|_| Error::InvalidAmount(format!("'{}' is not a number", trimmed)))?
        };

        whole
            .checked_mul(COIN)
            .and_then(|z| z.checked_add(frac_zats))
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("'{}' is too large", trimmed)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}
