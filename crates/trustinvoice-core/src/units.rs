//! Conversion between human decimal amounts and chain minor units
//! (wei for ETH/MATIC, microAlgos for ALGO).

use alloy_primitives::utils::{self, ParseUnits};
use alloy_primitives::U256;

use crate::error::CoreError;

const MAX_U256_DIGITS: usize = 77;

/// Parse a non-negative decimal string such as `"100.5"` into minor units.
///
/// Unlike the underlying unit parser, excess fractional digits are an error
/// rather than being truncated.
pub fn parse_units(value: &str, decimals: u8) -> Result<u128, CoreError> {
    let value = value.trim();
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(CoreError::InvalidAmount(format!("not a number: {value:?}")));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(format!("not a non-negative decimal: {value}")));
    }
    if frac.len() > decimals as usize {
        return Err(CoreError::InvalidAmount(format!(
            "{value} has more than {decimals} decimal places"
        )));
    }

    // Keep the scaled value inside U256 before it is narrowed to u128.
    let significant = whole.trim_start_matches('0').len();
    if significant + decimals as usize > MAX_U256_DIGITS {
        return Err(CoreError::InvalidAmount(format!("{value} overflows")));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let frac = if frac.is_empty() { "0" } else { frac };
    let normalized = format!("{whole}.{frac}");
    let units = match utils::parse_units(&normalized, decimals) {
        Ok(ParseUnits::U256(units)) => units,
        Ok(ParseUnits::I256(_)) => {
            return Err(CoreError::InvalidAmount(format!("negative amount: {value}")))
        }
        Err(e) => return Err(CoreError::InvalidAmount(format!("{value}: {e}"))),
    };
    u128::try_from(units).map_err(|_| CoreError::InvalidAmount(format!("{value} overflows")))
}

/// Format minor units as a decimal string, trimming trailing zeros but
/// keeping at least one fractional digit (`97.5`, `100.0`).
pub fn format_units(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let Ok(formatted) = utils::format_units(U256::from(value), decimals) else {
        return value.to_string();
    };
    match formatted.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            format!("{whole}.{}", if frac.is_empty() { "0" } else { frac })
        }
        None => formatted,
    }
}
