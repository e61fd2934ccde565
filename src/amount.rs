//! Token Amount Conversion
//!
//! Converts between human-readable decimal amounts ("10.50") and on-chain
//! base units (10_500_000 for a 6-decimal token).

use thiserror::Error;

/// Largest decimals value accepted. `10^38` still fits in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

/// Errors raised while parsing a decimal amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,
    #[error("Invalid amount '{0}': expected a non-negative decimal number")]
    Invalid(String),
    #[error("Amount '{amount}' has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },
    #[error("Amount '{0}' overflows the token's base units")]
    Overflow(String),
    #[error("Unsupported token decimals {0}")]
    Decimals(u8),
}

/// Parses a decimal string into base units.
///
/// # Arguments
///
/// * `amount` - Decimal amount (e.g. "10.00", ".5", "3")
/// * `decimals` - Token decimals
///
/// # Returns
///
/// * `Ok(u128)` - Amount in base units
/// * `Err(AmountError)` - Malformed amount, too many fractional digits, or overflow
pub fn parse_units(amount: &str, decimals: u8) -> Result<u128, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::Decimals(decimals));
    }
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Invalid(amount.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::Invalid(amount.to_string()));
    }

    // Trailing zeros beyond the token precision carry no value
    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }

    let scale = 10u128.pow(decimals as u32);
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow(amount.to_string()))?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| AmountError::Overflow(amount.to_string()))?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(|| AmountError::Overflow(amount.to_string()))
}

/// Formats base units as a decimal string without trailing zeros.
pub fn format_units(units: u128, decimals: u8) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let decimals = decimals.min(MAX_DECIMALS);
    let scale = 10u128.pow(decimals as u32);
    let whole = units / scale;
    let fraction = units % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
