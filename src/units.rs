use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::error::ErrorKind;

/// Number of fractional digits between the ledger's minor unit and the
/// display currency unit.
pub const DECIMALS: u32 = 18;

const SCALE: u128 = 10u128.pow(DECIMALS);

/// Price in the ledger's smallest denomination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinorUnits(pub u128);

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub fn get(self) -> u128 {
        self.0
    }
}

impl From<u128> for MinorUnits {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_display(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountRejection {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative")]
    Negative,
    #[error("only decimal digits and a single '.' are allowed")]
    Malformed,
    #[error("more than 18 fractional digits")]
    TooPrecise,
    #[error("amount is too large")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount `{input}`: {reason}")]
pub struct AmountError {
    pub input: String,
    pub reason: AmountRejection,
}

impl AmountError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidAmount
    }
}

/// Parses a non-negative decimal amount into minor units.
///
/// Precision beyond [`DECIMALS`] is rejected rather than truncated; trailing
/// zeros past the scale are accepted since they carry no value.
pub fn to_minor_units(display: &str) -> Result<MinorUnits, AmountError> {
    let reject = |reason| AmountError {
        input: display.to_owned(),
        reason,
    };

    let trimmed = display.trim();
    if trimmed.is_empty() {
        return Err(reject(AmountRejection::Empty));
    }
    if trimmed.starts_with('-') {
        return Err(reject(AmountRejection::Negative));
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(reject(AmountRejection::Malformed));
    }

    let significant = fraction.trim_end_matches('0');
    if significant.len() > DECIMALS as usize {
        return Err(reject(AmountRejection::TooPrecise));
    }

    let whole_value = if whole.is_empty() {
        0
    } else {
        // only digits left, so the sole failure mode is overflow
        whole
            .parse::<u128>()
            .map_err(|_| reject(AmountRejection::Overflow))?
    };
    let fraction_value = if significant.is_empty() {
        0
    } else {
        format!("{significant:0<width$}", width = DECIMALS as usize)
            .parse::<u128>()
            .map_err(|_| reject(AmountRejection::Malformed))?
    };

    whole_value
        .checked_mul(SCALE)
        .and_then(|value| value.checked_add(fraction_value))
        .map(MinorUnits)
        .ok_or_else(|| reject(AmountRejection::Overflow))
}

/// Formats minor units as a decimal string without trailing fractional zeros.
pub fn to_display(minor: MinorUnits) -> String {
    let whole = minor.0 / SCALE;
    let fraction = minor.0 % SCALE;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}", width = DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Converts to a [`Decimal`] in display units, if the value fits its 96-bit mantissa.
pub fn to_decimal(minor: MinorUnits) -> Option<Decimal> {
    let value = i128::try_from(minor.0).ok()?;
    Decimal::try_from_i128_with_scale(value, DECIMALS).ok()
}

/// Compact display rounded to `dp` fractional digits, used on property cards.
///
/// Falls back to the exact display when the value is out of [`Decimal`] range.
pub fn to_display_rounded(minor: MinorUnits, dp: u32) -> String {
    match to_decimal(minor) {
        Some(value) => value
            .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        None => to_display(minor),
    }
}
