//! Conversions between 18-decimal fixed-point integers and their decimal string form.

use ethnum::U256;

use crate::errors::ParseError;

/// Number of fractional digits carried by every fixed-point quantity.
pub(crate) const FRACTIONAL_DIGITS: usize = 18;

/// `10^18`, the raw value of one whole unit.
pub(crate) const SCALE: U256 = U256::new(1_000_000_000_000_000_000);

/// Parses a non-negative decimal such as `"100"`, `"0.01"` or `".5"` into its raw scaled value.
pub(crate) fn parse_decimal(s: &str) -> Result<U256, ParseError> {
    let s = s.trim();
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(ParseError::InvalidDecimal(s.to_owned()));
    }

    if frac_part.len() > FRACTIONAL_DIGITS {
        return Err(ParseError::TooManyFractionalDigits {
            max: FRACTIONAL_DIGITS,
            actual: frac_part.len(),
        });
    }

    let int = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10).map_err(|_| ParseError::Overflow(s.to_owned()))?
    };

    let padded = format!("{frac_part:0<width$}", width = FRACTIONAL_DIGITS);
    let frac =
        U256::from_str_radix(&padded, 10).map_err(|_| ParseError::InvalidDecimal(s.to_owned()))?;

    int.checked_mul(SCALE)
        .and_then(|scaled| scaled.checked_add(frac))
        .ok_or_else(|| ParseError::Overflow(s.to_owned()))
}

/// Formats a raw scaled value as the shortest decimal that round-trips through
/// [`parse_decimal`].
pub(crate) fn format_decimal(raw: U256) -> String {
    let int = raw / SCALE;
    let frac = (raw % SCALE).as_u64();

    if frac == 0 {
        return int.to_string();
    }

    let frac = format!("{frac:0>width$}", width = FRACTIONAL_DIGITS);
    format!("{int}.{}", frac.trim_end_matches('0'))
}
