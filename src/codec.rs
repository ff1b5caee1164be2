//! Decimal text to scaled-integer conversion.
//!
//! Metric values travel as decimal strings and are persisted as
//! `mantissa × 10^scale` with a 32-bit signed mantissa and a non-positive
//! scale, so no floating point value is ever stored.
//!
//! Accepted grammar: an optional `+`/`-` sign, at least one integer digit and
//! an optional `.` followed by fraction digits. Exponents, `NaN`, `inf`,
//! surrounding whitespace and any trailing characters are rejected.

use thiserror::Error;

/// Largest fraction length representable by an 8-bit scale.
const MAX_FRACTION_DIGITS: usize = 128;

/// Errors returned by [`encode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The text is not a decimal literal.
    #[error("'{0}' is not a number")]
    NotANumber(String),

    /// The literal does not fit a 32-bit mantissa or an 8-bit scale.
    #[error("'{0}' does not fit a 32-bit mantissa")]
    Overflow(String),
}

/// A decimal value as `mantissa × 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaled {
    pub mantissa: i32,
    pub scale: i8,
}

/// Encode decimal text as a mantissa/scale pair.
///
/// Trailing fraction zeros are dropped, so `"1.00"` encodes as `(1, 0)` and
/// `"12.835"` as `(12835, -3)`. The sign of the integer part applies to the
/// whole value, including `"-0.5"`.
pub fn encode(text: &str) -> Result<Scaled, CodecError> {
    let not_a_number = || CodecError::NotANumber(text.to_string());
    let overflow = || CodecError::Overflow(text.to_string());

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        Some(_) => (false, text),
        None => return Err(not_a_number()),
    };

    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if integer.is_empty() || !is_digits(integer) || !is_digits(fraction) {
        return Err(not_a_number());
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > MAX_FRACTION_DIGITS {
        return Err(overflow());
    }

    // Both parts are plain digit runs here, so a parse failure means overflow.
    let integer_part: i128 = integer.parse().map_err(|_| overflow())?;
    let fraction_part: i128 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| overflow())?
    };

    let magnitude = if integer_part == 0 {
        fraction_part
    } else {
        u32::try_from(fraction.len())
            .ok()
            .and_then(|digits| 10i128.checked_pow(digits))
            .and_then(|shift| integer_part.checked_mul(shift))
            .and_then(|shifted| shifted.checked_add(fraction_part))
            .ok_or_else(overflow)?
    };

    let signed = if negative { -magnitude } else { magnitude };
    let mantissa = i32::try_from(signed).map_err(|_| overflow())?;
    let scale = i16::try_from(fraction.len())
        .ok()
        .and_then(|digits| i8::try_from(-digits).ok())
        .ok_or_else(overflow)?;

    Ok(Scaled { mantissa, scale })
}

/// Real value of a stored mantissa/scale pair.
///
/// Negative scales divide by an exact power of ten, which keeps short
/// decimals such as `245 × 10^-2` equal to the nearest double of `2.45`.
pub fn decode(mantissa: i32, scale: i16) -> f64 {
    let value = f64::from(mantissa);
    if scale < 0 {
        value / 10f64.powi(-i32::from(scale))
    } else {
        value * 10f64.powi(i32::from(scale))
    }
}

/// Decimal text used in query replies.
pub fn format_value(mantissa: i32, scale: i16) -> String {
    decode(mantissa, scale).to_string()
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
