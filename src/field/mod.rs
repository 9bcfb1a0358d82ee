//! Typed field parsing and serialization primitives.
//!
//! [`FieldParse`] is the pluggable seam between the binder and concrete
//! value types: it receives the unquoted field bytes (plus the binding's
//! optional format hint) and produces a value or a [`FieldError`].
//! [`FieldWrite`] is the mirror for the writer.
//!
//! Integer parsing uses unsigned accumulation with a length gate: up to
//! 19 decimal digits cannot overflow a `u64`, so only the 20th digit pays
//! for checked arithmetic. Floats go through the standard library's
//! correctly-rounded path. All parsing is invariant-locale; culture-aware
//! forms belong to a custom [`FieldParse`] implementation.

use std::io::Write as _;

use thiserror::Error;

/// Why a field failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The field was empty where a value is required.
    #[error("empty field")]
    Empty,
    /// A byte outside the expected digit set.
    #[error("invalid digit")]
    InvalidDigit,
    /// The value does not fit the target type.
    #[error("value out of range")]
    OutOfRange,
    /// The field is not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,
    /// The field matched no accepted spelling.
    #[error("unrecognized value")]
    Unrecognized,
    /// The field is null but the target type has no null form.
    #[error("null not permitted")]
    NullNotAllowed,
    /// The field does not match the expected format.
    #[error("invalid format")]
    InvalidFormat,
}

/// Parse a typed value from unquoted field bytes.
pub trait FieldParse: Sized {
    /// Parse `bytes` into a value. `format_hint` carries the binding's
    /// optional format string (used by date types, ignored by most).
    fn parse_field(bytes: &[u8], format_hint: Option<&str>) -> Result<Self, FieldError>;

    /// The value assigned when the field matches the null set.
    /// `None` means the type cannot represent null.
    fn null_field() -> Option<Self> {
        None
    }
}

// ============================================================================
// Integer parsing
// ============================================================================

/// Decimal digits that fit a u64 without overflow checks.
const UNCHECKED_DIGITS: usize = 19;

fn parse_u64_digits(bytes: &[u8]) -> Result<u64, FieldError> {
    if bytes.is_empty() {
        return Err(FieldError::Empty);
    }
    if bytes.len() <= UNCHECKED_DIGITS {
        let mut value: u64 = 0;
        for &b in bytes {
            let digit = b.wrapping_sub(b'0');
            if digit > 9 {
                return Err(FieldError::InvalidDigit);
            }
            value = value * 10 + digit as u64;
        }
        Ok(value)
    } else {
        let mut value: u64 = 0;
        for &b in bytes {
            let digit = b.wrapping_sub(b'0');
            if digit > 9 {
                return Err(FieldError::InvalidDigit);
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit as u64))
                .ok_or(FieldError::OutOfRange)?;
        }
        Ok(value)
    }
}

/// Split an optional ASCII sign off the front.
fn split_sign(bytes: &[u8]) -> (bool, &[u8]) {
    match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    }
}

fn parse_i64_bytes(bytes: &[u8]) -> Result<i64, FieldError> {
    let (negative, digits) = split_sign(bytes);
    let magnitude = parse_u64_digits(digits)?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(FieldError::OutOfRange);
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| FieldError::OutOfRange)
    }
}

macro_rules! impl_parse_unsigned {
    ($($ty:ty),*) => {$(
        impl FieldParse for $ty {
            fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
                let (negative, digits) = split_sign(bytes);
                if negative {
                    return Err(FieldError::OutOfRange);
                }
                let value = parse_u64_digits(digits)?;
                <$ty>::try_from(value).map_err(|_| FieldError::OutOfRange)
            }
        }
    )*};
}

macro_rules! impl_parse_signed {
    ($($ty:ty),*) => {$(
        impl FieldParse for $ty {
            fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
                let value = parse_i64_bytes(bytes)?;
                <$ty>::try_from(value).map_err(|_| FieldError::OutOfRange)
            }
        }
    )*};
}

impl_parse_unsigned!(u8, u16, u32, u64, usize);
impl_parse_signed!(i8, i16, i32, i64, isize);

// ============================================================================
// Floats, bool, strings
// ============================================================================

impl FieldParse for f64 {
    fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
        if bytes.is_empty() {
            return Err(FieldError::Empty);
        }
        let text = core::str::from_utf8(bytes).map_err(|_| FieldError::InvalidUtf8)?;
        text.parse().map_err(|_| FieldError::InvalidDigit)
    }
}

impl FieldParse for f32 {
    fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
        if bytes.is_empty() {
            return Err(FieldError::Empty);
        }
        let text = core::str::from_utf8(bytes).map_err(|_| FieldError::InvalidUtf8)?;
        text.parse().map_err(|_| FieldError::InvalidDigit)
    }
}

impl FieldParse for bool {
    fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
        if bytes.eq_ignore_ascii_case(b"true") || bytes == b"1" {
            Ok(true)
        } else if bytes.eq_ignore_ascii_case(b"false") || bytes == b"0" {
            Ok(false)
        } else {
            Err(FieldError::Unrecognized)
        }
    }
}

impl FieldParse for String {
    fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
        core::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FieldError::InvalidUtf8)
    }
}

impl FieldParse for Vec<u8> {
    fn parse_field(bytes: &[u8], _hint: Option<&str>) -> Result<Self, FieldError> {
        Ok(bytes.to_vec())
    }
}

impl<T: FieldParse> FieldParse for Option<T> {
    fn parse_field(bytes: &[u8], hint: Option<&str>) -> Result<Self, FieldError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        T::parse_field(bytes, hint).map(Some)
    }

    fn null_field() -> Option<Self> {
        Some(None)
    }
}

#[cfg(feature = "chrono")]
impl FieldParse for chrono::NaiveDate {
    fn parse_field(bytes: &[u8], hint: Option<&str>) -> Result<Self, FieldError> {
        let text = core::str::from_utf8(bytes).map_err(|_| FieldError::InvalidUtf8)?;
        let format = hint.unwrap_or("%Y-%m-%d");
        chrono::NaiveDate::parse_from_str(text, format).map_err(|_| FieldError::InvalidFormat)
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize a typed value into raw field bytes.
///
/// Implementations write the value's invariant form; the writer applies
/// quoting and injection policy afterwards.
pub trait FieldWrite {
    /// Whether the writer should emit the null representation instead.
    fn is_null(&self) -> bool {
        false
    }

    /// Append the value's bytes to `out`.
    fn write_field(&self, out: &mut Vec<u8>, format_hint: Option<&str>);
}

macro_rules! impl_write_display {
    ($($ty:ty),*) => {$(
        impl FieldWrite for $ty {
            fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
                // Writing to a Vec cannot fail.
                let _ = write!(out, "{self}");
            }
        }
    )*};
}

impl_write_display!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl FieldWrite for bool {
    fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
        out.extend_from_slice(if *self { b"true" } else { b"false" });
    }
}

impl FieldWrite for str {
    fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl FieldWrite for String {
    fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl FieldWrite for [u8] {
    fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
        out.extend_from_slice(self);
    }
}

impl FieldWrite for Vec<u8> {
    fn write_field(&self, out: &mut Vec<u8>, _hint: Option<&str>) {
        out.extend_from_slice(self);
    }
}

impl<T: FieldWrite> FieldWrite for Option<T> {
    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn write_field(&self, out: &mut Vec<u8>, hint: Option<&str>) {
        if let Some(value) = self {
            value.write_field(out, hint);
        }
    }
}

impl<T: FieldWrite + ?Sized> FieldWrite for &T {
    fn is_null(&self) -> bool {
        (**self).is_null()
    }

    fn write_field(&self, out: &mut Vec<u8>, hint: Option<&str>) {
        (**self).write_field(out, hint);
    }
}

#[cfg(feature = "chrono")]
impl FieldWrite for chrono::NaiveDate {
    fn write_field(&self, out: &mut Vec<u8>, hint: Option<&str>) {
        let format = hint.unwrap_or("%Y-%m-%d");
        let _ = write!(out, "{}", self.format(format));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: FieldParse>(bytes: &[u8]) -> Result<T, FieldError> {
        T::parse_field(bytes, None)
    }

    #[test]
    fn unsigned_basics() {
        assert_eq!(parse::<u64>(b"0"), Ok(0));
        assert_eq!(parse::<u64>(b"42"), Ok(42));
        assert_eq!(parse::<u64>(b"18446744073709551615"), Ok(u64::MAX));
        assert_eq!(parse::<u64>(b"18446744073709551616"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<u8>(b"255"), Ok(255));
        assert_eq!(parse::<u8>(b"256"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<u64>(b""), Err(FieldError::Empty));
        assert_eq!(parse::<u64>(b"12a"), Err(FieldError::InvalidDigit));
        assert_eq!(parse::<u64>(b"-1"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<u64>(b"+7"), Ok(7));
    }

    #[test]
    fn nineteen_and_twenty_digit_boundary() {
        // 19 digits takes the unchecked path, 20 the checked one.
        assert_eq!(parse::<u64>(b"9999999999999999999"), Ok(9_999_999_999_999_999_999));
        assert_eq!(parse::<u64>(b"09999999999999999999"), Ok(9_999_999_999_999_999_999));
        assert_eq!(parse::<u64>(b"99999999999999999999"), Err(FieldError::OutOfRange));
    }

    #[test]
    fn signed_basics() {
        assert_eq!(parse::<i64>(b"-1"), Ok(-1));
        assert_eq!(parse::<i64>(b"9223372036854775807"), Ok(i64::MAX));
        assert_eq!(parse::<i64>(b"-9223372036854775808"), Ok(i64::MIN));
        assert_eq!(parse::<i64>(b"-9223372036854775809"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<i64>(b"9223372036854775808"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<i8>(b"-128"), Ok(-128));
        assert_eq!(parse::<i8>(b"128"), Err(FieldError::OutOfRange));
        assert_eq!(parse::<i64>(b"-"), Err(FieldError::Empty));
    }

    #[test]
    fn float_parses_are_correctly_rounded() {
        assert_eq!(parse::<f64>(b"1.5"), Ok(1.5));
        assert_eq!(parse::<f64>(b"-0.25e2"), Ok(-25.0));
        // A value known to stress shortest-path parsing.
        assert_eq!(parse::<f64>(b"2.2250738585072011e-308"), Ok(2.2250738585072011e-308));
        assert!(parse::<f64>(b"abc").is_err());
    }

    #[test]
    fn bool_spellings() {
        assert_eq!(parse::<bool>(b"true"), Ok(true));
        assert_eq!(parse::<bool>(b"TRUE"), Ok(true));
        assert_eq!(parse::<bool>(b"1"), Ok(true));
        assert_eq!(parse::<bool>(b"false"), Ok(false));
        assert_eq!(parse::<bool>(b"0"), Ok(false));
        assert_eq!(parse::<bool>(b"yes"), Err(FieldError::Unrecognized));
    }

    #[test]
    fn string_requires_utf8() {
        assert_eq!(parse::<String>(b"ok"), Ok("ok".to_owned()));
        assert_eq!(parse::<String>(&[0xFF, 0xFE]), Err(FieldError::InvalidUtf8));
    }

    #[test]
    fn option_maps_empty_to_none() {
        assert_eq!(parse::<Option<i32>>(b""), Ok(None));
        assert_eq!(parse::<Option<i32>>(b"5"), Ok(Some(5)));
        assert!(parse::<Option<i32>>(b"x").is_err());
        assert_eq!(<Option<i32>>::null_field(), Some(None));
        assert_eq!(<i32>::null_field(), None);
    }

    #[test]
    fn write_primitives() {
        let mut out = Vec::new();
        42i64.write_field(&mut out, None);
        out.push(b'|');
        true.write_field(&mut out, None);
        out.push(b'|');
        1.5f64.write_field(&mut out, None);
        out.push(b'|');
        "text".write_field(&mut out, None);
        assert_eq!(out, b"42|true|1.5|text");
    }

    #[test]
    fn option_write_is_null_aware() {
        assert!(None::<i32>.is_null());
        assert!(!Some(3).is_null());
        let mut out = Vec::new();
        Some(3).write_field(&mut out, None);
        assert_eq!(out, b"3");
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn date_round_trip_with_hint() {
        let date = parse::<chrono::NaiveDate>(b"2024-02-29").unwrap();
        let mut out = Vec::new();
        date.write_field(&mut out, None);
        assert_eq!(out, b"2024-02-29");

        let parsed = chrono::NaiveDate::parse_field(b"29/02/2024", Some("%d/%m/%Y")).unwrap();
        assert_eq!(parsed, date);
    }
}
