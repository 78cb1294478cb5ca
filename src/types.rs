//! The SQL data types and their value-level operations.
//!
//! Everything that touches a typed value goes through this module:
//! - sizing and alignment of the in-record representation
//! - validation of textual input
//! - conversion between text and native bytes
//! - ordering
//!
//! The byte representations produced here are the ones the generated C
//! record structs use, so [`size_of`]/[`alignment_of`] and the layout
//! computed in [`crate::schema::RecordLayout`] must stay in lockstep with
//! the C type mapping in [`c_scalar_type`].

use std::cmp::Ordering;

use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::common::config::TEXT_SIZE;
use crate::common::{Error, Result};

/// The six column data types.
///
/// `Varchar` carries its declared length in the owning
/// [`crate::schema::Column`]; the type itself is just the discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit signed integer.
    Int,
    /// 64-bit IEEE 754 double.
    Float,
    /// Single byte, 0 or 1.
    Boolean,
    /// Seconds since the Unix epoch, stored as a 64-bit signed integer.
    Date,
    /// Inline fixed-length NUL-terminated buffer of `length + 1` bytes.
    Varchar,
    /// Inline fixed 4096-byte NUL-terminated buffer.
    Text,
}

impl DataType {
    /// The uppercase wire name used in `schema.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Varchar => "VARCHAR",
            DataType::Text => "TEXT",
        }
    }

    /// Parse an uppercase wire name back into a type.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "INT" => Ok(DataType::Int),
            "FLOAT" => Ok(DataType::Float),
            "BOOLEAN" => Ok(DataType::Boolean),
            "DATE" => Ok(DataType::Date),
            "VARCHAR" => Ok(DataType::Varchar),
            "TEXT" => Ok(DataType::Text),
            other => Err(Error::Parse(format!("unknown data type: {other}"))),
        }
    }

    /// Whether values of this type live in a NUL-terminated char buffer.
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar | DataType::Text)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size in bytes of one value inside a record.
///
/// `length` is only consulted for `Varchar`, where the buffer holds the
/// declared length plus the terminating NUL.
pub fn size_of(data_type: DataType, length: usize) -> usize {
    match data_type {
        DataType::Int => 4,
        DataType::Float => 8,
        DataType::Boolean => 1,
        DataType::Date => 8,
        DataType::Varchar => length + 1,
        DataType::Text => TEXT_SIZE,
    }
}

/// Natural alignment of one value inside a record.
///
/// Matches what the C compiler uses for the generated struct fields:
/// scalars naturally aligned, char buffers byte-aligned.
pub fn alignment_of(data_type: DataType) -> usize {
    match data_type {
        DataType::Int => 4,
        DataType::Float => 8,
        DataType::Boolean => 1,
        DataType::Date => 8,
        DataType::Varchar | DataType::Text => 1,
    }
}

/// The C scalar type a non-string value is declared as in generated code.
///
/// String types are declared as `char` arrays dimensioned by [`size_of`].
pub fn c_scalar_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Int => "int",
        DataType::Float => "double",
        DataType::Boolean => "unsigned char",
        DataType::Date => "long long",
        DataType::Varchar | DataType::Text => "char",
    }
}

/// Check a textual value against a type without converting it.
///
/// The rules are deliberately lexical: a DATE accepts any day 1..=31, and
/// [`parse`] later rejects dates the calendar does not contain.
pub fn validate(text: &str, data_type: DataType, length: usize) -> bool {
    match data_type {
        DataType::Int => {
            let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        DataType::Float => {
            let body = text.strip_prefix(['+', '-']).unwrap_or(text);
            let mut dots = 0;
            let mut digits = 0;
            for b in body.bytes() {
                match b {
                    b'.' => dots += 1,
                    b'0'..=b'9' => digits += 1,
                    _ => return false,
                }
            }
            digits > 0 && dots <= 1
        }
        DataType::Boolean => {
            matches!(text.to_ascii_lowercase().as_str(), "true" | "false" | "1" | "0")
        }
        DataType::Date => {
            let b = text.as_bytes();
            if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
                return false;
            }
            let digits_ok = b[..4]
                .iter()
                .chain(&b[5..7])
                .chain(&b[8..10])
                .all(|c| c.is_ascii_digit());
            if !digits_ok {
                return false;
            }
            let month: u32 = text[5..7].parse().unwrap_or(0);
            let day: u32 = text[8..10].parse().unwrap_or(0);
            (1..=12).contains(&month) && (1..=31).contains(&day)
        }
        DataType::Varchar => text.len() <= length,
        DataType::Text => true,
    }
}

/// Convert a textual value into its native record bytes.
///
/// The returned buffer is exactly `size_of(data_type, length)` bytes;
/// string buffers are zero-padded past the NUL.
pub fn parse(text: &str, data_type: DataType, length: usize) -> Result<Vec<u8>> {
    if !validate(text, data_type, length) {
        return Err(Error::Validation(format!(
            "value '{text}' is not a valid {data_type}"
        )));
    }
    match data_type {
        DataType::Int => {
            let v: i32 = text
                .parse()
                .map_err(|_| Error::Validation(format!("value '{text}' overflows INT")))?;
            Ok(v.to_ne_bytes().to_vec())
        }
        DataType::Float => {
            let v: f64 = text
                .parse()
                .map_err(|_| Error::Validation(format!("value '{text}' is not a valid FLOAT")))?;
            Ok(v.to_ne_bytes().to_vec())
        }
        DataType::Boolean => {
            let v = matches!(text.to_ascii_lowercase().as_str(), "true" | "1");
            Ok(vec![v as u8])
        }
        DataType::Date => parse_date(text).map(|epoch| epoch.to_ne_bytes().to_vec()),
        DataType::Varchar | DataType::Text => {
            let size = size_of(data_type, length);
            let mut buf = vec![0u8; size];
            // TEXT silently truncates to the buffer; VARCHAR was length-checked.
            let n = text.len().min(size - 1);
            buf[..n].copy_from_slice(&text.as_bytes()[..n]);
            Ok(buf)
        }
    }
}

/// Render native record bytes back into their textual form.
///
/// Inverse of [`parse`] up to canonical renormalization: booleans come
/// back lowercase and floats in the shortest round-trip form.
pub fn format(bytes: &[u8], data_type: DataType) -> Result<String> {
    match data_type {
        DataType::Int => Ok(read_i32(bytes)?.to_string()),
        DataType::Float => Ok(read_f64(bytes)?.to_string()),
        DataType::Boolean => {
            let b = bytes
                .first()
                .ok_or_else(|| Error::Internal("empty BOOLEAN value".into()))?;
            Ok(if *b != 0 { "true" } else { "false" }.to_string())
        }
        DataType::Date => format_date(read_i64(bytes)?),
        DataType::Varchar | DataType::Text => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
    }
}

/// Order two native values of the same type.
///
/// Strings compare byte-lexicographically up to the NUL; booleans as
/// 0 < 1; dates by epoch value. NaN floats compare as equal to NaN and
/// greater than everything else so the ordering stays total.
pub fn compare(a: &[u8], b: &[u8], data_type: DataType) -> Result<Ordering> {
    match data_type {
        DataType::Int => Ok(read_i32(a)?.cmp(&read_i32(b)?)),
        DataType::Float => {
            let (x, y) = (read_f64(a)?, read_f64(b)?);
            Ok(x.partial_cmp(&y).unwrap_or_else(|| {
                // total order fallback for NaN
                match (x.is_nan(), y.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => Ordering::Equal,
                }
            }))
        }
        DataType::Boolean => Ok(a
            .first()
            .copied()
            .unwrap_or(0)
            .cmp(&b.first().copied().unwrap_or(0))),
        DataType::Date => Ok(read_i64(a)?.cmp(&read_i64(b)?)),
        DataType::Varchar | DataType::Text => {
            let trim = |s: &[u8]| {
                let end = s.iter().position(|&c| c == 0).unwrap_or(s.len());
                s[..end].to_vec()
            };
            Ok(trim(a).cmp(&trim(b)))
        }
    }
}

fn read_i32(bytes: &[u8]) -> Result<i32> {
    if bytes.len() < 4 {
        return Err(Error::Internal(format!(
            "INT value needs 4 bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    Ok(i32::from_ne_bytes(buf))
}

fn read_i64(bytes: &[u8]) -> Result<i64> {
    if bytes.len() < 8 {
        return Err(Error::Internal(format!(
            "DATE value needs 8 bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Ok(i64::from_ne_bytes(buf))
}

fn read_f64(bytes: &[u8]) -> Result<f64> {
    if bytes.len() < 8 {
        return Err(Error::Internal(format!(
            "FLOAT value needs 8 bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Ok(f64::from_ne_bytes(buf))
}

/// `YYYY-MM-DD` to local-midnight epoch seconds.
///
/// When a DST transition removes local midnight the day is anchored at
/// local noon instead, which no transition touches; formatting recovers
/// the same calendar date either way.
fn parse_date(text: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("'{text}' is not a calendar date")))?;
    let at = |h| {
        date.and_hms_opt(h, 0, 0)
            .and_then(|ndt| Local.from_local_datetime(&ndt).earliest())
    };
    at(0)
        .or_else(|| at(12))
        .map(|dt| dt.timestamp())
        .ok_or_else(|| Error::Validation(format!("'{text}' has no local representation")))
}

fn format_date(epoch: i64) -> Result<String> {
    let dt = Local
        .timestamp_opt(epoch, 0)
        .earliest()
        .ok_or_else(|| Error::Internal(format!("epoch {epoch} out of range")))?;
    Ok(dt.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_and_alignment() {
        assert_eq!(size_of(DataType::Int, 0), 4);
        assert_eq!(size_of(DataType::Float, 0), 8);
        assert_eq!(size_of(DataType::Boolean, 0), 1);
        assert_eq!(size_of(DataType::Date, 0), 8);
        assert_eq!(size_of(DataType::Varchar, 36), 37);
        assert_eq!(size_of(DataType::Text, 0), 4096);

        assert_eq!(alignment_of(DataType::Float), 8);
        assert_eq!(alignment_of(DataType::Varchar), 1);
    }

    #[test]
    fn test_validate_int() {
        assert!(validate("42", DataType::Int, 0));
        assert!(validate("-7", DataType::Int, 0));
        assert!(validate("+0", DataType::Int, 0));
        assert!(!validate("", DataType::Int, 0));
        assert!(!validate("-", DataType::Int, 0));
        assert!(!validate("1.5", DataType::Int, 0));
        assert!(!validate("12a", DataType::Int, 0));
    }

    #[test]
    fn test_validate_float() {
        assert!(validate("3.25", DataType::Float, 0));
        assert!(validate("-0.5", DataType::Float, 0));
        assert!(validate("10", DataType::Float, 0));
        assert!(validate("10.", DataType::Float, 0));
        assert!(!validate("1.2.3", DataType::Float, 0));
        assert!(!validate(".", DataType::Float, 0));
        assert!(!validate("1e3", DataType::Float, 0));
    }

    #[test]
    fn test_validate_boolean() {
        for ok in ["true", "FALSE", "True", "1", "0"] {
            assert!(validate(ok, DataType::Boolean, 0), "{ok}");
        }
        assert!(!validate("yes", DataType::Boolean, 0));
        assert!(!validate("2", DataType::Boolean, 0));
    }

    #[test]
    fn test_validate_date() {
        assert!(validate("2024-01-31", DataType::Date, 0));
        assert!(validate("1999-12-01", DataType::Date, 0));
        assert!(!validate("2024-13-01", DataType::Date, 0));
        assert!(!validate("2024-00-10", DataType::Date, 0));
        assert!(!validate("2024-01-32", DataType::Date, 0));
        assert!(!validate("2024-1-05", DataType::Date, 0));
        assert!(!validate("24-01-05", DataType::Date, 0));
    }

    #[test]
    fn test_validate_varchar_length() {
        assert!(validate("abcde", DataType::Varchar, 5));
        assert!(!validate("abcdef", DataType::Varchar, 5));
        assert!(validate("", DataType::Varchar, 0));
    }

    #[test]
    fn test_parse_format_int_roundtrip() {
        let bytes = parse("-123", DataType::Int, 0).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(format(&bytes, DataType::Int).unwrap(), "-123");
    }

    #[test]
    fn test_parse_format_boolean_canonical() {
        let bytes = parse("TRUE", DataType::Boolean, 0).unwrap();
        assert_eq!(format(&bytes, DataType::Boolean).unwrap(), "true");
        let bytes = parse("0", DataType::Boolean, 0).unwrap();
        assert_eq!(format(&bytes, DataType::Boolean).unwrap(), "false");
    }

    #[test]
    fn test_parse_format_date_roundtrip() {
        for d in ["1970-01-01", "2024-02-29", "1969-07-20"] {
            let bytes = parse(d, DataType::Date, 0).unwrap();
            assert_eq!(format(&bytes, DataType::Date).unwrap(), d, "{d}");
        }
    }

    #[test]
    fn test_parse_date_rejects_impossible_day() {
        // lexically valid, not on the calendar
        assert!(validate("2023-02-31", DataType::Date, 0));
        assert!(parse("2023-02-31", DataType::Date, 0).is_err());
    }

    #[test]
    fn test_parse_varchar_pads_with_nul() {
        let bytes = parse("hi", DataType::Varchar, 5).unwrap();
        assert_eq!(bytes, b"hi\0\0\0\0");
        assert_eq!(format(&bytes, DataType::Varchar).unwrap(), "hi");
    }

    #[test]
    fn test_compare() {
        let ordering = |a: &str, b: &str, ty, len| {
            compare(&parse(a, ty, len).unwrap(), &parse(b, ty, len).unwrap(), ty).unwrap()
        };
        assert_eq!(ordering("3", "7", DataType::Int, 0), Ordering::Less);
        assert_eq!(ordering("-1.5", "-1.5", DataType::Float, 0), Ordering::Equal);
        assert_eq!(ordering("true", "0", DataType::Boolean, 0), Ordering::Greater);
        assert_eq!(
            ordering("2024-01-02", "2024-01-01", DataType::Date, 0),
            Ordering::Greater
        );
        assert_eq!(ordering("abc", "abd", DataType::Varchar, 10), Ordering::Less);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn int_text_roundtrips(v in any::<i32>()) {
                let text = v.to_string();
                let bytes = parse(&text, DataType::Int, 0).unwrap();
                prop_assert_eq!(format(&bytes, DataType::Int).unwrap(), text);
            }

            #[test]
            fn varchar_roundtrips(s in "[a-zA-Z0-9 ]{0,40}") {
                let bytes = parse(&s, DataType::Varchar, 40).unwrap();
                prop_assert_eq!(format(&bytes, DataType::Varchar).unwrap(), s);
            }

            #[test]
            fn int_compare_matches_native(a in any::<i32>(), b in any::<i32>()) {
                let ab = parse(&a.to_string(), DataType::Int, 0).unwrap();
                let bb = parse(&b.to_string(), DataType::Int, 0).unwrap();
                prop_assert_eq!(compare(&ab, &bb, DataType::Int).unwrap(), a.cmp(&b));
            }
        }
    }
}
