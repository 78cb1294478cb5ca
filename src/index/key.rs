//! Index keys - typed values extracted from one record column.
//!
//! A key carries its own comparison, hashing and C-literal rendering so
//! the in-memory indices and their serialized C form agree byte for
//! byte: comparisons mirror the type system's ordering, and the djb2
//! hash consumes exactly the bytes the generated C hashes.

use std::cmp::Ordering;

use crate::common::config::TEXT_SIZE;
use crate::common::{Error, Result};
use crate::schema::{Column, RecordView};
use crate::types::{self, DataType};

/// The key type of an index, derived from the indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Int,
    Float,
    Bool,
    Date,
    /// NUL-terminated string of at most `length` content bytes.
    Str { length: usize },
}

impl KeyType {
    /// The key type for an indexed column.
    pub fn of(column: &Column) -> Self {
        match column.data_type {
            DataType::Int => KeyType::Int,
            DataType::Float => KeyType::Float,
            DataType::Boolean => KeyType::Bool,
            DataType::Date => KeyType::Date,
            DataType::Varchar => KeyType::Str {
                length: column.length,
            },
            DataType::Text => KeyType::Str {
                length: TEXT_SIZE - 1,
            },
        }
    }

    /// The matching value-level data type.
    pub fn data_type(&self) -> DataType {
        match self {
            KeyType::Int => DataType::Int,
            KeyType::Float => DataType::Float,
            KeyType::Bool => DataType::Boolean,
            KeyType::Date => DataType::Date,
            KeyType::Str { .. } => DataType::Varchar,
        }
    }

    /// C declaration of one key slot named `name` (arrays for strings).
    pub fn c_field(&self, name: &str) -> String {
        match self {
            KeyType::Int => format!("int {name}"),
            KeyType::Float => format!("double {name}"),
            KeyType::Bool => format!("unsigned char {name}"),
            KeyType::Date => format!("long long {name}"),
            KeyType::Str { length } => format!("char {name}[{}]", length + 1),
        }
    }

    /// The C scalar type of one key slot (`char` for string keys,
    /// which add their own array dimension).
    pub fn c_scalar_type(&self) -> &'static str {
        types::c_scalar_type(self.data_type())
    }

    /// The C pointer type a lookup function casts its key argument to.
    pub fn c_key_pointer(&self) -> &'static str {
        match self {
            KeyType::Int => "const int *",
            KeyType::Float => "const double *",
            KeyType::Bool => "const unsigned char *",
            KeyType::Date => "const long long *",
            KeyType::Str { .. } => "const char *",
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, KeyType::Str { .. })
    }
}

/// One key value.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Int(i32),
    Float(f64),
    Bool(bool),
    Date(i64),
    Str(String),
}

impl IndexKey {
    /// Extract the key for `column` out of a record.
    pub fn from_record(record: &RecordView<'_>, column: &Column) -> Result<Self> {
        Ok(match KeyType::of(column) {
            KeyType::Int => IndexKey::Int(record.get_int(&column.name)?),
            KeyType::Float => IndexKey::Float(record.get_float(&column.name)?),
            KeyType::Bool => IndexKey::Bool(record.get_bool(&column.name)?),
            KeyType::Date => IndexKey::Date(record.get_date(&column.name)?),
            KeyType::Str { .. } => IndexKey::Str(record.get_str(&column.name)?.to_string()),
        })
    }

    /// Parse a textual value into a key of the given type.
    pub fn from_text(text: &str, key_type: KeyType) -> Result<Self> {
        let length = match key_type {
            KeyType::Str { length } => length,
            _ => 0,
        };
        let data_type = key_type.data_type();
        let bytes = types::parse(text, data_type, length)?;
        Ok(match key_type {
            KeyType::Int => IndexKey::Int(i32::from_ne_bytes(fixed4(&bytes)?)),
            KeyType::Float => IndexKey::Float(f64::from_ne_bytes(fixed8(&bytes)?)),
            KeyType::Bool => IndexKey::Bool(bytes[0] != 0),
            KeyType::Date => IndexKey::Date(i64::from_ne_bytes(fixed8(&bytes)?)),
            KeyType::Str { .. } => IndexKey::Str(text.to_string()),
        })
    }

    /// The key type this value belongs to (string lengths unknown here).
    pub fn matches(&self, key_type: KeyType) -> bool {
        matches!(
            (self, key_type),
            (IndexKey::Int(_), KeyType::Int)
                | (IndexKey::Float(_), KeyType::Float)
                | (IndexKey::Bool(_), KeyType::Bool)
                | (IndexKey::Date(_), KeyType::Date)
                | (IndexKey::Str(_), KeyType::Str { .. })
        )
    }

    /// The bytes the djb2 hash consumes: native scalar representation,
    /// string content without the NUL.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            IndexKey::Int(v) => v.to_ne_bytes().to_vec(),
            IndexKey::Float(v) => v.to_ne_bytes().to_vec(),
            IndexKey::Bool(v) => vec![*v as u8],
            IndexKey::Date(v) => v.to_ne_bytes().to_vec(),
            IndexKey::Str(s) => s.as_bytes().to_vec(),
        }
    }

    /// The bytes passed across the FFI boundary to a compiled index:
    /// scalars as-is, strings NUL-terminated.
    pub fn ffi_bytes(&self) -> Vec<u8> {
        let mut bytes = self.canonical_bytes();
        if matches!(self, IndexKey::Str(_)) {
            bytes.push(0);
        }
        bytes
    }

    /// djb2 over the canonical bytes, as the generated C computes it.
    pub fn djb2(&self) -> u64 {
        let mut hash: u64 = 5381;
        for b in self.canonical_bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(b as u64);
        }
        hash
    }

    /// Total ordering consistent with the type system's `compare`.
    pub fn compare(&self, other: &IndexKey) -> Ordering {
        match (self, other) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Float(a), IndexKey::Float(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    _ => Ordering::Less,
                })
            }
            (IndexKey::Bool(a), IndexKey::Bool(b)) => a.cmp(b),
            (IndexKey::Date(a), IndexKey::Date(b)) => a.cmp(b),
            (IndexKey::Str(a), IndexKey::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            // keys of one index always share a type; anything else is
            // ordered by discriminant to stay total
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }

    /// Render the key as a C initializer literal.
    pub fn c_literal(&self) -> String {
        match self {
            IndexKey::Int(v) => v.to_string(),
            IndexKey::Float(v) => {
                if v.is_finite() {
                    format!("{v:?}")
                } else {
                    // non-finite keys never validate; keep the source compilable
                    "0.0".to_string()
                }
            }
            IndexKey::Bool(v) => (*v as u8).to_string(),
            IndexKey::Date(v) => v.to_string(),
            IndexKey::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
                out
            }
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            IndexKey::Int(_) => 0,
            IndexKey::Float(_) => 1,
            IndexKey::Bool(_) => 2,
            IndexKey::Date(_) => 3,
            IndexKey::Str(_) => 4,
        }
    }
}

fn fixed4(bytes: &[u8]) -> Result<[u8; 4]> {
    if bytes.len() < 4 {
        return Err(Error::Internal("short key value".into()));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    Ok(buf)
}

fn fixed8(bytes: &[u8]) -> Result<[u8; 8]> {
    if bytes.len() < 8 {
        return Err(Error::Internal("short key value".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_of_column() {
        let col = Column::new("name", DataType::Varchar).with_length(20);
        assert_eq!(KeyType::of(&col), KeyType::Str { length: 20 });
        assert_eq!(
            KeyType::of(&Column::new("n", DataType::Int)),
            KeyType::Int
        );
    }

    #[test]
    fn test_djb2_known_values() {
        // djb2("") = 5381, djb2("a") = 5381*33 + 97
        assert_eq!(IndexKey::Str(String::new()).djb2(), 5381);
        assert_eq!(IndexKey::Str("a".into()).djb2(), 5381 * 33 + 97);
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            IndexKey::Int(3).compare(&IndexKey::Int(9)),
            Ordering::Less
        );
        assert_eq!(
            IndexKey::Str("abc".into()).compare(&IndexKey::Str("abd".into())),
            Ordering::Less
        );
        assert_eq!(
            IndexKey::Bool(true).compare(&IndexKey::Bool(false)),
            Ordering::Greater
        );
        assert_eq!(
            IndexKey::Float(1.5).compare(&IndexKey::Float(1.5)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_from_text() {
        assert_eq!(
            IndexKey::from_text("42", KeyType::Int).unwrap(),
            IndexKey::Int(42)
        );
        assert_eq!(
            IndexKey::from_text("true", KeyType::Bool).unwrap(),
            IndexKey::Bool(true)
        );
        assert!(IndexKey::from_text("xyz", KeyType::Int).is_err());
    }

    #[test]
    fn test_c_literals() {
        assert_eq!(IndexKey::Int(-7).c_literal(), "-7");
        assert_eq!(IndexKey::Float(2.5).c_literal(), "2.5");
        assert_eq!(IndexKey::Bool(true).c_literal(), "1");
        assert_eq!(IndexKey::Str("a\"b".into()).c_literal(), "\"a\\\"b\"");
    }

    #[test]
    fn test_ffi_bytes_nul_terminates_strings() {
        assert_eq!(IndexKey::Str("ab".into()).ffi_bytes(), b"ab\0");
        assert_eq!(IndexKey::Int(1).ffi_bytes().len(), 4);
    }
}
