//! Typed tuple fields.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;

/// A single typed field of a tuple.
///
/// Fields are totally ordered so they can be used as index keys. Values
/// of different types order by type first:
/// `Null < Bool < Integer < Text < Bytes < Array`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Nested array of fields.
    Array(Vec<Field>),
}

impl Field {
    /// Creates a byte-string field.
    #[must_use]
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a short name of the field type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "nil",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Text(_) => "string",
            Self::Bytes(_) => "varbinary",
            Self::Array(_) => "array",
        }
    }
}

impl From<i64> for Field {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Field {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Field {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<bool> for Field {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<Field>> for Field {
    fn from(items: Vec<Field>) -> Self {
        Self::Array(items)
    }
}

/// Renders fields the way an admin console prints them:
/// `1`, `'text'`, `[1, 'a']`.
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Self::Bytes(b) => {
                write!(f, "x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "'")
            }
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_by_type_then_value() {
        assert!(Field::Null < Field::Bool(false));
        assert!(Field::Bool(true) < Field::Integer(-5));
        assert!(Field::Integer(-5) < Field::Integer(3));
        assert!(Field::Integer(i64::MAX) < Field::from("a"));
        assert!(Field::from("a") < Field::from("b"));
        assert!(Field::from("zzz") < Field::bytes(vec![0]));
    }

    #[test]
    fn display_matches_console_style() {
        let field = Field::Array(vec![Field::Integer(1), Field::from("it's")]);
        assert_eq!(field.to_string(), "[1, 'it\\'s']");
        assert_eq!(Field::bytes(vec![0xca, 0xfe]).to_string(), "x'cafe'");
    }

    #[test]
    fn serializes_as_plain_json() {
        let field = Field::Array(vec![Field::Integer(2), Field::from("second"), Field::Null]);
        assert_eq!(
            serde_json::to_string(&field).unwrap(),
            r#"[2,"second",null]"#
        );
    }
}
