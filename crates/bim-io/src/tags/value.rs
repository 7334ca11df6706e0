//! Tag value type.
//!
//! Most tags arrive as text scraped from a header and stay strings; geometry
//! tags synthesized by the handle are numeric. The `as_*` accessors coerce
//! between the two so callers need not care which one a plugin produced.

use std::fmt;

/// Typed metadata value.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum TagValue {
    /// UTF-8 text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Double precision float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Opaque bytes (embedded profiles, raw blocks).
    Binary(Vec<u8>),
}

impl TagValue {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::Binary(_) => "binary",
        }
    }

    /// String slice of a [`TagValue::Str`].
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Signed integer, parsing strings and converting in-range numbers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Double(_) | Self::Binary(_) => None,
        }
    }

    /// Unsigned integer, parsing strings and converting in-range numbers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Bool(b) => Some(u64::from(*b)),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Double(_) | Self::Binary(_) => None,
        }
    }

    /// Float, widening integers and parsing strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) | Self::Binary(_) => None,
        }
    }

    /// Boolean; strings accept `true`/`false`/`yes`/`no`/`1`/`0`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(v) => Some(*v != 0),
            Self::UInt(v) => Some(*v != 0),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Self::Double(_) | Self::Binary(_) => None,
        }
    }

    /// Raw bytes of a [`TagValue::Binary`].
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        Self::UInt(v.into())
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}
