//! Typed values for source-owned custom attributes.
//!
//! Bulk feeds carry arbitrary extra columns (payment terms, ERP codes,
//! nested metadata). They are kept as a closed set of value variants
//! instead of an untyped blob so merging and serialization stay well defined.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Custom attribute bag keyed by attribute name.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A single custom attribute value.
///
/// # Examples
///
/// ```
/// use vendor_identity::AttributeValue;
///
/// let terms = AttributeValue::from("NET30");
/// let limit = AttributeValue::from(5000i64);
///
/// assert!(terms.is_string());
/// assert_eq!(limit.as_int(), Some(5000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Explicit absence of a value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    String(String),
    /// Ordered list.
    List(Vec<AttributeValue>),
    /// Nested map.
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Infers a scalar value from raw feed text.
    ///
    /// `true`/`false` become booleans, integral text becomes `Int`, other
    /// numeric text becomes `Float`, everything else stays a trimmed string.
    /// Empty text is `Null`.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Null;
        }
        if raw.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        // Leading zeros carry meaning in account and ERP codes.
        let keeps_leading_zero = raw.len() > 1 && raw.starts_with('0') && !raw.starts_with("0.");
        if !keeps_leading_zero {
            if let Ok(v) = raw.parse::<i64>() {
                return Self::Int(v);
            }
            if let Ok(v) = raw.parse::<f64>() {
                if v.is_finite() {
                    return Self::Float(v);
                }
            }
        }
        Self::String(raw.to_string())
    }

    /// True for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for `String`.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// The boolean value, if any.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer value, if any.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The numeric value as a float; integers widen.
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The string value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl Default for AttributeValue {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::List(items) => write!(f, "list[{}]", items.len()),
            Self::Map(entries) => write!(f, "map[{}]", entries.len()),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(v: Vec<AttributeValue>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(v: BTreeMap<String, AttributeValue>) -> Self {
        Self::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(AttributeValue::infer("true"), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::infer(" 42 "), AttributeValue::Int(42));
        assert_eq!(AttributeValue::infer("2.5"), AttributeValue::Float(2.5));
        assert_eq!(AttributeValue::infer("NET30"), AttributeValue::from("NET30"));
        assert!(AttributeValue::infer("   ").is_null());
    }

    #[test]
    fn test_infer_keeps_leading_zero_codes() {
        assert_eq!(AttributeValue::infer("00417"), AttributeValue::from("00417"));
        assert_eq!(AttributeValue::infer("0.5"), AttributeValue::Float(0.5));
        assert_eq!(AttributeValue::infer("0"), AttributeValue::Int(0));
    }

    #[test]
    fn test_infer_rejects_non_finite_floats() {
        assert_eq!(AttributeValue::infer("NaN"), AttributeValue::from("NaN"));
        assert_eq!(AttributeValue::infer("inf"), AttributeValue::from("inf"));
    }

    #[test]
    fn test_nested_serialization() {
        let mut inner = BTreeMap::new();
        inner.insert("code".to_string(), AttributeValue::from("A1"));
        let value = AttributeValue::List(vec![AttributeValue::Map(inner), AttributeValue::Null]);

        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn test_type_mismatch() {
        let val = AttributeValue::Bool(true);
        assert!(val.as_int().is_none());
        assert!(val.as_str().is_none());
        assert_eq!(val.type_name(), "bool");
    }
}
