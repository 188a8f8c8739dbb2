//! Attribute literals in the store's value system.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Declared value type of a store attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Boolean,
    Long,
    Double,
    DateTime,
}

impl ValueType {
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueType::String => "STRING",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Long => "LONG",
            ValueType::Double => "DOUBLE",
            ValueType::DateTime => "DATETIME",
        }
    }
}

/// A typed attribute value. Datetimes are UTC with millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Literal {
    String(String),
    Bool(bool),
    Long(i64),
    Double(f64),
    DateTime(NaiveDateTime),
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::String(_) => ValueType::String,
            Literal::Bool(_) => ValueType::Boolean,
            Literal::Long(_) => ValueType::Long,
            Literal::Double(_) => ValueType::Double,
            Literal::DateTime(_) => ValueType::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    /// Hashable identity of the literal: value type plus rendered form.
    /// Two literals with the same key are the same store attribute value.
    pub fn key(&self) -> String {
        format!("{}:{}", self.value_type().type_name(), self)
    }
}

impl From<&str> for Literal { fn from(v: &str) -> Self { Literal::String(v.to_owned()) } }
impl From<String> for Literal { fn from(v: String) -> Self { Literal::String(v) } }
impl From<bool> for Literal { fn from(v: bool) -> Self { Literal::Bool(v) } }
impl From<i64> for Literal { fn from(v: i64) -> Self { Literal::Long(v) } }
impl From<f64> for Literal { fn from(v: f64) -> Self { Literal::Double(v) } }

/// Quote a string for the statement grammar: backslashes doubled, quotes escaped.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => f.write_str(&quote(s)),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Long(i) => write!(f, "{i}"),
            Literal::Double(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Literal::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_literal() {
        assert_eq!(Literal::from("hello").to_string(), "\"hello\"");
        assert_eq!(Literal::from(42i64).to_string(), "42");
        assert_eq!(Literal::from(3.25).to_string(), "3.25");
        assert_eq!(Literal::from(2.0).to_string(), "2.0");
        assert_eq!(Literal::from(true).to_string(), "true");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(Literal::from(r#"say "hi""#).to_string(), r#""say \"hi\"""#);
        assert_eq!(Literal::from(r"C:\Windows").to_string(), r#""C:\\Windows""#);
    }

    #[test]
    fn test_datetime_millis() {
        let dt = NaiveDate::from_ymd_opt(2017, 1, 20)
            .unwrap()
            .and_hms_milli_opt(8, 30, 5, 7)
            .unwrap();
        assert_eq!(Literal::DateTime(dt).to_string(), "2017-01-20T08:30:05.007");
    }

    #[test]
    fn test_key_distinguishes_types() {
        assert_ne!(Literal::from("1").key(), Literal::from(1i64).key());
        assert_eq!(Literal::from("a").key(), Literal::from("a".to_string()).key());
    }
}
