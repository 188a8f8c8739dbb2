//! # Property Codec
//!
//! Field classification and scalar value translation in both directions.
//! Everything here is a pure function of its inputs and the mapping table.

use chrono::{DateTime, NaiveDateTime, Timelike};
use serde_json::{Number, Value};

use crate::mapping::{FieldMapping, MappingTable, PropertySpec, RelationKind};
use crate::query::{Literal, ValueType};
use crate::{Error, Result};

/// Rendering of timestamps handed back to callers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// How a field of a given kind is stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldClass<'t> {
    Scalar(&'t PropertySpec),
    Relation(&'t RelationKind),
}

/// Look `field` up in the property table of `kind`. Fields without a scalar
/// translation are relation-backed and must be categorized.
pub fn classify<'t>(table: &'t MappingTable, kind: &str, field: &str) -> Result<FieldClass<'t>> {
    let missing = || Error::MissingMappingEntry { kind: kind.to_string(), field: field.to_string() };
    match table.field(kind, field) {
        Some(FieldMapping::Attribute(spec)) => Ok(FieldClass::Scalar(spec)),
        Some(FieldMapping::Relation) => table.relation(field).map(FieldClass::Relation).ok_or_else(missing),
        None => Err(missing()),
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Convert a JSON scalar into a literal of the declared type.
pub fn encode_scalar(value: &Value, value_type: ValueType) -> Result<Literal> {
    let literal = match (value_type, value) {
        (ValueType::String, Value::String(s)) => Some(Literal::String(s.clone())),
        (ValueType::Boolean, Value::Bool(b)) => Some(Literal::Bool(*b)),
        (ValueType::Long, Value::Number(n)) => n.as_i64().map(Literal::Long),
        (ValueType::Double, Value::Number(n)) => n.as_f64().map(Literal::Double),
        (ValueType::DateTime, Value::String(s)) => Some(Literal::DateTime(parse_timestamp(s)?)),
        _ => None,
    };
    literal.ok_or_else(|| unsupported(value_type.type_name(), value))
}

/// Convert a JSON scalar whose type is not declared (key-value entries).
pub fn encode_untyped(value: &Value) -> Result<Literal> {
    match value {
        Value::String(s) => Ok(Literal::String(s.clone())),
        Value::Bool(b) => Ok(Literal::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Literal::Long(i)),
            None => n.as_f64().map(Literal::Double).ok_or_else(|| unsupported("scalar", value)),
        },
        _ => Err(unsupported("scalar", value)),
    }
}

/// The value equals the declared default and is not written.
pub fn is_omitted(spec: &PropertySpec, literal: &Literal) -> bool {
    spec.omit_default.as_ref() == Some(literal)
}

/// RFC 3339 (or zone-less, read as UTC) timestamp, truncated to milliseconds.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| Error::UnsupportedValueType {
            expected: ValueType::DateTime.type_name().to_string(),
            got: format!("string '{s}'"),
        })?;
    let millis = parsed.nanosecond() / 1_000_000 * 1_000_000;
    Ok(parsed.with_nanosecond(millis).unwrap_or(parsed))
}

fn unsupported(expected: &str, value: &Value) -> Error {
    Error::UnsupportedValueType { expected: expected.to_string(), got: json_type_name(value).to_string() }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Convert a stored literal back into JSON, honouring the declared type.
pub fn decode_scalar(literal: &Literal, value_type: ValueType) -> Value {
    match (value_type, literal) {
        (ValueType::Double, Literal::Long(i)) => Value::Number((*i).into()),
        (ValueType::Double, Literal::Double(v)) => double(*v),
        _ => decode_untyped(literal),
    }
}

pub fn decode_untyped(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Long(i) => Value::Number((*i).into()),
        Literal::Double(v) => float(*v),
        Literal::DateTime(dt) => Value::String(dt.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Integral doubles render as JSON integers, so `48` reads back as `48`.
fn double(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < MAX_EXACT_INTEGER {
        Value::Number((v as i64).into())
    } else {
        float(v)
    }
}

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImportConfiguration, Registry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_classify() {
        let table = Registry::global().mappings(&ImportConfiguration::default()).unwrap();
        assert!(matches!(classify(&table, "indicator", "pattern"), Ok(FieldClass::Scalar(_))));
        assert!(matches!(
            classify(&table, "indicator", "created_by_ref"),
            Ok(FieldClass::Relation(RelationKind::EmbeddedReference(_)))
        ));
        assert!(matches!(
            classify(&table, "indicator", "no_such_field"),
            Err(Error::MissingMappingEntry { .. })
        ));
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode_scalar(&json!("x"), ValueType::String).unwrap(), Literal::from("x"));
        assert_eq!(encode_scalar(&json!(true), ValueType::Boolean).unwrap(), Literal::Bool(true));
        assert_eq!(encode_scalar(&json!(7), ValueType::Long).unwrap(), Literal::Long(7));
        assert_eq!(encode_scalar(&json!(7), ValueType::Double).unwrap(), Literal::Double(7.0));
    }

    #[test]
    fn test_type_mismatch() {
        let err = encode_scalar(&json!({"a": 1}), ValueType::String).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueType { ref got, .. } if got == "object"));
        assert!(encode_scalar(&json!(1.5), ValueType::Long).is_err());
        assert!(encode_scalar(&json!("yesterday"), ValueType::DateTime).is_err());
        assert!(encode_untyped(&json!(null)).is_err());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let lit = encode_scalar(&json!("2016-05-12T08:17:27.000Z"), ValueType::DateTime).unwrap();
        assert_eq!(lit.to_string(), "2016-05-12T08:17:27.000");
        assert_eq!(decode_scalar(&lit, ValueType::DateTime), json!("2016-05-12T08:17:27.000Z"));
    }

    #[test]
    fn test_timestamp_truncates_to_millis() {
        let lit = encode_scalar(&json!("2016-05-12T08:17:27.123456Z"), ValueType::DateTime).unwrap();
        assert_eq!(decode_untyped(&lit), json!("2016-05-12T08:17:27.123Z"));
    }

    #[test]
    fn test_timestamp_offset_normalized() {
        let lit = encode_scalar(&json!("2016-05-12T10:17:27.000+02:00"), ValueType::DateTime).unwrap();
        assert_eq!(decode_untyped(&lit), json!("2016-05-12T08:17:27.000Z"));
    }

    #[test]
    fn test_untyped() {
        assert_eq!(encode_untyped(&json!(3)).unwrap(), Literal::Long(3));
        assert_eq!(encode_untyped(&json!(0.5)).unwrap(), Literal::Double(0.5));
        assert_eq!(decode_untyped(&Literal::Long(3)), json!(3));
    }

    #[test]
    fn test_integral_double_decodes_as_integer() {
        let lit = encode_scalar(&json!(48), ValueType::Double).unwrap();
        assert_eq!(decode_scalar(&lit, ValueType::Double), json!(48));
        assert_eq!(decode_scalar(&Literal::Double(-2.0), ValueType::Double), json!(-2));
        assert_eq!(decode_scalar(&Literal::Long(7), ValueType::Double), json!(7));
        assert_eq!(decode_scalar(&Literal::Double(48.8566), ValueType::Double), json!(48.8566));
        assert_eq!(decode_scalar(&Literal::Double(1e300), ValueType::Double), json!(1e300));
    }

    #[test]
    fn test_omit_default() {
        let spec = PropertySpec {
            attribute: "revoked".into(),
            value_type: ValueType::Boolean,
            omit_default: Some(Literal::Bool(false)),
        };
        assert!(is_omitted(&spec, &Literal::Bool(false)));
        assert!(!is_omitted(&spec, &Literal::Bool(true)));
    }
}
