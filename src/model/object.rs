//! ImportableObject: one nested JSON domain object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Discriminator field present on every domain object.
pub const TYPE_FIELD: &str = "type";
/// Globally-unique identifier field, `<type>--<uuid>`.
pub const ID_FIELD: &str = "id";

/// A JSON-object tree with a `type` discriminator and an `id` of the form
/// `<type>--<uuid>`.
///
/// The invariant is checked once on construction, so `id()` and
/// `stix_type()` never fail afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ImportableObject {
    fields: Map<String, Value>,
}

impl ImportableObject {
    /// The `type` discriminator.
    pub fn stix_type(&self) -> &str {
        self.fields.get(TYPE_FIELD).and_then(Value::as_str).unwrap_or_default()
    }

    /// The unique `id`.
    pub fn id(&self) -> &str {
        self.fields.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields in document order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// The type prefix of an id (`"identity"` for `"identity--…"`).
pub fn type_of_id(id: &str) -> Option<&str> {
    match id.split_once("--") {
        Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() => Some(prefix),
        _ => None,
    }
}

impl TryFrom<Value> for ImportableObject {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(Error::InvalidObject("expected a JSON object".into()));
        };
        let stix_type = fields
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidObject("missing string field 'type'".into()))?;
        let id = fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidObject(format!("{stix_type}: missing string field 'id'")))?;
        if type_of_id(id) != Some(stix_type) {
            return Err(Error::InvalidObject(format!(
                "id '{id}' does not have the form '{stix_type}--<uuid>'"
            )));
        }
        Ok(Self { fields })
    }
}

impl From<ImportableObject> for Value {
    fn from(obj: ImportableObject) -> Self {
        obj.into_value()
    }
}

/// Extract the objects of a STIX bundle (`{"type": "bundle", "objects": [...]}`),
/// a bare JSON array, or a single object.
pub fn objects_from_json(document: Value) -> Result<Vec<ImportableObject>> {
    match document {
        Value::Array(items) => items.into_iter().map(ImportableObject::try_from).collect(),
        Value::Object(mut map) if map.get(TYPE_FIELD).and_then(Value::as_str) == Some("bundle") => {
            match map.remove("objects") {
                Some(Value::Array(items)) => items.into_iter().map(ImportableObject::try_from).collect(),
                Some(_) => Err(Error::InvalidObject("bundle 'objects' must be an array".into())),
                None => Ok(Vec::new()),
            }
        }
        other => Ok(vec![ImportableObject::try_from(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_object() {
        let obj = ImportableObject::try_from(json!({
            "type": "identity",
            "id": "identity--311b2d2d-f010-4473-83ec-1edf84858f4c",
            "name": "Alice"
        }))
        .unwrap();
        assert_eq!(obj.stix_type(), "identity");
        assert_eq!(obj.id(), "identity--311b2d2d-f010-4473-83ec-1edf84858f4c");
        assert_eq!(obj.get("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_id_must_match_type() {
        let err = ImportableObject::try_from(json!({
            "type": "identity",
            "id": "malware--311b2d2d-f010-4473-83ec-1edf84858f4c"
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidObject(_)));
    }

    #[test]
    fn test_missing_type() {
        assert!(ImportableObject::try_from(json!({"id": "x--1"})).is_err());
        assert!(ImportableObject::try_from(json!("identity")).is_err());
    }

    #[test]
    fn test_type_of_id() {
        assert_eq!(type_of_id("attack-pattern--0c7b5b88"), Some("attack-pattern"));
        assert_eq!(type_of_id("attack-pattern"), None);
        assert_eq!(type_of_id("--abc"), None);
    }

    #[test]
    fn test_objects_from_bundle() {
        let bundle = json!({
            "type": "bundle",
            "id": "bundle--5d0092c5-5f74-4287-9642-33f4c354e56d",
            "objects": [
                {"type": "identity", "id": "identity--a", "name": "A"},
                {"type": "identity", "id": "identity--b", "name": "B"}
            ]
        });
        let objects = objects_from_json(bundle).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].id(), "identity--b");
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let obj: ImportableObject =
            serde_json::from_value(json!({"type": "tool", "id": "tool--1", "name": "nmap"})).unwrap();
        assert_eq!(serde_json::to_value(&obj).unwrap()["name"], json!("nmap"));
        assert!(serde_json::from_value::<ImportableObject>(json!({"type": "tool"})).is_err());
    }
}
