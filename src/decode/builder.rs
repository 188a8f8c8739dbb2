//! Incremental assembly of a decoded JSON object.

use serde_json::{Map, Value};

/// Owns the field map while a record is decoded; `build` hands back an
/// immutable value.
#[derive(Debug, Default)]
pub(crate) struct ObjectBuilder {
    fields: Map<String, Value>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    /// Append to the list under `field`, creating it on first use.
    pub fn push(&mut self, field: &str, value: Value) {
        let slot = self.fields.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![other.take(), value]),
        }
    }

    /// A list field gets `value` appended, anything else is overwritten.
    pub fn put(&mut self, field: &str, value: Value, multi_valued: bool) {
        if multi_valued {
            self.push(field, value);
        } else {
            self.set(field, value);
        }
    }

    /// Insert `key → value` into the object under `field`.
    pub fn put_entry(&mut self, field: &str, key: &str, value: Value) {
        let slot = self.fields.entry(field.to_string()).or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = slot {
            map.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn build(self) -> Map<String, Value> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_and_entries() {
        let mut b = ObjectBuilder::new();
        b.put("labels", json!("a"), true);
        b.put("labels", json!("b"), true);
        b.put("name", json!("x"), false);
        b.put_entry("hashes", "MD5", json!("abc"));
        assert_eq!(Value::Object(b.build()), json!({"labels": ["a", "b"], "name": "x", "hashes": {"MD5": "abc"}}));
    }
}
