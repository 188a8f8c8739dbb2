//! Per-kind encoding of relation-backed fields.

use serde_json::{Map, Value};
use tracing::warn;

use super::{id_list, Encoder};
use crate::codec;
use crate::mapping::{
    EmbeddedSpec, ExtensionSpec, GranularSpec, HashSpec, KeyValueSpec, RelationKind, SubObjectSpec,
};
use crate::query::{Clause, Literal, RolePlayer, ValueType, Var};
use crate::{Error, Result};

impl Encoder<'_> {
    pub(super) fn encode_relation(&mut self, owner: &Var, field: &str, kind: &RelationKind, value: &Value) -> Result<()> {
        match kind {
            RelationKind::EmbeddedReference(spec) => self.encode_embedded(owner, field, spec, value),
            RelationKind::KeyValueStore(spec) => self.encode_key_values(owner, field, spec, value),
            RelationKind::ListOfSubObjects(spec) => self.encode_sub_objects(owner, field, spec, value),
            RelationKind::ExtensionObject(spec) => self.encode_extensions(owner, field, spec, value),
            RelationKind::HashSet(spec) => self.encode_hashes(owner, field, spec, value),
            RelationKind::GranularMarking(spec) => self.encode_granular_markings(owner, spec, value),
            // only valid on the top-level object, where it was already consumed
            RelationKind::TypedPeerRelation(_) => Err(Error::MissingMappingEntry {
                kind: "sub-object".to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// One binary relation per field; every referenced id plays the pointed role.
    fn encode_embedded(&mut self, owner: &Var, field: &str, spec: &EmbeddedSpec, value: &Value) -> Result<()> {
        let ids = id_list(Some(value), field)?;
        if ids.is_empty() {
            return Ok(());
        }
        let mut players = vec![RolePlayer::new(&spec.owner_role, owner.clone())];
        for id in ids {
            players.push(RolePlayer::new(&spec.pointed_role, self.reference(id)?));
        }
        let rel = self.fresh("rel");
        self.inserts.push(Clause::relation(&rel, &spec.relation, players));
        Ok(())
    }

    /// One entry entity per key, all linked to the owner through one relation.
    fn encode_key_values(&mut self, owner: &Var, field: &str, spec: &KeyValueSpec, value: &Value) -> Result<()> {
        let entries = as_object(value, field)?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut players = vec![RolePlayer::new(&spec.owner_role, owner.clone())];
        for (key, entry) in entries {
            let var = self.fresh("kv");
            self.inserts.push(Clause::isa(&var, &spec.entry_type));
            self.inserts.push(Clause::has(&var, &spec.key_attribute, Literal::from(key.as_str())));
            let values: Vec<&Value> = match entry {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for v in values {
                self.inserts.push(Clause::has(&var, &spec.value_attribute, codec::encode_untyped(v)?));
            }
            players.push(RolePlayer::new(&spec.entry_role, var));
        }
        let rel = self.fresh("rel");
        self.inserts.push(Clause::relation(&rel, &spec.relation, players));
        Ok(())
    }

    /// One sub-entity per element, each encoded recursively, all linked
    /// through one relation in list order.
    fn encode_sub_objects(&mut self, owner: &Var, field: &str, spec: &SubObjectSpec, value: &Value) -> Result<()> {
        let Value::Array(items) = value else {
            return Err(Error::UnsupportedValueType {
                expected: format!("list of objects for '{field}'"),
                got: codec::json_type_name(value).to_string(),
            });
        };
        if items.is_empty() {
            return Ok(());
        }
        let mut players = vec![RolePlayer::new(&spec.owner_role, owner.clone())];
        for item in items {
            let element = self.encode_sub_object(spec, item, field)?;
            players.push(RolePlayer::new(&spec.element_role, element));
        }
        let rel = self.fresh("rel");
        self.inserts.push(Clause::relation(&rel, &spec.relation, players));
        Ok(())
    }

    fn encode_sub_object(&mut self, spec: &SubObjectSpec, value: &Value, field: &str) -> Result<Var> {
        let fields = as_object(value, field)?;
        let var = self.fresh("sub");
        self.inserts.push(Clause::isa(&var, &spec.element_type));
        self.encode_nested_fields(&var, &spec.element_kind, fields)?;
        Ok(var)
    }

    /// One sub-entity per named extension, linked by the extension's relation.
    fn encode_extensions(&mut self, owner: &Var, field: &str, spec: &ExtensionSpec, value: &Value) -> Result<()> {
        for (name, ext) in as_object(value, field)? {
            let layout = spec.extensions.get(name).ok_or_else(|| Error::MissingMappingEntry {
                kind: field.to_string(),
                field: name.clone(),
            })?;
            let element = self.encode_sub_object(layout, ext, name)?;
            let rel = self.fresh("rel");
            self.inserts.push(Clause::relation(&rel, &layout.relation, [
                RolePlayer::new(&layout.owner_role, owner.clone()),
                RolePlayer::new(&layout.element_role, element),
            ]));
        }
        Ok(())
    }

    /// One hash entity per recognized algorithm. Unknown algorithms are skipped.
    fn encode_hashes(&mut self, owner: &Var, field: &str, spec: &HashSpec, value: &Value) -> Result<()> {
        let mut players = vec![RolePlayer::new(&spec.owner_role, owner.clone())];
        for (algorithm, digest) in as_object(value, field)? {
            let Some(hash_type) = spec.algorithms.get(algorithm) else {
                warn!(algorithm = %algorithm, "skipping unrecognized hash algorithm");
                continue;
            };
            let digest = codec::encode_scalar(digest, ValueType::String)?;
            let var = self.fresh("hash");
            self.inserts.push(Clause::isa(&var, hash_type));
            self.inserts.push(Clause::has(&var, &spec.value_attribute, digest));
            players.push(RolePlayer::new(&spec.hash_role, var));
        }
        if players.len() > 1 {
            let rel = self.fresh("rel");
            self.inserts.push(Clause::relation(&rel, &spec.relation, players));
        }
        Ok(())
    }

    /// One relation per marking: owner, marking definition, and every
    /// attribute value the selectors point at.
    pub(super) fn encode_granular_markings(&mut self, owner: &Var, spec: &GranularSpec, value: &Value) -> Result<()> {
        let Value::Array(markings) = value else {
            return Err(Error::UnsupportedValueType {
                expected: "list of granular markings".to_string(),
                got: codec::json_type_name(value).to_string(),
            });
        };
        for marking in markings {
            let marking = as_object(marking, "granular_markings")?;
            let mut players = vec![RolePlayer::new(&spec.marked_role, owner.clone())];
            if let Some(marking_ref) = marking.get("marking_ref") {
                for id in id_list(Some(marking_ref), "marking_ref")? {
                    players.push(RolePlayer::new(&spec.marking_role, self.reference(id)?));
                }
            }
            let selectors = id_list(marking.get("selectors"), "selectors")?;
            for selector in selectors {
                for (attribute, literal) in self.resolve_selector(selector)? {
                    let var = self.fresh("sel");
                    self.inserts.push(Clause::attribute(&var, attribute, literal));
                    players.push(RolePlayer::new(&spec.target_role, var));
                }
            }
            let rel = self.fresh("gm");
            self.inserts.push(Clause::relation(&rel, &spec.relation, players));
            if let Some(lang) = marking.get("lang") {
                let lang = codec::encode_scalar(lang, ValueType::String)?;
                self.inserts.push(Clause::has(&rel, &spec.lang_attribute, lang));
            }
        }
        Ok(())
    }

    /// `field` selects every value written for a field, `field.[n]` the n-th.
    fn resolve_selector(&self, selector: &str) -> Result<Vec<(String, Literal)>> {
        let unresolved = || Error::UnresolvedSelector(selector.to_string());
        let (field, index) = parse_selector(selector).ok_or_else(unresolved)?;
        let values = self.field_values.get(field).ok_or_else(unresolved)?;
        match index {
            None if !values.is_empty() => Ok(values.clone()),
            Some(n) => values.get(n).cloned().map(|v| vec![v]).ok_or_else(unresolved),
            None => Err(unresolved()),
        }
    }
}

/// Split `field` / `field.[n]`; anything deeper is not a scalar selector.
pub(crate) fn parse_selector(selector: &str) -> Option<(&str, Option<usize>)> {
    match selector.split_once(".[") {
        None if !selector.contains('.') => Some((selector, None)),
        None => None,
        Some((field, rest)) => {
            let index = rest.strip_suffix(']')?.parse().ok()?;
            Some((field, Some(index)))
        }
    }
}

fn as_object<'v>(value: &'v Value, field: &str) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| Error::UnsupportedValueType {
        expected: format!("object for '{field}'"),
        got: codec::json_type_name(value).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use crate::model::ImportableObject;
    use crate::{ImportConfiguration, Registry};
    use serde_json::json;

    fn encode_json(value: Value) -> Result<crate::EncodedUnit> {
        let table = Registry::global().mappings(&ImportConfiguration::default()).unwrap();
        encode(&table, &ImportableObject::try_from(value).unwrap())
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(parse_selector("labels"), Some(("labels", None)));
        assert_eq!(parse_selector("labels.[12]"), Some(("labels", Some(12))));
        assert_eq!(parse_selector("external_references.[0].url"), None);
        assert_eq!(parse_selector("labels.[x]"), None);
    }

    #[test]
    fn test_kill_chain_phases_list() {
        let unit = encode_json(json!({
            "type": "attack-pattern",
            "id": "attack-pattern--1",
            "kill_chain_phases": [
                {"kill_chain_name": "lockheed", "phase_name": "recon"},
                {"kill_chain_name": "lockheed", "phase_name": "delivery"}
            ]
        }))
        .unwrap();
        let text = unit.independent_insert.to_string();
        assert!(text.contains("$sub0 isa kill-chain-phase; $sub0 has kill-chain-name \"lockheed\";"));
        assert!(text.ends_with("$rel2 (kill-chain-using:$x, kill-chain-used:$sub0, kill-chain-used:$sub1) isa kill-chain-usage;"));
    }

    #[test]
    fn test_hashes_skip_unknown_algorithm() {
        let unit = encode_json(json!({
            "type": "file",
            "id": "file--1",
            "hashes": {"MD5": "abc", "CRC-99": "zzz"}
        }))
        .unwrap();
        let text = unit.independent_insert.to_string();
        assert!(text.contains("$hash0 isa md5; $hash0 has hash-value \"abc\";"));
        assert!(!text.contains("zzz"));
    }

    #[test]
    fn test_unknown_extension() {
        let err = encode_json(json!({
            "type": "file",
            "id": "file--1",
            "extensions": {"made-up-ext": {"a": 1}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::MissingMappingEntry { ref field, .. } if field == "made-up-ext"));
    }

    #[test]
    fn test_granular_selector_targets_list_element() {
        let unit = encode_json(json!({
            "type": "indicator",
            "id": "indicator--1",
            "labels": ["a", "b"],
            "granular_markings": [{"marking_ref": "marking-definition--1", "selectors": ["labels.[1]"]}]
        }))
        .unwrap();
        assert_eq!(
            unit.dependent_insert.to_string(),
            "$gm2 (marked:$x, marking:$ref0, marked-property:$sel1) isa granular-marking;"
        );
        assert!(unit.independent_insert.to_string().ends_with("$sel1 \"b\" isa labels;"));
    }

    #[test]
    fn test_unresolved_selector() {
        let err = encode_json(json!({
            "type": "indicator",
            "id": "indicator--1",
            "labels": ["a"],
            "granular_markings": [{"marking_ref": "marking-definition--1", "selectors": ["labels.[3]"]}]
        }))
        .unwrap_err();
        assert!(matches!(err, Error::UnresolvedSelector(ref s) if s == "labels.[3]"));
    }

    #[test]
    fn test_key_value_entries() {
        let unit = encode_json(json!({
            "type": "marking-definition",
            "id": "marking-definition--1",
            "definition_type": "tlp",
            "definition": {"tlp": "green"}
        }))
        .unwrap();
        assert!(unit.independent_insert.to_string().contains(
            "$kv0 isa marking-entry; $kv0 has key-name \"tlp\"; $kv0 has key-value \"green\"; \
             $rel1 (marking:$x, pointed-kvp:$kv0) isa marking;"
        ));
    }
}
