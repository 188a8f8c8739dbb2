//! # Result Decoder
//!
//! Rebuilds the nested JSON object from a `ThingRecord`: scalar attributes
//! through the reverse property table, relation instances through the
//! relation index. Sub-objects, key/value entries and hashes arrive as nested
//! records and are decoded recursively.

mod builder;

use indexmap::IndexMap;
use serde_json::Value;

use self::builder::ObjectBuilder;
use crate::codec;
use crate::mapping::{
    EmbeddedSpec, ExtensionSpec, FieldMapping, GranularSpec, HashSpec, KeyValueSpec, MappingTable, PeerSpec,
    RelationKind, SubObjectSpec, ID_ATTRIBUTE,
};
use crate::model::{ImportableObject, ID_FIELD, TYPE_FIELD};
use crate::storage::{Player, RelationInstance, RolePlayerRecord, ThingRecord};
use crate::{Error, Result};

/// Decode a top-level object record.
pub fn decode_record(table: &MappingTable, record: &ThingRecord) -> Result<ImportableObject> {
    let class = table.class_for_store_type(&record.type_name).ok_or_else(|| Error::MissingMappingEntry {
        kind: record.type_name.clone(),
        field: TYPE_FIELD.to_string(),
    })?;
    let id = record
        .attribute(ID_ATTRIBUTE)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidObject(format!("{} record without '{ID_ATTRIBUTE}'", record.type_name)))?;

    let mut object = ObjectBuilder::new();
    object.set(TYPE_FIELD, Value::from(class.stix_type.as_str()));
    object.set(ID_FIELD, Value::from(id));
    let decoder = Decoder { table };
    decoder.attributes(&mut object, &class.kind, record)?;
    if let Some(peer) = &class.peer {
        decoder.peer(&mut object, peer, record);
    }
    decoder.relations(&mut object, &class.kind, record)?;

    ImportableObject::try_from(Value::Object(object.build()))
}

struct Decoder<'t> {
    table: &'t MappingTable,
}

impl Decoder<'_> {
    fn attributes(&self, object: &mut ObjectBuilder, kind: &str, record: &ThingRecord) -> Result<()> {
        for attribute in &record.attributes {
            if attribute.type_name == ID_ATTRIBUTE {
                continue;
            }
            let missing = || Error::MissingMappingEntry { kind: kind.to_string(), field: attribute.type_name.clone() };
            let field = self.table.field_for_attribute(kind, &attribute.type_name).ok_or_else(missing)?;
            let Some(FieldMapping::Attribute(spec)) = self.table.field(kind, field) else {
                return Err(missing());
            };
            let value = codec::decode_scalar(&attribute.value, spec.value_type);
            object.put(field, value, self.table.is_multi_valued(field));
        }
        Ok(())
    }

    /// Role players of a relation-shaped object back into its reference fields.
    fn peer(&self, object: &mut ObjectBuilder, peer: &PeerSpec, record: &ThingRecord) {
        match peer {
            PeerSpec::Directed { subtype_field, source_field, target_field, subtypes } => {
                let Some((name, roles)) = subtypes.iter().find(|(_, roles)| roles.relation == record.type_name) else {
                    return;
                };
                object.set(subtype_field, Value::from(name.as_str()));
                for (role, field) in [(&roles.source_role, source_field), (&roles.target_role, target_field)] {
                    if let Some(id) = referenced_ids(&record.players, role).next() {
                        object.set(field, Value::from(id));
                    }
                }
            }
            PeerSpec::MultiRole { roles, .. } => {
                for role in roles {
                    for id in referenced_ids(&record.players, &role.role) {
                        object.put(&role.field, Value::from(id), self.table.is_multi_valued(&role.field));
                    }
                }
            }
        }
    }

    fn relations(&self, object: &mut ObjectBuilder, kind: &str, record: &ThingRecord) -> Result<()> {
        let mut markings = Vec::new();
        for instance in &record.relations {
            let entry = self
                .table
                .relation_by_type(&instance.type_name)
                .ok_or_else(|| Error::UnknownRelationType(instance.type_name.clone()))?;
            let field = entry.field.as_str();
            match &entry.kind {
                RelationKind::EmbeddedReference(spec) => self.embedded(object, field, spec, instance),
                RelationKind::KeyValueStore(spec) => self.key_values(object, field, spec, instance),
                RelationKind::ListOfSubObjects(spec) => self.sub_objects(object, field, spec, instance)?,
                RelationKind::ExtensionObject(spec) => self.extension(object, field, spec, instance)?,
                RelationKind::HashSet(spec) => self.hashes(object, field, spec, instance),
                RelationKind::GranularMarking(spec) if instance.own_role == spec.marked_role => {
                    markings.push((field, spec, instance));
                }
                RelationKind::GranularMarking(_) | RelationKind::TypedPeerRelation(_) => {}
            }
        }
        for (field, spec, instance) in markings {
            self.granular_marking(object, kind, field, spec, instance);
        }
        Ok(())
    }

    /// Decode an anonymous sub-object record against its kind.
    fn nested(&self, kind: &str, record: &ThingRecord) -> Result<Value> {
        let mut object = ObjectBuilder::new();
        self.attributes(&mut object, kind, record)?;
        self.relations(&mut object, kind, record)?;
        Ok(Value::Object(object.build()))
    }

    fn embedded(&self, object: &mut ObjectBuilder, field: &str, spec: &EmbeddedSpec, instance: &RelationInstance) {
        if instance.own_role != spec.owner_role {
            return;
        }
        let multi = self.table.is_multi_valued(field);
        for id in referenced_ids(&instance.players, &spec.pointed_role) {
            object.put(field, Value::from(id), multi);
        }
    }

    fn key_values(&self, object: &mut ObjectBuilder, field: &str, spec: &KeyValueSpec, instance: &RelationInstance) {
        if instance.own_role != spec.owner_role {
            return;
        }
        for entry in nested_players(instance, &spec.entry_role) {
            let Some(key) = entry.attribute(&spec.key_attribute).and_then(|k| k.as_str()) else {
                continue;
            };
            let mut values: Vec<Value> = entry
                .attributes
                .iter()
                .filter(|a| a.type_name == spec.value_attribute)
                .map(|a| codec::decode_untyped(&a.value))
                .collect();
            let value = match values.len() {
                1 => values.remove(0),
                _ => Value::Array(values),
            };
            object.put_entry(field, key, value);
        }
    }

    fn sub_objects(
        &self,
        object: &mut ObjectBuilder,
        field: &str,
        spec: &SubObjectSpec,
        instance: &RelationInstance,
    ) -> Result<()> {
        if instance.own_role != spec.owner_role {
            return Ok(());
        }
        for element in nested_players(instance, &spec.element_role) {
            object.push(field, self.nested(&spec.element_kind, element)?);
        }
        Ok(())
    }

    fn extension(
        &self,
        object: &mut ObjectBuilder,
        field: &str,
        spec: &ExtensionSpec,
        instance: &RelationInstance,
    ) -> Result<()> {
        let Some((name, layout)) = spec.extensions.iter().find(|(_, l)| l.relation == instance.type_name) else {
            return Err(Error::UnknownRelationType(instance.type_name.clone()));
        };
        if instance.own_role != layout.owner_role {
            return Ok(());
        }
        if let Some(element) = nested_players(instance, &layout.element_role).next() {
            object.put_entry(field, name, self.nested(&layout.element_kind, element)?);
        }
        Ok(())
    }

    fn hashes(&self, object: &mut ObjectBuilder, field: &str, spec: &HashSpec, instance: &RelationInstance) {
        if instance.own_role != spec.owner_role {
            return;
        }
        for hash in nested_players(instance, &spec.hash_role) {
            let algorithm = spec.algorithms.iter().find(|(_, t)| **t == hash.type_name).map(|(a, _)| a);
            let digest = hash.attribute(&spec.value_attribute).and_then(|v| v.as_str());
            if let (Some(algorithm), Some(digest)) = (algorithm, digest) {
                object.put_entry(field, algorithm, Value::from(digest));
            }
        }
    }

    /// Selectors are rebuilt from the attribute values the marking points at:
    /// `field` when it covers every value of the field, `field.[n]` per
    /// value otherwise.
    fn granular_marking(
        &self,
        object: &mut ObjectBuilder,
        kind: &str,
        field: &str,
        spec: &GranularSpec,
        instance: &RelationInstance,
    ) {
        let mut marking = ObjectBuilder::new();
        if let Some(id) = referenced_ids(&instance.players, &spec.marking_role).next() {
            marking.set("marking_ref", Value::from(id));
        }

        let mut selected: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for rp in instance.players.iter().filter(|rp| rp.role == spec.target_role) {
            let Player::Attribute(attribute) = &rp.player else {
                continue;
            };
            let Some(target) = self.table.field_for_attribute(kind, &attribute.type_name) else {
                continue;
            };
            let value = codec::decode_untyped(&attribute.value);
            let indices = selected.entry(target).or_default();
            if let Some(Value::Array(items)) = object.get(target) {
                indices.extend(items.iter().enumerate().filter(|(_, v)| selector_matches(v, &value)).map(|(i, _)| i));
            }
        }
        let mut selectors = Vec::new();
        for (target, mut indices) in selected {
            indices.sort_unstable();
            indices.dedup();
            let len = match object.get(target) {
                Some(Value::Array(items)) => items.len(),
                _ => 0,
            };
            if indices.is_empty() || indices.len() == len {
                selectors.push(Value::from(target));
            } else {
                selectors.extend(indices.into_iter().map(|i| Value::from(format!("{target}.[{i}]"))));
            }
        }
        marking.set("selectors", Value::Array(selectors));

        if let Some(lang) = instance.attributes.iter().find(|a| a.type_name == spec.lang_attribute) {
            marking.set("lang", codec::decode_untyped(&lang.value));
        }
        object.push(field, Value::Object(marking.build()));
    }
}

/// Attribute values compare by their stored form; datetimes decode to the
/// same rendering on both sides.
fn selector_matches(item: &Value, value: &Value) -> bool {
    item == value || matches!((item.as_f64(), value.as_f64()), (Some(a), Some(b)) if a == b)
}

fn referenced_ids<'r>(players: &'r [RolePlayerRecord], role: &'r str) -> impl Iterator<Item = &'r str> {
    players.iter().filter(move |rp| rp.role == role).filter_map(|rp| match &rp.player {
        Player::Reference { id, .. } => Some(id.as_str()),
        _ => None,
    })
}

fn nested_players<'r>(instance: &'r RelationInstance, role: &'r str) -> impl Iterator<Item = &'r ThingRecord> {
    instance.players.iter().filter(move |rp| rp.role == role).filter_map(|rp| match &rp.player {
        Player::Nested(record) => Some(record.as_ref()),
        _ => None,
    })
}
