//! # Relation Encoder
//!
//! Turns one `ImportableObject` into an `EncodedUnit`: the match fragment for
//! the other objects it references, the insert fragments split by whether
//! they touch those matches, the minimal identifying pattern, and the set of
//! referenced ids.
//!
//! Encoding is a pure function of (object, mapping table); nothing is
//! written until the committer executes the unit's statements.

mod relations;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec::{self, FieldClass};
use crate::mapping::{MappingTable, ObjectClass, PeerSpec, PropertySpec, RelationKind, ID_ATTRIBUTE};
use crate::model::object::type_of_id;
use crate::model::{ImportableObject, ID_FIELD, TYPE_FIELD};
use crate::query::{Clause, DeleteTarget, Literal, Pattern, RolePlayer, Statement, Var};
use crate::{Error, Result};

/// Variable bound to the object being encoded.
pub const OWNER_VAR: &str = "x";

/// Statements and dependencies of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedUnit {
    pub id: String,
    pub stix_type: String,
    /// Concrete store type of the object (relation subtype for peer objects).
    pub store_type: String,
    /// Matches for every referenced object.
    pub dependent_match: Pattern,
    /// Insert clauses that mention a matched variable.
    pub dependent_insert: Pattern,
    /// Insert clauses that stand alone.
    pub independent_insert: Pattern,
    /// `$x isa <type>; $x has stix-id <id>;`
    pub core_insert: Pattern,
    /// Ids of other objects this one references, in first-seen order.
    pub dependency_ids: IndexSet<String>,
}

impl EncodedUnit {
    /// `match <dependent_match> insert <independent> <dependent>`
    pub fn insert_statement(&self) -> Statement {
        Statement::Insert {
            matches: self.dependent_match.clone(),
            inserts: self.independent_insert.concat(&self.dependent_insert),
        }
    }

    /// Delete statement matching the object exactly as it was inserted and
    /// removing every thing it owns. Referenced objects and attributes are
    /// left in place.
    pub fn delete_statement(&self) -> Statement {
        let mut owned = Pattern::new();
        for clause in self.core_insert.iter().chain(self.independent_insert.iter()).chain(self.dependent_insert.iter()) {
            if !owned.clauses().contains(clause) {
                owned.push(clause.clone());
            }
        }
        let mut seen = IndexSet::new();
        let deletes = owned
            .iter()
            .filter_map(|clause| match clause {
                Clause::Isa { var, type_name } | Clause::Relation { var, type_name, .. } => {
                    seen.insert(var.clone()).then(|| DeleteTarget { var: var.clone(), type_name: type_name.clone() })
                }
                _ => None,
            })
            .collect();
        Statement::Delete { matches: self.dependent_match.concat(&owned), deletes }
    }
}

/// Encode one object against the merged mapping table.
pub fn encode(table: &MappingTable, object: &ImportableObject) -> Result<EncodedUnit> {
    encode_with(table, object, false)
}

/// Encode an object read back from the store. A directed peer whose source
/// or target has since been deleted keeps only the players that remain.
pub fn encode_stored(table: &MappingTable, object: &ImportableObject) -> Result<EncodedUnit> {
    encode_with(table, object, true)
}

fn encode_with(table: &MappingTable, object: &ImportableObject, stored: bool) -> Result<EncodedUnit> {
    let class = table.resolve_class(object)?;
    let mut encoder = Encoder::new(table, object.id(), stored);
    let owner = Var::new(OWNER_VAR);

    let store_type = match &class.peer {
        Some(peer) => encoder.encode_peer(&owner, peer, object)?,
        None => {
            encoder.inserts.push(Clause::isa(&owner, &class.store_type));
            class.store_type.clone()
        }
    };
    let id_clause = Clause::has(&owner, ID_ATTRIBUTE, Literal::from(object.id()));
    encoder.inserts.push(id_clause.clone());

    encoder.encode_object_fields(&owner, class, object.fields())?;

    let core_insert: Pattern = [Clause::isa(&owner, &store_type), id_clause].into_iter().collect();
    Ok(encoder.finish(object, store_type, core_insert))
}

// ============================================================================
// Encoder state
// ============================================================================

/// Per-object encoding state.
pub(crate) struct Encoder<'t> {
    pub(crate) table: &'t MappingTable,
    owner_id: String,
    next_var: usize,
    pub(crate) matches: Pattern,
    pub(crate) inserts: Pattern,
    /// Referenced id → its match variable.
    ref_vars: IndexMap<String, Var>,
    pub(crate) dependencies: IndexSet<String>,
    /// Top-level field → attribute values written for it, in list order.
    pub(crate) field_values: IndexMap<String, Vec<(String, Literal)>>,
    /// Peer references may be dangling.
    stored: bool,
}

impl<'t> Encoder<'t> {
    fn new(table: &'t MappingTable, owner_id: &str, stored: bool) -> Self {
        Self {
            table,
            owner_id: owner_id.to_string(),
            next_var: 0,
            matches: Pattern::new(),
            inserts: Pattern::new(),
            ref_vars: IndexMap::new(),
            dependencies: IndexSet::new(),
            field_values: IndexMap::new(),
            stored,
        }
    }

    pub(crate) fn fresh(&mut self, prefix: &str) -> Var {
        let var = Var::new(format!("{prefix}{}", self.next_var));
        self.next_var += 1;
        var
    }

    /// Match variable for a referenced id, allocated once per id. A
    /// reference to the object itself resolves to the owner variable.
    pub(crate) fn reference(&mut self, id: &str) -> Result<Var> {
        if id == self.owner_id {
            return Ok(Var::new(OWNER_VAR));
        }
        if let Some(var) = self.ref_vars.get(id) {
            return Ok(var.clone());
        }
        let store_type = base_store_type(self.table, id)?;
        let var = self.fresh("ref");
        self.matches.push(Clause::isa(&var, store_type));
        self.matches.push(Clause::has(&var, ID_ATTRIBUTE, Literal::from(id)));
        self.ref_vars.insert(id.to_string(), var.clone());
        self.dependencies.insert(id.to_string());
        Ok(var)
    }

    /// Scalars and relation-backed fields of the top-level object. Peer
    /// fields are already consumed; granular markings run last so their
    /// selectors see every allocated value.
    fn encode_object_fields(&mut self, owner: &Var, class: &ObjectClass, fields: &Map<String, Value>) -> Result<()> {
        let mut markings = None;
        for (field, value) in fields {
            if field == TYPE_FIELD || field == ID_FIELD {
                continue;
            }
            match codec::classify(self.table, &class.kind, field)? {
                FieldClass::Scalar(spec) => {
                    let written = self.encode_scalar(owner, spec, value)?;
                    self.field_values.insert(field.clone(), written);
                }
                FieldClass::Relation(RelationKind::TypedPeerRelation(_)) => {}
                FieldClass::Relation(RelationKind::GranularMarking(spec)) => markings = Some((spec, value)),
                FieldClass::Relation(kind) => self.encode_relation(owner, field, kind, value)?,
            }
        }
        if let Some((spec, value)) = markings {
            self.encode_granular_markings(owner, spec, value)?;
        }
        Ok(())
    }

    /// Fields of a nested sub-object. Everything is relative to `owner`.
    pub(crate) fn encode_nested_fields(&mut self, owner: &Var, kind: &str, fields: &Map<String, Value>) -> Result<()> {
        for (field, value) in fields {
            match codec::classify(self.table, kind, field)? {
                FieldClass::Scalar(spec) => {
                    self.encode_scalar(owner, spec, value)?;
                }
                FieldClass::Relation(relation) => self.encode_relation(owner, field, relation, value)?,
            }
        }
        Ok(())
    }

    /// `has` clauses for a scalar or list of scalars; returns what was written.
    fn encode_scalar(&mut self, owner: &Var, spec: &PropertySpec, value: &Value) -> Result<Vec<(String, Literal)>> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        let mut written = Vec::with_capacity(items.len());
        for item in items {
            let literal = codec::encode_scalar(item, spec.value_type)?;
            if codec::is_omitted(spec, &literal) {
                continue;
            }
            self.inserts.push(Clause::has(owner, &spec.attribute, literal.clone()));
            written.push((spec.attribute.clone(), literal));
        }
        Ok(written)
    }

    /// The object itself is a relation between its referenced peers.
    fn encode_peer(&mut self, owner: &Var, peer: &PeerSpec, object: &ImportableObject) -> Result<String> {
        let (relation, players) = match peer {
            PeerSpec::Directed { subtype_field, source_field, target_field, subtypes } => {
                let subtype = object
                    .get(subtype_field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidObject(format!("{}: missing '{subtype_field}'", object.id())))?;
                let roles = subtypes
                    .get(subtype)
                    .ok_or_else(|| Error::UnsupportedRelationSubtype(subtype.to_string()))?;
                let mut players = Vec::with_capacity(2);
                for (field, role) in [(source_field, &roles.source_role), (target_field, &roles.target_role)] {
                    match object.get(field).and_then(Value::as_str) {
                        Some(id) => players.push(RolePlayer::new(role, self.reference(id)?)),
                        None if self.stored => {}
                        None => return Err(missing_reference(object, field)),
                    }
                }
                if players.is_empty() {
                    return Err(missing_reference(object, source_field));
                }
                (roles.relation.clone(), players)
            }
            PeerSpec::MultiRole { relation, roles } => {
                let mut players = Vec::new();
                for role in roles {
                    for id in id_list(object.get(&role.field), &role.field)? {
                        players.push(RolePlayer::new(&role.role, self.reference(id)?));
                    }
                }
                (relation.clone(), players)
            }
        };
        self.inserts.push(Clause::relation(owner, &relation, players));
        Ok(relation)
    }

    fn finish(self, object: &ImportableObject, store_type: String, core_insert: Pattern) -> EncodedUnit {
        let matched: Vec<&Var> = self.ref_vars.values().collect();
        let (dependent, independent): (Vec<Clause>, Vec<Clause>) = self
            .inserts
            .iter()
            .cloned()
            .partition(|clause| matched.iter().any(|var| clause.mentions(var)));
        EncodedUnit {
            id: object.id().to_string(),
            stix_type: object.stix_type().to_string(),
            store_type,
            dependent_match: self.matches,
            dependent_insert: dependent.into_iter().collect(),
            independent_insert: independent.into_iter().collect(),
            core_insert,
            dependency_ids: self.dependencies,
        }
    }
}

/// Store type used to match an object by id: the base class of its type.
fn base_store_type<'t>(table: &'t MappingTable, id: &str) -> Result<&'t str> {
    let stix_type = type_of_id(id).ok_or_else(|| Error::InvalidObject(format!("malformed reference '{id}'")))?;
    table
        .dispatch(stix_type)
        .map(|d| d.class.store_type.as_str())
        .ok_or_else(|| Error::MissingMappingEntry { kind: stix_type.to_string(), field: ID_FIELD.to_string() })
}

fn missing_reference(object: &ImportableObject, field: &str) -> Error {
    Error::InvalidObject(format!("{}: missing reference '{field}'", object.id()))
}

/// A single id or a list of ids; absent means none.
pub(crate) fn id_list<'v>(value: Option<&'v Value>, field: &str) -> Result<Vec<&'v str>> {
    let invalid = || Error::UnsupportedValueType { expected: format!("id or id list for '{field}'"), got: "other".into() };
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(id)) => Ok(vec![id.as_str()]),
        Some(Value::Array(items)) => items.iter().map(|v| v.as_str().ok_or_else(invalid)).collect(),
        Some(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImportConfiguration, Registry};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn table() -> Arc<MappingTable> {
        Registry::global().mappings(&ImportConfiguration::default()).unwrap()
    }

    fn object(value: Value) -> ImportableObject {
        ImportableObject::try_from(value).unwrap()
    }

    #[test]
    fn test_scalars_only_are_independent() {
        let unit = encode(
            &table(),
            &object(json!({
                "type": "identity",
                "id": "identity--1",
                "name": "ACME",
                "roles": ["a", "b"],
                "revoked": false
            })),
        )
        .unwrap();
        assert!(unit.dependent_match.is_empty());
        assert!(unit.dependency_ids.is_empty());
        assert_eq!(
            unit.insert_statement().to_string(),
            "insert $x isa identity; $x has stix-id \"identity--1\"; $x has name \"ACME\"; \
             $x has roles \"a\"; $x has roles \"b\";"
        );
    }

    #[test]
    fn test_embedded_reference_is_dependent() {
        let unit = encode(
            &table(),
            &object(json!({
                "type": "indicator",
                "id": "indicator--1",
                "created_by_ref": "identity--9",
                "object_marking_refs": ["marking-definition--1", "marking-definition--2"]
            })),
        )
        .unwrap();
        assert_eq!(
            unit.dependency_ids.iter().collect::<Vec<_>>(),
            vec!["identity--9", "marking-definition--1", "marking-definition--2"]
        );
        assert_eq!(unit.dependent_match.len(), 6);
        assert_eq!(
            unit.dependent_insert.to_string(),
            "$rel1 (created:$x, creator:$ref0) isa created-by; \
             $rel4 (marked:$x, marking:$ref2, marking:$ref3) isa object-marking;"
        );
    }

    #[test]
    fn test_repeated_reference_reuses_var() {
        let unit = encode(
            &table(),
            &object(json!({
                "type": "report",
                "id": "report--1",
                "created_by_ref": "identity--9",
                "object_refs": ["identity--9"]
            })),
        )
        .unwrap();
        assert_eq!(unit.dependency_ids.len(), 1);
        assert_eq!(unit.dependent_match.len(), 2);
    }

    #[test]
    fn test_self_reference_has_no_dependency() {
        let unit = encode(
            &table(),
            &object(json!({"type": "grouping", "id": "grouping--1", "object_refs": ["grouping--1"]})),
        )
        .unwrap();
        assert!(unit.dependency_ids.is_empty());
        assert_eq!(unit.independent_insert.len(), 3);
    }

    #[test]
    fn test_relationship_subtype() {
        let unit = encode(
            &table(),
            &object(json!({
                "type": "relationship",
                "id": "relationship--1",
                "relationship_type": "uses",
                "source_ref": "malware--1",
                "target_ref": "attack-pattern--1"
            })),
        )
        .unwrap();
        assert_eq!(unit.store_type, "uses");
        assert_eq!(unit.core_insert.to_string(), "$x isa uses; $x has stix-id \"relationship--1\";");
        assert!(unit.dependent_insert.to_string().starts_with("$x (user:$ref0, used:$ref1) isa uses;"));
    }

    #[test]
    fn test_unknown_relationship_subtype() {
        let err = encode(
            &table(),
            &object(json!({
                "type": "relationship",
                "id": "relationship--1",
                "relationship_type": "befriends",
                "source_ref": "malware--1",
                "target_ref": "malware--2"
            })),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedRelationSubtype(ref s) if s == "befriends"));
    }

    #[test]
    fn test_unknown_field() {
        let err = encode(&table(), &object(json!({"type": "tool", "id": "tool--1", "colour": "red"}))).unwrap_err();
        assert!(matches!(err, Error::MissingMappingEntry { ref field, .. } if field == "colour"));
    }

    #[test]
    fn test_delete_statement_matches_owner_once() {
        let unit = encode(&table(), &object(json!({"type": "identity", "id": "identity--1", "name": "ACME"}))).unwrap();
        let statement = unit.delete_statement();
        assert_eq!(statement.to_string().matches("stix-id").count(), 1);
        let Statement::Delete { matches, .. } = statement else { panic!("not a delete") };
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_stored_relationship_with_dangling_target() {
        let dangling = object(json!({
            "type": "relationship",
            "id": "relationship--1",
            "relationship_type": "uses",
            "source_ref": "malware--1"
        }));
        let err = encode(&table(), &dangling).unwrap_err();
        assert!(matches!(err, Error::InvalidObject(ref msg) if msg.contains("target_ref")));

        let unit = encode_stored(&table(), &dangling).unwrap();
        assert_eq!(unit.dependency_ids.iter().collect::<Vec<_>>(), vec!["malware--1"]);
        assert!(unit.dependent_insert.to_string().starts_with("$x (user:$ref0) isa uses;"));
    }

    #[test]
    fn test_stored_relationship_without_players() {
        let bare = object(json!({"type": "relationship", "id": "relationship--1", "relationship_type": "uses"}));
        assert!(matches!(encode_stored(&table(), &bare), Err(Error::InvalidObject(_))));
    }

    #[test]
    fn test_delete_statement_targets() {
        let unit = encode(
            &table(),
            &object(json!({"type": "tool", "id": "tool--1", "name": "nmap", "created_by_ref": "identity--9"})),
        )
        .unwrap();
        let Statement::Delete { deletes, matches } = unit.delete_statement() else { panic!("not a delete") };
        let vars: Vec<&str> = deletes.iter().map(|d| d.var.name()).collect();
        assert_eq!(vars, vec!["x", "rel1"]);
        assert!(matches.iter().any(|c| c.subject().name() == "ref0"));
    }
}
