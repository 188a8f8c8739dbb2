//! # Mapping Registry
//!
//! Translation tables between object fields and store schema, merged from
//! the active domains of an `ImportConfiguration`.
//!
//! Each domain contributes four sub-tables:
//!
//! | Sub-table | Type | Role |
//! |-----------|------|------|
//! | (a) properties | `kind → field → FieldMapping` | scalar field ⇄ attribute |
//! | (b) relations | `field → RelationKind` | relation-backed field categorization |
//! | (c) multi-valued | `{field}` | fields holding lists |
//! | (d) dispatch | `stix type → Dispatch` | physical object kind + specializations |
//!
//! The merged `MappingTable` is immutable and shared through an `Arc`.

pub mod catalog;
pub mod domain;
pub mod registry;

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ImportableObject;
use crate::query::{Literal, ValueType};
use crate::{Error, Result};

pub use domain::{DomainTable, KindBuilder};
pub use registry::Registry;

/// Attribute holding the object id on every top-level thing.
pub const ID_ATTRIBUTE: &str = "stix-id";

// ============================================================================
// Object classes
// ============================================================================

/// The four physical object categories of the store schema, plus the
/// category of nested sub-objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    /// Domain object
    Sdo,
    /// Relationship object
    Sro,
    /// Cyber-observable object
    Sco,
    /// Marking / meta object
    Meta,
}

impl ObjectCategory {
    /// Abstract root type every class of this category inherits from.
    pub fn root_type(&self) -> &'static str {
        match self {
            ObjectCategory::Sdo => "stix-domain-object",
            ObjectCategory::Sro => "stix-relationship-object",
            ObjectCategory::Sco => "stix-cyber-observable-object",
            ObjectCategory::Meta => "stix-meta-object",
        }
    }
}

/// Where a top-level object type lands in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub stix_type: String,
    /// Concrete store type (`isa`) for inserts.
    pub store_type: String,
    pub category: ObjectCategory,
    /// Key of the property table used for this class.
    pub kind: String,
    pub supertype: Option<String>,
    /// Set when the object is itself a relation between other objects.
    pub peer: Option<PeerSpec>,
}

/// Alternative class chosen when `field` equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialization {
    pub field: String,
    pub equals: Value,
    pub class: ObjectClass,
}

/// Type → class dispatch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub class: ObjectClass,
    pub specializations: Vec<Specialization>,
}

// ============================================================================
// Properties
// ============================================================================

/// Scalar field ⇄ attribute translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub attribute: String,
    pub value_type: ValueType,
    /// Values equal to this literal are never written.
    pub omit_default: Option<Literal>,
}

/// Entry of a kind's property table. Relation-backed fields carry no
/// translation; their category lives in the relation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldMapping {
    Attribute(PropertySpec),
    Relation,
}

// ============================================================================
// Relation kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSpec {
    pub relation: String,
    pub owner_role: String,
    pub pointed_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectedRoles {
    pub relation: String,
    pub source_role: String,
    pub target_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRole {
    pub field: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerSpec {
    /// Source/target relation named by the object's subtype field.
    Directed {
        subtype_field: String,
        source_field: String,
        target_field: String,
        subtypes: IndexMap<String, DirectedRoles>,
    },
    /// One relation type with a role per referencing field.
    MultiRole { relation: String, roles: Vec<PeerRole> },
}

impl PeerSpec {
    /// Fields consumed as role players.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            PeerSpec::Directed { source_field, target_field, .. } => {
                vec![source_field.as_str(), target_field.as_str()]
            }
            PeerSpec::MultiRole { roles, .. } => roles.iter().map(|r| r.field.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueSpec {
    pub relation: String,
    pub owner_role: String,
    pub entry_role: String,
    pub entry_type: String,
    pub key_attribute: String,
    pub value_attribute: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubObjectSpec {
    pub relation: String,
    pub owner_role: String,
    pub element_role: String,
    pub element_type: String,
    /// Property table of the element.
    pub element_kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    /// Extension key → its sub-object layout.
    pub extensions: IndexMap<String, SubObjectSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashSpec {
    pub relation: String,
    pub owner_role: String,
    pub hash_role: String,
    pub value_attribute: String,
    /// Algorithm name → hash entity type.
    pub algorithms: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranularSpec {
    pub relation: String,
    pub marked_role: String,
    pub marking_role: String,
    pub target_role: String,
    pub lang_attribute: String,
}

/// Categorization of a relation-backed field, with the per-kind layout
/// carried as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationKind {
    EmbeddedReference(EmbeddedSpec),
    TypedPeerRelation(PeerSpec),
    KeyValueStore(KeyValueSpec),
    ListOfSubObjects(SubObjectSpec),
    ExtensionObject(ExtensionSpec),
    HashSet(HashSpec),
    GranularMarking(GranularSpec),
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::EmbeddedReference(_) => "embedded-reference",
            RelationKind::TypedPeerRelation(_) => "typed-peer-relation",
            RelationKind::KeyValueStore(_) => "key-value-store",
            RelationKind::ListOfSubObjects(_) => "list-of-sub-objects",
            RelationKind::ExtensionObject(_) => "extension-object",
            RelationKind::HashSet(_) => "hash-set",
            RelationKind::GranularMarking(_) => "granular-marking",
        }
    }

    /// Store relation types this kind writes.
    pub fn relation_types(&self) -> Vec<&str> {
        match self {
            RelationKind::EmbeddedReference(s) => vec![&s.relation],
            RelationKind::TypedPeerRelation(PeerSpec::Directed { subtypes, .. }) => {
                subtypes.values().map(|r| r.relation.as_str()).collect()
            }
            RelationKind::TypedPeerRelation(PeerSpec::MultiRole { relation, .. }) => vec![relation],
            RelationKind::KeyValueStore(s) => vec![&s.relation],
            RelationKind::ListOfSubObjects(s) => vec![&s.relation],
            RelationKind::ExtensionObject(s) => s.extensions.values().map(|e| e.relation.as_str()).collect(),
            RelationKind::HashSet(s) => vec![&s.relation],
            RelationKind::GranularMarking(s) => vec![&s.relation],
        }
    }
}

/// Reverse-index entry: which field a store relation type decodes into.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEntry {
    pub field: String,
    pub kind: RelationKind,
}

// ============================================================================
// MappingTable
// ============================================================================

/// The merged, immutable set of translation tables for one configuration.
#[derive(Debug, Clone)]
pub struct MappingTable {
    domains: Vec<String>,
    kinds: IndexMap<String, IndexMap<String, FieldMapping>>,
    attribute_fields: HashMap<String, HashMap<String, String>>,
    relations: IndexMap<String, RelationKind>,
    relation_index: HashMap<String, RelationEntry>,
    multi_valued: HashSet<String>,
    dispatch: IndexMap<String, Dispatch>,
    store_classes: HashMap<String, ObjectClass>,
    hierarchy: HashMap<String, String>,
}

impl MappingTable {
    /// Names of the merged domains, in merge order.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Property table entry of `field` on `kind`.
    pub fn field(&self, kind: &str, field: &str) -> Option<&FieldMapping> {
        self.kinds.get(kind).and_then(|fields| fields.get(field))
    }

    pub fn fields(&self, kind: &str) -> Option<&IndexMap<String, FieldMapping>> {
        self.kinds.get(kind)
    }

    /// Relation categorization of a relation-backed field.
    pub fn relation(&self, field: &str) -> Option<&RelationKind> {
        self.relations.get(field)
    }

    /// Decode-side lookup by store relation type.
    pub fn relation_by_type(&self, relation_type: &str) -> Option<&RelationEntry> {
        self.relation_index.get(relation_type)
    }

    pub fn is_multi_valued(&self, field: &str) -> bool {
        self.multi_valued.contains(field)
    }

    /// The field of `kind` stored in `attribute`.
    pub fn field_for_attribute(&self, kind: &str, attribute: &str) -> Option<&str> {
        self.attribute_fields
            .get(kind)
            .and_then(|m| m.get(attribute))
            .map(String::as_str)
    }

    pub fn dispatch(&self, stix_type: &str) -> Option<&Dispatch> {
        self.dispatch.get(stix_type)
    }

    /// The class an object lands in, honouring specializations in order.
    pub fn resolve_class(&self, object: &ImportableObject) -> Result<&ObjectClass> {
        let dispatch = self.dispatch.get(object.stix_type()).ok_or_else(|| Error::MissingMappingEntry {
            kind: object.stix_type().to_string(),
            field: crate::model::TYPE_FIELD.to_string(),
        })?;
        let class = dispatch
            .specializations
            .iter()
            .find(|s| object.get(&s.field) == Some(&s.equals))
            .map(|s| &s.class)
            .unwrap_or(&dispatch.class);
        Ok(class)
    }

    /// Reverse dispatch from a concrete store type.
    pub fn class_for_store_type(&self, store_type: &str) -> Option<&ObjectClass> {
        self.store_classes.get(store_type)
    }

    /// Store type → supertype, for backends that resolve `isa` by inheritance.
    pub fn type_hierarchy(&self) -> &HashMap<String, String> {
        &self.hierarchy
    }

    /// Build the final table from a merged domain table.
    pub(crate) fn finalize(domains: Vec<String>, merged: DomainTable) -> Result<Self> {
        let DomainTable {
            kinds,
            mut relations,
            multi_valued,
            dispatch: classes,
            specializations,
            relationship_subtypes,
            extensions,
            ..
        } = merged;

        let inject = |kind: &mut RelationKind| match kind {
            RelationKind::TypedPeerRelation(peer) => inject_subtypes(peer, &relationship_subtypes),
            RelationKind::ExtensionObject(spec) => spec.extensions = extensions.clone(),
            _ => {}
        };
        relations.values_mut().for_each(inject);

        // (d) dispatch with specializations attached to their base class
        let mut dispatch: IndexMap<String, Dispatch> = IndexMap::new();
        for (stix_type, mut class) in classes {
            if let Some(peer) = class.peer.as_mut() {
                inject_subtypes(peer, &relationship_subtypes);
            }
            dispatch.insert(stix_type, Dispatch { class, specializations: Vec::new() });
        }
        for (stix_type, specs) in specializations {
            let entry = dispatch.get_mut(&stix_type).ok_or_else(|| Error::MissingMappingEntry {
                kind: stix_type.clone(),
                field: crate::model::TYPE_FIELD.to_string(),
            })?;
            entry.specializations.extend(specs);
        }

        // reverse indexes
        let mut store_classes = HashMap::new();
        let mut hierarchy = HashMap::new();
        for entry in dispatch.values() {
            let classes = std::iter::once(&entry.class).chain(entry.specializations.iter().map(|s| &s.class));
            for class in classes {
                store_classes.insert(class.store_type.clone(), class.clone());
                if let Some(parent) = &class.supertype {
                    hierarchy.insert(class.store_type.clone(), parent.clone());
                }
                if let Some(PeerSpec::Directed { subtypes, .. }) = &class.peer {
                    for roles in subtypes.values() {
                        store_classes.insert(roles.relation.clone(), class.clone());
                        hierarchy.insert(roles.relation.clone(), class.store_type.clone());
                    }
                }
            }
        }

        let mut relation_index: HashMap<String, RelationEntry> = HashMap::new();
        for (field, kind) in &relations {
            for relation_type in kind.relation_types() {
                match relation_index.get(relation_type) {
                    Some(existing) if existing.kind == *kind && shares_relation(&existing.field, field, kind) => {}
                    Some(existing) => {
                        return Err(Error::MappingConflict {
                            domain: domains.join("+"),
                            key: format!(
                                "relation type '{relation_type}' used by both '{}' and '{field}'",
                                existing.field
                            ),
                        });
                    }
                    None => {
                        relation_index.insert(
                            relation_type.to_string(),
                            RelationEntry { field: field.clone(), kind: kind.clone() },
                        );
                    }
                }
            }
        }

        let attribute_fields = kinds
            .iter()
            .map(|(kind, fields)| {
                let reverse = fields
                    .iter()
                    .filter_map(|(field, mapping)| match mapping {
                        FieldMapping::Attribute(spec) => Some((spec.attribute.clone(), field.clone())),
                        FieldMapping::Relation => None,
                    })
                    .collect();
                (kind.clone(), reverse)
            })
            .collect();

        Ok(Self {
            domains,
            kinds,
            attribute_fields,
            relations,
            relation_index,
            multi_valued: multi_valued.into_iter().collect(),
            dispatch,
            store_classes,
            hierarchy,
        })
    }
}

/// Peer relations are reachable from every role field; other relation types
/// must decode into exactly one field.
fn shares_relation(existing: &str, field: &str, kind: &RelationKind) -> bool {
    existing == field || matches!(kind, RelationKind::TypedPeerRelation(_))
}

fn inject_subtypes(peer: &mut PeerSpec, all: &IndexMap<String, DirectedRoles>) {
    if let PeerSpec::Directed { subtypes, .. } = peer {
        *subtypes = all.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImportConfiguration;
    use serde_json::json;

    fn table() -> std::sync::Arc<MappingTable> {
        Registry::global().mappings(&ImportConfiguration::default()).unwrap()
    }

    #[test]
    fn test_reverse_attribute_lookup() {
        let t = table();
        assert_eq!(t.field_for_attribute("indicator", "pattern"), Some("pattern"));
        assert_eq!(t.field_for_attribute("attack-pattern", "stix-id"), None);
    }

    #[test]
    fn test_relationship_subtypes_resolve_to_relationship_class() {
        let t = table();
        let class = t.class_for_store_type("uses").unwrap();
        assert_eq!(class.stix_type, "relationship");
        assert_eq!(t.type_hierarchy().get("uses").map(String::as_str), Some("stix-core-relationship"));
    }

    #[test]
    fn test_relation_index_covers_every_kind() {
        let t = table();
        assert_eq!(t.relation_by_type("created-by").unwrap().field, "created_by_ref");
        assert!(matches!(t.relation_by_type("kill-chain-usage").unwrap().kind, RelationKind::ListOfSubObjects(_)));
        assert!(matches!(t.relation_by_type("hashes").unwrap().kind, RelationKind::HashSet(_)));
        assert!(matches!(t.relation_by_type("granular-marking").unwrap().kind, RelationKind::GranularMarking(_)));
        assert!(matches!(t.relation_by_type("archive-extension").unwrap().kind, RelationKind::ExtensionObject(_)));
        assert!(matches!(t.relation_by_type("sighting").unwrap().kind, RelationKind::TypedPeerRelation(_)));
    }

    #[test]
    fn test_resolve_unknown_type() {
        let t = table();
        let obj = ImportableObject::try_from(json!({"type": "x-unknown", "id": "x-unknown--1"})).unwrap();
        assert!(matches!(t.resolve_class(&obj), Err(Error::MissingMappingEntry { .. })));
    }
}
