//! DomainTable: the sub-tables one domain contributes, and their merge.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::debug;

use super::{
    DirectedRoles, FieldMapping, ObjectCategory, ObjectClass, PeerSpec, PropertySpec, RelationKind,
    Specialization, SubObjectSpec,
};
use crate::model::MergePolicy;
use crate::query::{Literal, ValueType};
use crate::{Error, Result};

/// Mapping tables registered by a single domain.
///
/// Built with the `object` / `kind` / `relation` helpers and merged into the
/// accumulated table of earlier domains by `merge`.
#[derive(Debug, Clone, Default)]
pub struct DomainTable {
    pub name: String,
    /// (a) kind → field → mapping
    pub kinds: IndexMap<String, IndexMap<String, FieldMapping>>,
    /// (b) field → relation kind
    pub relations: IndexMap<String, RelationKind>,
    /// (c) multi-valued fields
    pub multi_valued: IndexSet<String>,
    /// (d) stix type → base class
    pub dispatch: IndexMap<String, ObjectClass>,
    /// stix type → specializations, attached to the base class at finalize
    pub specializations: IndexMap<String, Vec<Specialization>>,
    /// Subtypes of the directed peer relation, shared by every domain.
    pub relationship_subtypes: IndexMap<String, DirectedRoles>,
    /// Extension name → sub-object layout, shared by every domain.
    pub extensions: IndexMap<String, SubObjectSpec>,
}

impl DomainTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Property table builder for `kind` (created on first use).
    pub fn kind(&mut self, kind: &str) -> KindBuilder<'_> {
        self.kinds.entry(kind.to_string()).or_default();
        KindBuilder { table: self, kind: kind.to_string() }
    }

    /// Register a top-level object type and open its property table.
    pub fn object(&mut self, stix_type: &str, store_type: &str, category: ObjectCategory) -> KindBuilder<'_> {
        let class = ObjectClass {
            stix_type: stix_type.to_string(),
            store_type: store_type.to_string(),
            category,
            kind: stix_type.to_string(),
            supertype: Some(category.root_type().to_string()),
            peer: None,
        };
        self.dispatch.insert(stix_type.to_string(), class);
        self.kind(stix_type)
    }

    /// Register a relationship-object type whose instances relate peers.
    pub fn peer_object(&mut self, stix_type: &str, store_type: &str, peer: PeerSpec) -> KindBuilder<'_> {
        let class = ObjectClass {
            stix_type: stix_type.to_string(),
            store_type: store_type.to_string(),
            category: ObjectCategory::Sro,
            kind: stix_type.to_string(),
            supertype: Some(ObjectCategory::Sro.root_type().to_string()),
            peer: Some(peer),
        };
        self.dispatch.insert(stix_type.to_string(), class);
        self.kind(stix_type)
    }

    /// Route objects of `stix_type` whose `field` equals `equals` to `store_type`,
    /// a subtype of `supertype`. The property table stays that of `stix_type`.
    pub fn specialize(
        &mut self,
        stix_type: &str,
        field: &str,
        equals: Value,
        store_type: &str,
        supertype: &str,
        category: ObjectCategory,
    ) -> &mut Self {
        let class = ObjectClass {
            stix_type: stix_type.to_string(),
            store_type: store_type.to_string(),
            category,
            kind: stix_type.to_string(),
            supertype: Some(supertype.to_string()),
            peer: None,
        };
        self.specializations
            .entry(stix_type.to_string())
            .or_default()
            .push(Specialization { field: field.to_string(), equals, class });
        self
    }

    /// Categorize a relation-backed field.
    pub fn relation(&mut self, field: &str, kind: RelationKind) -> &mut Self {
        self.relations.insert(field.to_string(), kind);
        self
    }

    pub fn multi(&mut self, fields: &[&str]) -> &mut Self {
        self.multi_valued.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Declare a subtype of the directed peer relation.
    pub fn subtype(&mut self, name: &str, relation: &str, source_role: &str, target_role: &str) -> &mut Self {
        self.relationship_subtypes.insert(
            name.to_string(),
            DirectedRoles {
                relation: relation.to_string(),
                source_role: source_role.to_string(),
                target_role: target_role.to_string(),
            },
        );
        self
    }

    /// Declare a predefined extension and its sub-object layout.
    pub fn extension(&mut self, name: &str, spec: SubObjectSpec) -> &mut Self {
        self.extensions.insert(name.to_string(), spec);
        self
    }

    /// Merge `other` into `self`. Identical re-registrations are no-ops;
    /// differing ones follow `policy`.
    pub fn merge(&mut self, other: DomainTable, policy: MergePolicy) -> Result<()> {
        let domain = other.name.clone();
        for (kind, fields) in other.kinds {
            let target = self.kinds.entry(kind.clone()).or_default();
            for (field, mapping) in fields {
                merge_entry(target, field, mapping, policy, &domain, |f| format!("{kind}.{f}"))?;
            }
        }
        for (field, kind) in other.relations {
            merge_entry(&mut self.relations, field, kind, policy, &domain, |f| format!("relation '{f}'"))?;
        }
        for (stix_type, class) in other.dispatch {
            merge_entry(&mut self.dispatch, stix_type, class, policy, &domain, |t| format!("type '{t}'"))?;
        }
        for (name, roles) in other.relationship_subtypes {
            merge_entry(&mut self.relationship_subtypes, name, roles, policy, &domain, |n| {
                format!("relationship subtype '{n}'")
            })?;
        }
        for (name, spec) in other.extensions {
            merge_entry(&mut self.extensions, name, spec, policy, &domain, |n| format!("extension '{n}'"))?;
        }
        for (stix_type, specs) in other.specializations {
            let target = self.specializations.entry(stix_type).or_default();
            for spec in specs {
                if !target.contains(&spec) {
                    target.push(spec);
                }
            }
        }
        self.multi_valued.extend(other.multi_valued);
        if !self.name.is_empty() {
            self.name.push('+');
        }
        self.name.push_str(&domain);
        Ok(())
    }
}

fn merge_entry<V: PartialEq>(
    target: &mut IndexMap<String, V>,
    key: String,
    value: V,
    policy: MergePolicy,
    domain: &str,
    describe: impl Fn(&str) -> String,
) -> Result<()> {
    match target.get(&key) {
        Some(existing) if *existing == value => Ok(()),
        Some(_) if policy == MergePolicy::Strict => Err(Error::MappingConflict {
            domain: domain.to_string(),
            key: describe(&key),
        }),
        Some(_) => {
            debug!(domain, key = %describe(&key), "overriding earlier mapping");
            target.insert(key, value);
            Ok(())
        }
        None => {
            target.insert(key, value);
            Ok(())
        }
    }
}

/// `first_seen` → `first-seen`
pub fn store_name(field: &str) -> String {
    field.replace('_', "-")
}

// ============================================================================
// KindBuilder
// ============================================================================

/// Fluent builder over one kind's property table.
pub struct KindBuilder<'d> {
    table: &'d mut DomainTable,
    kind: String,
}

impl KindBuilder<'_> {
    fn put(self, field: &str, mapping: FieldMapping) -> Self {
        if let Some(fields) = self.table.kinds.get_mut(&self.kind) {
            fields.insert(field.to_string(), mapping);
        }
        self
    }

    fn scalar(self, field: &str, attribute: &str, value_type: ValueType) -> Self {
        self.put(
            field,
            FieldMapping::Attribute(PropertySpec {
                attribute: attribute.to_string(),
                value_type,
                omit_default: None,
            }),
        )
    }

    pub fn text(self, field: &str, attribute: &str) -> Self {
        self.scalar(field, attribute, ValueType::String)
    }

    /// Several string fields, each stored under its hyphenated name.
    pub fn texts(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self = self.scalar(field, &store_name(field), ValueType::String);
        }
        self
    }

    pub fn timestamps(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self = self.scalar(field, &store_name(field), ValueType::DateTime);
        }
        self
    }

    /// Several string fields stored under differently-named attributes.
    pub fn renamed(mut self, pairs: &[(&str, &str)]) -> Self {
        for (field, attribute) in pairs {
            self = self.scalar(field, attribute, ValueType::String);
        }
        self
    }

    pub fn long(self, field: &str, attribute: &str) -> Self {
        self.scalar(field, attribute, ValueType::Long)
    }

    pub fn double(self, field: &str, attribute: &str) -> Self {
        self.scalar(field, attribute, ValueType::Double)
    }

    pub fn boolean(self, field: &str, attribute: &str) -> Self {
        self.scalar(field, attribute, ValueType::Boolean)
    }

    /// Boolean that is only written when `true`.
    pub fn flag(self, field: &str, attribute: &str) -> Self {
        self.put(
            field,
            FieldMapping::Attribute(PropertySpec {
                attribute: attribute.to_string(),
                value_type: ValueType::Boolean,
                omit_default: Some(Literal::Bool(false)),
            }),
        )
    }

    pub fn timestamp(self, field: &str, attribute: &str) -> Self {
        self.scalar(field, attribute, ValueType::DateTime)
    }

    /// Fields backed by the relation table.
    pub fn relations(mut self, fields: &[&str]) -> Self {
        for field in fields {
            self = self.put(field, FieldMapping::Relation);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::EmbeddedSpec;

    fn embedded(relation: &str) -> RelationKind {
        RelationKind::EmbeddedReference(EmbeddedSpec {
            relation: relation.into(),
            owner_role: "owner".into(),
            pointed_role: "pointed".into(),
        })
    }

    #[test]
    fn test_builder_fills_tables() {
        let mut t = DomainTable::new("d");
        t.object("tool", "tool", ObjectCategory::Sdo)
            .text("name", "name")
            .flag("revoked", "revoked")
            .relations(&["created_by_ref"]);
        t.relation("created_by_ref", embedded("created-by"));
        assert_eq!(t.dispatch["tool"].supertype.as_deref(), Some("stix-domain-object"));
        assert_eq!(t.kinds["tool"].len(), 3);
        assert_eq!(t.kinds["tool"]["created_by_ref"], FieldMapping::Relation);
    }

    #[test]
    fn test_identical_registration_is_noop() {
        let mut a = DomainTable::new("a");
        a.kind("tool").text("name", "name");
        let mut b = DomainTable::new("b");
        b.kind("tool").text("name", "name");
        a.merge(b, MergePolicy::Strict).unwrap();
        assert_eq!(a.kinds["tool"].len(), 1);
        assert_eq!(a.name, "a+b");
    }

    #[test]
    fn test_strict_conflict() {
        let mut a = DomainTable::new("a");
        a.relation("sample_ref", embedded("x"));
        let mut b = DomainTable::new("b");
        b.relation("sample_ref", embedded("y"));
        let err = a.merge(b, MergePolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::MappingConflict { ref domain, .. } if domain == "b"));
    }

    #[test]
    fn test_last_writer_wins() {
        let mut a = DomainTable::new("a");
        a.kind("tool").text("name", "name");
        let mut b = DomainTable::new("b");
        b.kind("tool").text("name", "tool-name");
        a.merge(b, MergePolicy::LastWriterWins).unwrap();
        let FieldMapping::Attribute(spec) = &a.kinds["tool"]["name"] else { panic!("not an attribute") };
        assert_eq!(spec.attribute, "tool-name");
    }
}
