//! Builtin domains.
//!
//! Representative tables for the core object model, cyber observables,
//! MITRE ATT&CK and the incident-response domain. Extra domains are added
//! at runtime through `Registry::register`.

pub mod stix_core;
pub mod observables;
pub mod attack;
pub mod os_threat;

use std::sync::Arc;

use indexmap::IndexMap;

use super::registry::DomainBuilder;
use super::{
    EmbeddedSpec, GranularSpec, HashSpec, KeyValueSpec, RelationKind, SubObjectSpec,
};
use crate::model::config::{ATTACK_DOMAIN, CORE_DOMAIN, OBSERVABLES_DOMAIN, OS_THREAT_DOMAIN};

/// Every builtin domain with its builder.
pub fn builtin() -> Vec<(&'static str, DomainBuilder)> {
    vec![
        (CORE_DOMAIN, Arc::new(stix_core::domain) as DomainBuilder),
        (OBSERVABLES_DOMAIN, Arc::new(observables::domain) as DomainBuilder),
        (ATTACK_DOMAIN, Arc::new(attack::domain) as DomainBuilder),
        (OS_THREAT_DOMAIN, Arc::new(os_threat::domain) as DomainBuilder),
    ]
}

// ============================================================================
// Shorthands shared by the domain tables
// ============================================================================

pub(crate) fn embedded(relation: &str, owner_role: &str, pointed_role: &str) -> RelationKind {
    RelationKind::EmbeddedReference(EmbeddedSpec {
        relation: relation.to_string(),
        owner_role: owner_role.to_string(),
        pointed_role: pointed_role.to_string(),
    })
}

pub(crate) fn sub_object(relation: &str, owner_role: &str, element_role: &str, element_type: &str) -> SubObjectSpec {
    SubObjectSpec {
        relation: relation.to_string(),
        owner_role: owner_role.to_string(),
        element_role: element_role.to_string(),
        element_type: element_type.to_string(),
        element_kind: element_type.to_string(),
    }
}

pub(crate) fn sub_objects(relation: &str, owner_role: &str, element_role: &str, element_type: &str) -> RelationKind {
    RelationKind::ListOfSubObjects(sub_object(relation, owner_role, element_role, element_type))
}

pub(crate) fn key_values(relation: &str, owner_role: &str, entry_role: &str, entry_type: &str) -> RelationKind {
    RelationKind::KeyValueStore(KeyValueSpec {
        relation: relation.to_string(),
        owner_role: owner_role.to_string(),
        entry_role: entry_role.to_string(),
        entry_type: entry_type.to_string(),
        key_attribute: "key-name".to_string(),
        value_attribute: "key-value".to_string(),
    })
}

/// Hash algorithm name → hash entity type.
pub(crate) fn hashes() -> RelationKind {
    let algorithms: IndexMap<String, String> = [
        ("MD5", "md5"),
        ("SHA-1", "sha-1"),
        ("SHA-256", "sha-256"),
        ("SHA-512", "sha-512"),
        ("SHA3-256", "sha3-256"),
        ("SHA3-512", "sha3-512"),
        ("SSDEEP", "ssdeep"),
        ("TLSH", "tlsh"),
    ]
    .into_iter()
    .map(|(a, t)| (a.to_string(), t.to_string()))
    .collect();
    RelationKind::HashSet(HashSpec {
        relation: "hashes".to_string(),
        owner_role: "owner".to_string(),
        hash_role: "pointed-hash".to_string(),
        value_attribute: "hash-value".to_string(),
        algorithms,
    })
}

pub(crate) fn granular_markings() -> RelationKind {
    RelationKind::GranularMarking(GranularSpec {
        relation: "granular-marking".to_string(),
        marked_role: "marked".to_string(),
        marking_role: "marking".to_string(),
        target_role: "marked-property".to_string(),
        lang_attribute: "lang".to_string(),
    })
}
