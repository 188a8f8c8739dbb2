//! MITRE ATT&CK: technique specialization of attack patterns, the
//! `x-mitre-*` object types and their `x_mitre_*` properties.

use serde_json::json;

use super::embedded;
use super::stix_core::common;
use super::sub_objects;
use crate::mapping::{DomainTable, KindBuilder, ObjectCategory};
use crate::model::config::ATTACK_DOMAIN;
use crate::model::{AttackMatrix, ImportConfiguration};

/// Properties ATT&CK adds to every object it publishes.
fn mitre(kind: KindBuilder<'_>) -> KindBuilder<'_> {
    kind.texts(&["x_mitre_version", "x_mitre_attack_spec_version", "x_mitre_domains", "x_mitre_contributors"])
        .timestamp("x_mitre_modified", "x-mitre-modified")
        .flag("x_mitre_deprecated", "x-mitre-deprecated")
        .relations(&["x_mitre_modified_by_ref"])
}

fn mitre_object<'d>(t: &'d mut DomainTable, stix_type: &str, store_type: &str) -> KindBuilder<'d> {
    mitre(common(t.object(stix_type, store_type, ObjectCategory::Sdo))).texts(&["name", "description"])
}

pub fn domain(config: &ImportConfiguration) -> DomainTable {
    let mut t = DomainTable::new(ATTACK_DOMAIN);
    let matrix = config.attack.unwrap_or(AttackMatrix::Enterprise);

    // ------------------------------------------------------------------
    // Extensions of core kinds
    // ------------------------------------------------------------------

    mitre(t.kind("attack-pattern"))
        .texts(&[
            "x_mitre_platforms",
            "x_mitre_detection",
            "x_mitre_data_sources",
            "x_mitre_permissions_required",
            "x_mitre_effective_permissions",
            "x_mitre_defense_bypassed",
            "x_mitre_system_requirements",
            "x_mitre_impact_type",
        ])
        .boolean("x_mitre_is_subtechnique", "x-mitre-is-subtechnique")
        .boolean("x_mitre_remote_support", "x-mitre-remote-support")
        .boolean("x_mitre_network_requirements", "x-mitre-network-requirements");
    if matrix == AttackMatrix::Mobile {
        t.kind("attack-pattern").texts(&["x_mitre_tactic_type"]);
    }
    for kind in ["malware", "tool"] {
        mitre(t.kind(kind)).texts(&["x_mitre_platforms", "x_mitre_aliases"]);
    }
    mitre(t.kind("intrusion-set"));
    mitre(t.kind("course-of-action"));
    mitre(t.kind("identity"));
    mitre(t.kind("relationship"));
    mitre(t.kind("campaign")).texts(&["x_mitre_first_seen_citation", "x_mitre_last_seen_citation"]);
    t.kind("marking-definition")
        .texts(&["x_mitre_attack_spec_version", "x_mitre_domains"])
        .relations(&["x_mitre_modified_by_ref"]);

    // x_mitre_is_subtechnique picks the concrete store type
    t.specialize(
        "attack-pattern",
        "x_mitre_is_subtechnique",
        json!(true),
        "sub-technique",
        "attack-pattern",
        ObjectCategory::Sdo,
    )
    .specialize(
        "attack-pattern",
        "x_mitre_is_subtechnique",
        json!(false),
        "technique",
        "attack-pattern",
        ObjectCategory::Sdo,
    );

    // ------------------------------------------------------------------
    // ATT&CK object types
    // ------------------------------------------------------------------

    mitre_object(&mut t, "x-mitre-tactic", "tactic").texts(&["x_mitre_shortname"]);
    mitre_object(&mut t, "x-mitre-matrix", "matrix").relations(&["tactic_refs"]);
    mitre_object(&mut t, "x-mitre-collection", "collection").relations(&["x_mitre_contents"]);
    t.kind("object-version")
        .timestamp("object_modified", "object-modified")
        .relations(&["object_ref"]);
    mitre_object(&mut t, "x-mitre-data-source", "data-source")
        .texts(&["x_mitre_platforms", "x_mitre_collection_layers"]);
    mitre_object(&mut t, "x-mitre-data-component", "data-component").relations(&["x_mitre_data_source_ref"]);
    if matrix == AttackMatrix::Ics {
        mitre_object(&mut t, "x-mitre-asset", "asset")
            .texts(&["x_mitre_sectors", "x_mitre_platforms"])
            .relations(&["x_mitre_related_assets"]);
        t.kind("related-asset").texts(&["name", "description", "related_asset_sectors"]);
    }

    t.subtype("subtechnique-of", "subtechnique-of", "sub-technique", "parent-technique")
        .subtype("detects", "detects", "detecting", "detected")
        .subtype("revoked-by", "revoked-by", "revoked", "revoking");

    // ------------------------------------------------------------------
    // Relation-backed fields
    // ------------------------------------------------------------------

    t.relation("x_mitre_modified_by_ref", embedded("modified-by", "modified", "modifier"))
        .relation("tactic_refs", embedded("tactic-order", "matrix", "tactic"))
        .relation("object_ref", embedded("versioned-object", "version", "object"))
        .relation("x_mitre_data_source_ref", embedded("data-source-of", "component", "source"))
        .relation(
            "x_mitre_contents",
            sub_objects("collection-contents", "collection", "content", "object-version"),
        );
    if matrix == AttackMatrix::Ics {
        t.relation(
            "x_mitre_related_assets",
            sub_objects("related-assets", "asset", "related", "related-asset"),
        );
    }

    t.multi(&[
        "x_mitre_domains",
        "x_mitre_contributors",
        "x_mitre_platforms",
        "x_mitre_data_sources",
        "x_mitre_permissions_required",
        "x_mitre_effective_permissions",
        "x_mitre_defense_bypassed",
        "x_mitre_system_requirements",
        "x_mitre_impact_type",
        "x_mitre_tactic_type",
        "x_mitre_aliases",
        "x_mitre_collection_layers",
        "x_mitre_sectors",
        "x_mitre_related_assets",
        "related_asset_sectors",
        "tactic_refs",
        "x_mitre_contents",
    ]);

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImportableObject;
    use crate::Registry;

    #[test]
    fn test_subtechnique_specialization() {
        let config = ImportConfiguration::core_only().with_attack(AttackMatrix::Enterprise);
        let table = Registry::global().mappings(&config).unwrap();
        let sub = ImportableObject::try_from(json!({
            "type": "attack-pattern",
            "id": "attack-pattern--1",
            "x_mitre_is_subtechnique": true
        }))
        .unwrap();
        let plain = ImportableObject::try_from(json!({"type": "attack-pattern", "id": "attack-pattern--2"})).unwrap();
        assert_eq!(table.resolve_class(&sub).unwrap().store_type, "sub-technique");
        assert_eq!(table.resolve_class(&plain).unwrap().store_type, "attack-pattern");
        assert_eq!(table.type_hierarchy().get("technique").map(String::as_str), Some("attack-pattern"));
    }

    #[test]
    fn test_asset_only_for_ics() {
        let enterprise = domain(&ImportConfiguration::default().with_attack(AttackMatrix::Enterprise));
        let ics = domain(&ImportConfiguration::default().with_attack(AttackMatrix::Ics));
        assert!(!enterprise.dispatch.contains_key("x-mitre-asset"));
        assert!(ics.dispatch.contains_key("x-mitre-asset"));
    }
}
