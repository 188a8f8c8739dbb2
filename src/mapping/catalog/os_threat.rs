//! Incident response: incidents with their core extension, and the task,
//! event and impact objects an incident links to.

use super::stix_core::common;
use super::{embedded, key_values, sub_object, sub_objects};
use crate::mapping::{DomainTable, ObjectCategory};
use crate::model::config::OS_THREAT_DOMAIN;
use crate::model::ImportConfiguration;

pub const INCIDENT_EXTENSION: &str = "extension-definition--ef765651-680c-498d-9894-99799f2fa126";
pub const TASK_EXTENSION: &str = "extension-definition--2074a052-8be4-4932-849e-f5e7798e0030";
pub const EVENT_EXTENSION: &str = "extension-definition--4ca6de00-5b0d-45ef-a1dc-ea7279ea910e";
pub const IMPACT_EXTENSION: &str = "extension-definition--7cc33dd6-f6a1-489b-98ea-522d351d71b9";

pub fn domain(_config: &ImportConfiguration) -> DomainTable {
    let mut t = DomainTable::new(OS_THREAT_DOMAIN);

    common(t.object("incident", "incident", ObjectCategory::Sdo))
        .texts(&["name", "description"])
        .relations(&["kill_chain_phases"]);
    t.kind("incident-ext")
        .texts(&[
            "extension_type",
            "investigation_status",
            "determination",
            "detection_methods",
            "incident_types",
            "recoverability",
        ])
        .long("criticality", "criticality")
        .relations(&["impacted_entity_counts", "scores", "task_refs", "event_refs", "impact_refs"]);
    t.kind("incident-score")
        .texts(&["name", "description"])
        .double("value", "score-value");

    common(t.object("task", "task", ObjectCategory::Sdo))
        .texts(&["name", "description", "task_types", "outcome"])
        .long("priority", "priority")
        .timestamps(&["start", "end"]);
    common(t.object("event", "event", ObjectCategory::Sdo))
        .texts(&["name", "description", "event_types", "status", "goal"])
        .timestamps(&["start", "end"])
        .relations(&["sighting_refs"]);
    common(t.object("impact", "impact", ObjectCategory::Sdo))
        .texts(&["description", "impact_category", "recoverability"])
        .long("criticality", "criticality")
        .timestamps(&["start", "end"])
        .relations(&["impacted_refs", "superseded_by_ref"]);
    // new object types announce themselves through an extension marker
    t.kind("new-sdo-ext").texts(&["extension_type"]);

    t.extension(INCIDENT_EXTENSION, sub_object("incident-extension", "incident", "incident-core", "incident-ext"));
    for (name, relation) in [
        (TASK_EXTENSION, "task-extension"),
        (EVENT_EXTENSION, "event-extension"),
        (IMPACT_EXTENSION, "impact-extension"),
    ] {
        t.extension(name, sub_object(relation, "extended", "definition", "new-sdo-ext"));
    }

    t.relation("task_refs", embedded("incident-task", "incident", "task"))
        .relation("event_refs", embedded("incident-event", "incident", "event"))
        .relation("impact_refs", embedded("incident-impact", "incident", "impact"))
        .relation("sighting_refs", embedded("event-sighting", "event", "sighting"))
        .relation("impacted_refs", embedded("impacted", "impact", "impacted"))
        .relation("superseded_by_ref", embedded("superseded-by", "superseded", "superseding"))
        .relation("scores", sub_objects("incident-scores", "incident", "score", "incident-score"))
        .relation(
            "impacted_entity_counts",
            key_values("impacted-entity-counts", "incident", "count", "entity-count"),
        );

    t.multi(&[
        "detection_methods",
        "incident_types",
        "task_types",
        "event_types",
        "scores",
        "task_refs",
        "event_refs",
        "impact_refs",
        "sighting_refs",
        "impacted_refs",
    ]);

    t
}
