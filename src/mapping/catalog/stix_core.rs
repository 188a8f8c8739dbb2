//! STIX 2.1 core: domain, relationship and meta objects, plus the
//! sub-objects they share.

use indexmap::IndexMap;

use super::{embedded, granular_markings, hashes, key_values, sub_objects};
use crate::mapping::{
    DomainTable, ExtensionSpec, KindBuilder, ObjectCategory, PeerRole, PeerSpec, RelationKind,
};
use crate::model::config::CORE_DOMAIN;
use crate::model::ImportConfiguration;

/// Store type of the directed relationship object; every subtype relation inherits from it.
pub const RELATIONSHIP_TYPE: &str = "stix-core-relationship";

/// Properties every domain, relationship and meta object carries.
pub(crate) fn common(kind: KindBuilder<'_>) -> KindBuilder<'_> {
    kind.text("spec_version", "spec-version")
        .timestamps(&["created", "modified"])
        .flag("revoked", "revoked")
        .texts(&["labels", "lang"])
        .long("confidence", "confidence")
        .relations(&[
            "created_by_ref",
            "object_marking_refs",
            "external_references",
            "granular_markings",
            "extensions",
        ])
}

fn sdo<'d>(t: &'d mut DomainTable, stix_type: &str) -> KindBuilder<'d> {
    common(t.object(stix_type, stix_type, ObjectCategory::Sdo)).texts(&["name", "description"])
}

/// (subtype, source role, target role)
const RELATIONSHIP_SUBTYPES: &[(&str, &str, &str)] = &[
    ("analysis-of", "analysis", "analysed"),
    ("attributed-to", "attributing", "attributed"),
    ("authored-by", "authored", "author"),
    ("based-on", "based", "basis"),
    ("beacons-to", "beaconing", "beaconed"),
    ("characterizes", "characterizer", "characterized"),
    ("communicates-with", "communicating", "communicated"),
    ("compromises", "compromising", "compromised"),
    ("consists-of", "consisting", "consisted"),
    ("controls", "controlling", "controlled"),
    ("delivers", "delivering", "delivered"),
    ("derived-from", "deriving", "derived"),
    ("downloads", "downloading", "downloaded"),
    ("drops", "dropping", "dropped"),
    ("duplicate-of", "duplicating", "duplicated"),
    ("exfiltrates-to", "exfiltrating", "exfiltrated"),
    ("exploits", "exploiting", "exploited"),
    ("hosts", "hosting", "hosted"),
    ("impersonates", "impersonating", "impersonated"),
    ("indicates", "indicating", "indicated"),
    ("investigates", "investigating", "investigated"),
    ("located-at", "locating", "located"),
    ("mitigates", "mitigating", "mitigated"),
    ("originates-from", "originating", "originated"),
    ("owns", "owning", "owned"),
    ("related-to", "relating", "related"),
    ("remediates", "remediating", "remediated"),
    ("targets", "targeting", "targeted"),
    ("uses", "user", "used"),
    ("variant-of", "variant", "variant-source"),
];

pub fn domain(_config: &ImportConfiguration) -> DomainTable {
    let mut t = DomainTable::new(CORE_DOMAIN);

    // ------------------------------------------------------------------
    // Domain objects
    // ------------------------------------------------------------------

    sdo(&mut t, "attack-pattern").texts(&["aliases"]).relations(&["kill_chain_phases"]);
    sdo(&mut t, "campaign")
        .texts(&["aliases", "objective"])
        .timestamps(&["first_seen", "last_seen"]);
    sdo(&mut t, "course-of-action");
    sdo(&mut t, "grouping").texts(&["context"]).relations(&["object_refs"]);
    sdo(&mut t, "identity").texts(&["roles", "identity_class", "sectors", "contact_information"]);
    sdo(&mut t, "indicator")
        .texts(&["indicator_types", "pattern", "pattern_type", "pattern_version"])
        .timestamps(&["valid_from", "valid_until"])
        .relations(&["kill_chain_phases"]);
    sdo(&mut t, "infrastructure")
        .texts(&["infrastructure_types", "aliases"])
        .timestamps(&["first_seen", "last_seen"])
        .relations(&["kill_chain_phases"]);
    sdo(&mut t, "intrusion-set")
        .texts(&["aliases", "goals", "resource_level", "primary_motivation", "secondary_motivations"])
        .timestamps(&["first_seen", "last_seen"]);
    sdo(&mut t, "location")
        .double("latitude", "latitude")
        .double("longitude", "longitude")
        .double("precision", "precision")
        .texts(&["region", "country", "administrative_area", "city", "street_address", "postal_code"]);
    sdo(&mut t, "malware")
        .texts(&[
            "malware_types",
            "aliases",
            "architecture_execution_envs",
            "implementation_languages",
            "capabilities",
        ])
        .boolean("is_family", "is-family")
        .timestamps(&["first_seen", "last_seen"])
        .relations(&["kill_chain_phases", "operating_system_refs", "sample_refs"]);
    common(t.object("note", "note", ObjectCategory::Sdo))
        .texts(&["abstract", "content", "authors"])
        .relations(&["object_refs"]);
    common(t.object("observed-data", "observed-data", ObjectCategory::Sdo))
        .timestamps(&["first_observed", "last_observed"])
        .long("number_observed", "number-observed")
        .relations(&["object_refs"]);
    common(t.object("opinion", "opinion", ObjectCategory::Sdo))
        .texts(&["explanation", "authors", "opinion"])
        .relations(&["object_refs"]);
    sdo(&mut t, "report")
        .texts(&["report_types"])
        .timestamp("published", "published")
        .relations(&["object_refs"]);
    sdo(&mut t, "threat-actor")
        .texts(&[
            "threat_actor_types",
            "aliases",
            "roles",
            "goals",
            "sophistication",
            "resource_level",
            "primary_motivation",
            "secondary_motivations",
            "personal_motivations",
        ])
        .timestamps(&["first_seen", "last_seen"]);
    sdo(&mut t, "tool")
        .texts(&["tool_types", "aliases", "tool_version"])
        .relations(&["kill_chain_phases"]);
    sdo(&mut t, "vulnerability");

    // ------------------------------------------------------------------
    // Relationship objects
    // ------------------------------------------------------------------

    let directed = PeerSpec::Directed {
        subtype_field: "relationship_type".to_string(),
        source_field: "source_ref".to_string(),
        target_field: "target_ref".to_string(),
        subtypes: IndexMap::new(),
    };
    common(t.peer_object("relationship", RELATIONSHIP_TYPE, directed.clone()))
        .texts(&["description"])
        .timestamps(&["start_time", "stop_time"])
        .relations(&["relationship_type", "source_ref", "target_ref"]);
    for field in ["relationship_type", "source_ref", "target_ref"] {
        t.relation(field, RelationKind::TypedPeerRelation(directed.clone()));
    }
    for (name, source, target) in RELATIONSHIP_SUBTYPES {
        t.subtype(name, name, source, target);
    }

    let sighting = PeerSpec::MultiRole {
        relation: "sighting".to_string(),
        roles: [
            ("sighting_of_ref", "sighting-of"),
            ("observed_data_refs", "observed"),
            ("where_sighted_refs", "where-sighted"),
        ]
        .into_iter()
        .map(|(field, role)| PeerRole { field: field.to_string(), role: role.to_string() })
        .collect(),
    };
    common(t.peer_object("sighting", "sighting", sighting.clone()))
        .texts(&["description"])
        .timestamps(&["first_seen", "last_seen"])
        .long("count", "count")
        .flag("summary", "summary")
        .relations(&["sighting_of_ref", "observed_data_refs", "where_sighted_refs"]);
    for field in sighting.fields() {
        t.relation(field, RelationKind::TypedPeerRelation(sighting.clone()));
    }

    // ------------------------------------------------------------------
    // Meta objects
    // ------------------------------------------------------------------

    t.object("marking-definition", "marking-definition", ObjectCategory::Meta)
        .text("spec_version", "spec-version")
        .timestamp("created", "created")
        .texts(&["name", "definition_type"])
        .relations(&[
            "definition",
            "created_by_ref",
            "object_marking_refs",
            "external_references",
            "granular_markings",
            "extensions",
        ]);

    // ------------------------------------------------------------------
    // Sub-objects
    // ------------------------------------------------------------------

    t.kind("kill-chain-phase").texts(&["kill_chain_name", "phase_name"]);
    t.kind("external-reference")
        .texts(&["source_name", "description", "url", "external_id"])
        .relations(&["hashes"]);

    // ------------------------------------------------------------------
    // Relation-backed fields
    // ------------------------------------------------------------------

    t.relation("created_by_ref", embedded("created-by", "created", "creator"))
        .relation("object_marking_refs", embedded("object-marking", "marked", "marking"))
        .relation("object_refs", embedded("obj-refs", "object", "referred"))
        .relation("sample_refs", embedded("sample", "malware", "sample"))
        .relation("operating_system_refs", embedded("operating-system", "malware", "os"))
        .relation(
            "external_references",
            sub_objects("external-referencing", "referencing", "referenced", "external-reference"),
        )
        .relation(
            "kill_chain_phases",
            sub_objects("kill-chain-usage", "kill-chain-using", "kill-chain-used", "kill-chain-phase"),
        )
        .relation("definition", key_values("marking", "marking", "pointed-kvp", "marking-entry"))
        .relation("hashes", hashes())
        .relation("granular_markings", granular_markings())
        .relation("extensions", RelationKind::ExtensionObject(ExtensionSpec::default()));

    t.multi(&[
        "labels",
        "aliases",
        "roles",
        "sectors",
        "goals",
        "secondary_motivations",
        "personal_motivations",
        "malware_types",
        "tool_types",
        "indicator_types",
        "infrastructure_types",
        "report_types",
        "threat_actor_types",
        "architecture_execution_envs",
        "implementation_languages",
        "capabilities",
        "authors",
        "kill_chain_phases",
        "external_references",
        "granular_markings",
        "object_marking_refs",
        "object_refs",
        "sample_refs",
        "operating_system_refs",
        "observed_data_refs",
        "where_sighted_refs",
    ]);

    t
}
