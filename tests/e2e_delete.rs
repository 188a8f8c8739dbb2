//! Delete semantics: dependents first, per-id failures, orphan sweep.

mod common;

use common::*;
use cti_graph::{Error, ImportConfiguration, Importer, Status};
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// 1. Ordering
// ============================================================================

#[tokio::test]
async fn test_delete_dependents_before_dependencies() {
    let importer = importer();
    importer.add(vec![object(identity(IDENTITY, "ACME")), object(tool(TOOL, IDENTITY))]).await.unwrap();

    // submitted dependency-first; removal still starts with the tool
    let results = importer.delete(&[IDENTITY, TOOL]).await.unwrap();
    assert!(results.iter().all(|r| r.status == Status::Success), "{results:?}");
    assert_eq!(results[0].id, IDENTITY);

    assert_eq!(importer.backend().count_of_type("identity"), 0);
    assert_eq!(importer.backend().count_of_type("tool"), 0);
    assert_eq!(importer.backend().thing_count(), 0);
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let importer = importer();
    importer.add(vec![object(identity(IDENTITY, "ACME"))]).await.unwrap();
    importer.delete(&[IDENTITY]).await.unwrap();
    assert!(matches!(importer.get(IDENTITY).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_delete_nested_structures() {
    let importer = importer();
    let process_id = "process--f52a906a-0dfc-40bd-92f1-e7778ead38a9";
    importer
        .add(vec![
            object(json!({
                "type": "attack-pattern",
                "id": "attack-pattern--7e33a43e-e34b-40ec-89da-36c9bb2cacd5",
                "name": "Phishing",
                "kill_chain_phases": [{"kill_chain_name": "lockheed", "phase_name": "delivery"}]
            })),
            object(json!({
                "type": "process",
                "id": process_id,
                "pid": 42,
                "environment_variables": {"PATH": "/usr/bin"}
            })),
        ])
        .await
        .unwrap();

    let results = importer
        .delete(&["attack-pattern--7e33a43e-e34b-40ec-89da-36c9bb2cacd5", process_id])
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.status == Status::Success), "{results:?}");
    assert_eq!(importer.backend().count_of_type("kill-chain-phase"), 0);
    assert_eq!(importer.backend().count_of_type("environment-variable"), 0);
    assert_eq!(importer.backend().thing_count(), 0);
}

// ============================================================================
// 2. Per-id failures
// ============================================================================

#[tokio::test]
async fn test_delete_unknown_id_is_per_id_error() {
    let importer = importer();
    importer.add(vec![object(identity(IDENTITY, "ACME"))]).await.unwrap();
    let results = importer.delete(&[OTHER_IDENTITY, IDENTITY]).await.unwrap();

    let missing = result_of(&results, OTHER_IDENTITY);
    assert_eq!(missing.status, Status::Error);
    assert!(missing.error.as_deref().unwrap_or_default().contains("Not found"));
    assert_eq!(status_of(&results, IDENTITY), Status::Success);
}

#[tokio::test]
async fn test_failed_holder_keeps_referenced_target() {
    let importer = FlakyStore::importer(TOOL);
    // seed through the shared inner store, which does not inject failures
    let seeder = Importer::new(importer.backend().inner.clone(), ImportConfiguration::default()).unwrap();
    seeder.add(vec![object(identity(IDENTITY, "ACME")), object(tool(TOOL, IDENTITY))]).await.unwrap();

    let results = importer.delete(&[IDENTITY, TOOL]).await.unwrap();
    assert_eq!(status_of(&results, TOOL), Status::Error);
    let held = result_of(&results, IDENTITY);
    assert_eq!(held.status, Status::Error);
    assert!(held.error.as_deref().unwrap_or_default().contains("still referenced"), "{results:?}");

    assert_eq!(seeder.backend().count_of_type("identity"), 1);
    assert_eq!(seeder.get(TOOL).await.unwrap().into_value(), tool(TOOL, IDENTITY));
}

// ============================================================================
// 3. Shared state survives
// ============================================================================

#[tokio::test]
async fn test_referencing_object_survives_target_delete() {
    let importer = importer();
    importer.add(vec![object(identity(IDENTITY, "ACME")), object(tool(TOOL, IDENTITY))]).await.unwrap();

    let results = importer.delete(&[IDENTITY]).await.unwrap();
    assert_eq!(results[0].status, Status::Success);

    let mut expected = tool(TOOL, IDENTITY);
    expected.as_object_mut().unwrap().remove("created_by_ref");
    assert_eq!(importer.get(TOOL).await.unwrap().into_value(), expected);
}

#[tokio::test]
async fn test_relationship_deletable_after_endpoint_delete() {
    let importer = importer();
    let relationship = "relationship--57b56a43-b8b0-4cba-9deb-34e3e1faed9e";
    importer
        .add(vec![
            object(identity(IDENTITY, "ACME")),
            object(tool(TOOL, IDENTITY)),
            object(json!({"type": "malware", "id": MALWARE, "name": "Cryptolocker", "is_family": false})),
            object(json!({
                "type": "relationship",
                "id": relationship,
                "relationship_type": "uses",
                "source_ref": MALWARE,
                "target_ref": TOOL
            })),
        ])
        .await
        .unwrap();

    let results = importer.delete(&[TOOL]).await.unwrap();
    assert_eq!(results[0].status, Status::Success, "{results:?}");

    let remaining = importer.get(relationship).await.unwrap();
    assert_eq!(remaining.get("relationship_type"), Some(&json!("uses")));
    assert_eq!(remaining.get("source_ref"), Some(&json!(MALWARE)));
    assert_eq!(remaining.get("target_ref"), None);

    let results = importer.delete(&[relationship]).await.unwrap();
    assert_eq!(results[0].status, Status::Success, "{results:?}");
    assert_eq!(importer.backend().count_of_type("uses"), 0);
    assert_eq!(importer.get(MALWARE).await.unwrap().get("name"), Some(&json!("Cryptolocker")));
}

#[tokio::test]
async fn test_orphan_sweep_keeps_shared_attributes() {
    let importer = importer();
    importer
        .add(vec![object(identity(IDENTITY, "ACME")), object(identity(OTHER_IDENTITY, "Other"))])
        .await
        .unwrap();
    let before = importer.backend().thing_count();

    importer.delete(&[IDENTITY]).await.unwrap();

    // the entity, its stix-id and its name go; shared values stay owned
    assert_eq!(importer.backend().thing_count(), before - 3);
    assert_eq!(
        importer.get(OTHER_IDENTITY).await.unwrap().into_value(),
        identity(OTHER_IDENTITY, "Other")
    );
}
