//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cti_graph::query::Statement;
use cti_graph::storage::memory::MemoryTx;
use cti_graph::{
    Error, ImportConfiguration, ImportableObject, Importer, InstructionResult, MemoryStore, Registry, Result, Status,
    StoreBackend, ThingRecord, TxMode,
};
use hashbrown::HashSet;
use serde_json::{json, Value};

pub const IDENTITY: &str = "identity--f431f809-377b-45e0-aa1c-6a4751cae5ff";
pub const OTHER_IDENTITY: &str = "identity--311b2d2d-f010-4473-83ec-1edf84858f4c";
pub const MALWARE: &str = "malware--31b940d4-6f7f-459a-80ea-9c1f17b5891b";
pub const TOOL: &str = "tool--8e2e2d2b-17d4-4cbf-938f-98ee46b3cd3f";
pub const INDICATOR: &str = "indicator--8e2e2d2b-17d4-4cbf-938f-98ee46b3cd3f";
pub const MARKING: &str = "marking-definition--613f2e26-407d-48c7-9eca-b8e91df99dc9";
pub const TIMESTAMP: &str = "2017-01-20T00:00:00.000Z";

pub fn importer() -> Importer<MemoryStore> {
    Importer::open_memory(ImportConfiguration::default()).unwrap()
}

pub fn object(value: Value) -> ImportableObject {
    ImportableObject::try_from(value).unwrap()
}

pub fn identity(id: &str, name: &str) -> Value {
    json!({
        "type": "identity",
        "spec_version": "2.1",
        "id": id,
        "created": TIMESTAMP,
        "modified": TIMESTAMP,
        "name": name,
        "identity_class": "organization"
    })
}

pub fn tool(id: &str, created_by: &str) -> Value {
    json!({
        "type": "tool",
        "spec_version": "2.1",
        "id": id,
        "created": TIMESTAMP,
        "modified": TIMESTAMP,
        "name": "nmap",
        "created_by_ref": created_by
    })
}

pub fn status_of(results: &[InstructionResult], id: &str) -> Status {
    result_of(results, id).status
}

pub fn result_of<'r>(results: &'r [InstructionResult], id: &str) -> &'r InstructionResult {
    results
        .iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("no result for {id} in {results:?}"))
}

/// Add `value`, read it back, and compare.
pub async fn assert_roundtrip(importer: &Importer<MemoryStore>, value: Value) {
    let id = value["id"].as_str().unwrap().to_string();
    let results = importer.add(vec![object(value.clone())]).await.unwrap();
    assert_eq!(status_of(&results, &id), Status::Success, "{results:?}");
    let back = importer.get(&id).await.unwrap();
    pretty_assertions::assert_eq!(back.into_value(), value);
}

// ============================================================================
// Store wrapper that fails on demand
// ============================================================================

/// `MemoryStore` that rejects any write statement mentioning `fail_on`.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_on: String,
}

impl FlakyStore {
    pub fn importer(fail_on: &str) -> Importer<FlakyStore> {
        let table = Registry::global().mappings(&ImportConfiguration::default()).unwrap();
        let store = FlakyStore {
            inner: MemoryStore::with_hierarchy(table.type_hierarchy().clone()),
            fail_on: fail_on.to_string(),
        };
        Importer::new(store, ImportConfiguration::default()).unwrap()
    }
}

#[async_trait]
impl StoreBackend for FlakyStore {
    type Tx = MemoryTx;

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.inner.begin_tx(mode).await
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        self.inner.commit_tx(tx).await
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        self.inner.rollback_tx(tx).await
    }

    async fn execute(&self, tx: &mut MemoryTx, statement: &Statement) -> Result<usize> {
        if statement.to_string().contains(&self.fail_on) {
            return Err(Error::Storage(format!("injected failure on {}", self.fail_on)));
        }
        self.inner.execute(tx, statement).await
    }

    async fn existing_ids(&self, tx: &MemoryTx, id_attribute: &str, ids: &[String]) -> Result<HashSet<String>> {
        self.inner.existing_ids(tx, id_attribute, ids).await
    }

    async fn fetch(&self, tx: &MemoryTx, id_attribute: &str, id: &str) -> Result<Option<ThingRecord>> {
        self.inner.fetch(tx, id_attribute, id).await
    }
}
