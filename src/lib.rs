//! # cti-graph: STIX objects ⇄ typed graph store
//!
//! Bidirectional mapping between richly-typed, JSON-shaped threat-intelligence
//! objects (STIX 2.1 plus extension domains) and an entity/relation/attribute
//! graph store that speaks `match … insert …` / `match … delete …` statements.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StoreBackend` is the contract between the mapping engine and storage
//! 2. **Tables are data**: every translation decision is driven by an immutable `MappingTable`
//! 3. **Codec owns nothing**: encode and decode are pure functions of (object, table)
//! 4. **Dependency-safe writes**: batches are committed layer by layer in topological order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cti_graph::{ImportConfiguration, ImportableObject, Importer};
//!
//! # async fn example() -> cti_graph::Result<()> {
//! let importer = Importer::open_memory(ImportConfiguration::default())?;
//!
//! let identity = ImportableObject::try_from(serde_json::json!({
//!     "type": "identity",
//!     "spec_version": "2.1",
//!     "id": "identity--f431f809-377b-45e0-aa1c-6a4751cae5ff",
//!     "created": "2017-01-20T00:00:00.000Z",
//!     "modified": "2017-01-20T00:00:00.000Z",
//!     "name": "ACME Widget, Inc.",
//!     "identity_class": "organization"
//! }))?;
//!
//! for result in importer.add(vec![identity]).await? {
//!     println!("{} -> {:?}", result.id, result.status);
//! }
//! let back = importer.get("identity--f431f809-377b-45e0-aa1c-6a4751cae5ff").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Registry | `mapping` | Merge active domains into one `MappingTable` |
//! | Codec | `codec` | Scalar literals, field classification |
//! | Encode | `encode` | Object → match/insert fragments + dependency ids |
//! | Schedule | `schedule` | Dependency graph, cycles, missing deps, layers |
//! | Commit | `commit` | Layered writes + instruction ledger |
//! | Decode | `decode` | Store record → nested object |
//! | Delete | `delete` | Inverted layering + orphan attribute sweep |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod query;
pub mod mapping;
pub mod codec;
pub mod encode;
pub mod decode;
pub mod schedule;
pub mod ledger;
pub mod commit;
pub mod delete;
pub mod storage;
pub mod tx;

use std::sync::Arc;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    ImportableObject, ImportConfiguration, CoreVersion, AttackMatrix, MergePolicy,
};

// ============================================================================
// Re-exports: Mapping + codec
// ============================================================================

pub use mapping::{MappingTable, RelationKind, Registry};
pub use encode::EncodedUnit;

// ============================================================================
// Re-exports: Storage + ledger
// ============================================================================

pub use storage::{StoreBackend, MemoryStore, ThingRecord};
pub use ledger::{InstructionResult, Status};
pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Top-level Importer handle
// ============================================================================

/// The primary entry point. An `Importer` wraps a store backend together
/// with the merged mapping table for one `ImportConfiguration`.
pub struct Importer<B: StoreBackend> {
    backend: B,
    config: ImportConfiguration,
    mappings: Arc<MappingTable>,
}

impl<B: StoreBackend> Importer<B> {
    /// Create an importer over `backend` using the builtin domain registry.
    pub fn new(backend: B, config: ImportConfiguration) -> Result<Self> {
        Self::with_registry(backend, config, Registry::global())
    }

    /// Create an importer whose mapping table comes from a caller-owned registry.
    pub fn with_registry(backend: B, config: ImportConfiguration, registry: &Registry) -> Result<Self> {
        let mappings = registry.mappings(&config)?;
        Ok(Self { backend, config, mappings })
    }

    /// Insert a batch of objects in dependency order.
    ///
    /// Object-level failures are reported per id; only connectivity
    /// failures and cyclical batches return `Err`.
    pub async fn add<I>(&self, objects: I) -> Result<Vec<InstructionResult>>
    where
        I: IntoIterator<Item = ImportableObject>,
    {
        let objects: Vec<ImportableObject> = objects.into_iter().collect();
        commit::add_batch(&self.backend, &self.mappings, objects).await
    }

    /// Insert every object contained in a STIX bundle or a JSON array.
    pub async fn add_json(&self, document: serde_json::Value) -> Result<Vec<InstructionResult>> {
        let objects = model::object::objects_from_json(document)?;
        commit::add_batch(&self.backend, &self.mappings, objects).await
    }

    /// Retrieve a stored object and reconstruct its nested JSON shape.
    pub async fn get(&self, id: &str) -> Result<ImportableObject> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let record = self.backend.fetch(&tx, mapping::ID_ATTRIBUTE, id).await;
        self.backend.rollback_tx(tx).await?;
        let record = record?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        decode::decode_record(&self.mappings, &record)
    }

    /// Remove stored objects, dependents before their dependencies.
    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<InstructionResult>> {
        let ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
        delete::delete_batch(&self.backend, &self.mappings, &ids).await
    }

    /// The merged mapping table in use.
    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn config(&self) -> &ImportConfiguration {
        &self.config
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// In-memory store for testing and embedding.
impl Importer<MemoryStore> {
    pub fn open_memory(config: ImportConfiguration) -> Result<Self> {
        let mappings = Registry::global().mappings(&config)?;
        let backend = MemoryStore::with_hierarchy(mappings.type_hierarchy().clone());
        Ok(Self { backend, config, mappings })
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Mapping conflict in domain '{domain}': {key}")]
    MappingConflict { domain: String, key: String },

    #[error("Unsupported value type: expected {expected}, got {got}")]
    UnsupportedValueType { expected: String, got: String },

    #[error("Unsupported relationship subtype: {0}")]
    UnsupportedRelationSubtype(String),

    #[error("Unknown relation type: {0}")]
    UnknownRelationType(String),

    #[error("No mapping entry for '{field}' on '{kind}'")]
    MissingMappingEntry { kind: String, field: String },

    #[error("Unresolved granular marking selector: {0}")]
    UnresolvedSelector(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Cyclical dependency between: {}", cycle.join(", "))]
    CyclicalDependency {
        cycle: Vec<String>,
        results: Vec<InstructionResult>,
    },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Store transaction error: {0}")]
    StoreTransaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid instruction transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition { id: String, from: Status, to: Status },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
