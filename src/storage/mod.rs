//! # Store Backend Trait
//!
//! The contract between the mapping engine and a typed graph store.
//! Writes arrive as `Statement`s; reads come back as `ThingRecord`s.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory entity/relation/attribute graph for testing/embedding |

pub mod memory;
pub mod record;

use async_trait::async_trait;
use hashbrown::HashSet;

use crate::query::Statement;
use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::MemoryStore;
pub use record::{AttributeRecord, Player, RelationInstance, RolePlayerRecord, ThingKind, ThingRecord};

// ============================================================================
// StoreBackend Trait
// ============================================================================

/// The universal store contract.
///
/// Transactions are explicit: the committer opens one write transaction per
/// layer and either commits it or rolls it back as a unit.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Verify the store is reachable. Batches fail fast when this errors.
    async fn ping(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Writes
    // ========================================================================

    /// Execute one statement. Returns the number of match answers the
    /// write was applied to (1 for an insert without a match part).
    async fn execute(&self, tx: &mut Self::Tx, statement: &Statement) -> Result<usize>;

    // ========================================================================
    // Reads
    // ========================================================================

    /// Which of `ids` are already held by some thing through `id_attribute`.
    async fn existing_ids(&self, tx: &Self::Tx, id_attribute: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Describe the thing owning `id`, with every relation it takes part in.
    async fn fetch(&self, tx: &Self::Tx, id_attribute: &str, id: &str) -> Result<Option<ThingRecord>>;
}
