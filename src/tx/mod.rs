//! Transaction handles for store backends.
//!
//! The commit loop opens one transaction per layer; a layer either commits
//! as a whole or is rolled back as a whole.

use serde::{Deserialize, Serialize};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    /// Lookups and fetches only.
    ReadOnly,
    /// Insert, delete and purge statements.
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;

    fn is_writable(&self) -> bool {
        self.mode() == TxMode::ReadWrite
    }
}
