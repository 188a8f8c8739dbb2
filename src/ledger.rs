//! # Instruction Ledger
//!
//! One instruction per submitted id, advanced through a fixed state
//! machine:
//!
//! ```text
//! add:    AddedForInsertion → QueryCreated → Success | AlreadyExistsInStore | Error
//!         AddedForInsertion → FailedCyclical | FailedMissingDependency | Error
//! delete: AddedForDeletion  → QueryCreated → Success | Error
//!         AddedForDeletion  → Error
//! ```
//!
//! Terminal states never change again. The public result is a flat list of
//! `InstructionResult`s in submission order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    AddedForInsertion,
    AddedForDeletion,
    QueryCreated,
    Success,
    AlreadyExistsInStore,
    Error,
    FailedCyclical,
    FailedMissingDependency,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success
                | Status::AlreadyExistsInStore
                | Status::Error
                | Status::FailedCyclical
                | Status::FailedMissingDependency
        )
    }

    fn allows(&self, next: Status) -> bool {
        matches!(
            (*self, next),
            (
                Status::AddedForInsertion,
                Status::QueryCreated | Status::Error | Status::FailedCyclical | Status::FailedMissingDependency
            ) | (Status::AddedForDeletion, Status::QueryCreated | Status::Error)
                | (Status::QueryCreated, Status::Success | Status::AlreadyExistsInStore | Status::Error)
        )
    }
}

/// Final report for one submitted id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionResult {
    pub id: String,
    pub status: Status,
    /// Rendered statement, once one was built.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Batch-scoped instruction table.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: IndexMap<String, InstructionResult>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an instruction. Returns `false` when `id` is already present.
    pub fn open(&mut self, id: &str, status: Status) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(
            id.to_string(),
            InstructionResult { id: id.to_string(), status, query: None, error: None },
        );
        true
    }

    pub fn status(&self, id: &str) -> Option<Status> {
        self.entries.get(id).map(|e| e.status)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Move `id` to `next`.
    pub fn advance(&mut self, id: &str, next: Status) -> Result<()> {
        let entry = self.entries.get_mut(id).ok_or_else(|| Error::NotFound(format!("instruction {id}")))?;
        if !entry.status.allows(next) {
            return Err(Error::InvalidTransition { id: id.to_string(), from: entry.status, to: next });
        }
        entry.status = next;
        Ok(())
    }

    /// `QueryCreated`, recording the rendered statement.
    pub fn query_created(&mut self, id: &str, query: String) -> Result<()> {
        self.advance(id, Status::QueryCreated)?;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.query = Some(query);
        }
        Ok(())
    }

    /// Terminal failure with a message.
    pub fn fail(&mut self, id: &str, status: Status, error: impl Into<String>) -> Result<()> {
        self.advance(id, status)?;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.error = Some(error.into());
        }
        Ok(())
    }

    /// Ids whose instruction is still open.
    pub fn pending(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Count per status, for batch summaries.
    pub fn tally(&self) -> IndexMap<Status, usize> {
        let mut counts = IndexMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn into_results(self) -> Vec<InstructionResult> {
        self.entries.into_values().collect()
    }
}
