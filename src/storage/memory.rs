//! In-memory storage backend.
//!
//! This is the reference implementation of `StoreBackend`: an
//! entity/relation/attribute graph that interprets `Statement`s directly.
//!
//! ## Transactions
//!
//! - **Copy on begin**: a write transaction works on a private copy of the
//!   committed graph. Commit swaps the copy in; rollback drops it.
//! - **Optimistic**: commit fails with `StoreTransaction` when another write
//!   transaction committed since this one began.
//! - **Read-only** transactions read the committed graph under the lock.
//!
//! Use this backend for:
//! - Testing the encode → commit → fetch → decode pipeline end to end
//! - Embedding in applications that don't need persistence

mod graph;
mod matcher;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use tracing::{debug, trace};

use self::graph::{Graph, ThingId};
use self::matcher::{Bindings, Matcher};
use super::{StoreBackend, ThingRecord};
use crate::query::{Clause, DeleteTarget, Pattern, Statement, Var};
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory typed graph store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    state: RwLock<Committed>,
    /// subtype → supertype, for `isa` matching
    hierarchy: HashMap<String, String>,
    next_tx_id: AtomicU64,
    available: AtomicBool,
}

struct Committed {
    graph: Graph,
    version: u64,
}

impl MemoryStore {
    /// A store with no type hierarchy: `isa` matches exact types only.
    pub fn new() -> Self {
        Self::with_hierarchy(HashMap::new())
    }

    /// A store whose `isa` checks walk `hierarchy` (subtype → supertype).
    pub fn with_hierarchy(hierarchy: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: RwLock::new(Committed { graph: Graph::default(), version: 0 }),
                hierarchy,
                next_tx_id: AtomicU64::new(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate losing (or regaining) the connection: while unavailable every
    /// operation fails with `Error::Storage`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of committed entities, relations and attributes.
    pub fn thing_count(&self) -> usize {
        self.inner.state.read().graph.len()
    }

    /// Number of committed things of `type_name` or one of its subtypes.
    pub fn count_of_type(&self, type_name: &str) -> usize {
        self.inner.state.read().graph.of_type(type_name, &self.inner.hierarchy).len()
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Storage("memory store unavailable".into()))
        }
    }

    /// Run `f` against the graph a transaction reads from.
    fn read<T>(&self, tx: &MemoryTx, f: impl FnOnce(&Graph) -> T) -> T {
        match &tx.work {
            Some(graph) => f(graph),
            None => f(&self.inner.state.read().graph),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("MemoryStore")
            .field("things", &state.graph.len())
            .field("version", &state.version)
            .finish()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction. Write transactions own a working copy.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    work: Option<Graph>,
    base_version: u64,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// Statement execution
// ============================================================================

fn insert(graph: &mut Graph, hierarchy: &HashMap<String, String>, matches: &Pattern, inserts: &Pattern) -> Result<usize> {
    let answers = if matches.is_empty() {
        vec![Bindings::new()]
    } else {
        Matcher::new(graph, hierarchy, matches).answers()
    };
    for answer in &answers {
        insert_one(graph, inserts, answer.clone())?;
    }
    Ok(answers.len())
}

/// Apply one insert pattern for one match answer: attributes, entities,
/// relations (in player-readiness order), then ownerships.
fn insert_one(graph: &mut Graph, inserts: &Pattern, mut bindings: Bindings) -> Result<()> {
    let relation_vars: HashSet<&Var> = inserts
        .iter()
        .filter_map(|clause| match clause {
            Clause::Relation { var, .. } => Some(var),
            _ => None,
        })
        .collect();

    for clause in inserts.iter() {
        if let Clause::Attribute { var, type_name, value } = clause {
            let id = graph.put_attribute(type_name, value.clone());
            bindings.insert(var.clone(), id);
        }
    }

    for clause in inserts.iter() {
        if let Clause::Isa { var, type_name } = clause {
            if relation_vars.contains(var) || bindings.contains_key(var) {
                continue;
            }
            let id = graph.insert_entity(type_name);
            bindings.insert(var.clone(), id);
        }
    }

    let mut pending: Vec<&Clause> = inserts
        .iter()
        .filter(|clause| matches!(clause, Clause::Relation { .. }))
        .collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for clause in pending {
            let Clause::Relation { var, type_name, players } = clause else {
                continue;
            };
            let resolved: Option<Vec<(String, ThingId)>> = players
                .iter()
                .map(|rp| bindings.get(&rp.player).map(|id| (rp.role.clone(), *id)))
                .collect();
            match resolved {
                Some(players) => {
                    let id = graph.insert_relation(type_name, players);
                    bindings.insert(var.clone(), id);
                }
                None => waiting.push(clause),
            }
        }
        if waiting.len() == before {
            let unbound: Vec<String> = waiting.iter().map(|c| c.to_string()).collect();
            return Err(Error::StoreTransaction(format!("unbound role players in: {}", unbound.join(" "))));
        }
        pending = waiting;
    }

    for clause in inserts.iter() {
        match clause {
            Clause::Has { var, attribute, value } => {
                let owner = bound(&bindings, var)?;
                let attr = graph.put_attribute(attribute, value.clone());
                graph.add_ownership(owner, attr);
            }
            Clause::HasVar { var, attribute } => {
                let owner = bound(&bindings, var)?;
                let attr = bound(&bindings, attribute)?;
                graph.add_ownership(owner, attr);
            }
            _ => {}
        }
    }
    Ok(())
}

fn delete(
    graph: &mut Graph,
    hierarchy: &HashMap<String, String>,
    matches: &Pattern,
    targets: &[DeleteTarget],
) -> Result<usize> {
    let answers = Matcher::new(graph, hierarchy, matches).answers();
    let mut doomed = Vec::new();
    for answer in &answers {
        for target in targets {
            let id = bound(answer, &target.var)?;
            if !graph.isa(id, &target.type_name, hierarchy) {
                return Err(Error::StoreTransaction(format!(
                    "{} is not an instance of {}",
                    target.var, target.type_name
                )));
            }
            doomed.push(id);
        }
    }
    for id in doomed {
        graph.delete(id);
    }
    Ok(answers.len())
}

fn bound(bindings: &Bindings, var: &Var) -> Result<ThingId> {
    bindings
        .get(var)
        .copied()
        .ok_or_else(|| Error::StoreTransaction(format!("variable {var} is not bound")))
}

// ============================================================================
// StoreBackend impl
// ============================================================================

#[async_trait]
impl StoreBackend for MemoryStore {
    type Tx = MemoryTx;

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.check_available()?;
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        let state = self.inner.state.read();
        let work = (mode == TxMode::ReadWrite).then(|| state.graph.clone());
        Ok(MemoryTx { id, mode, work, base_version: state.version })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        self.check_available()?;
        let Some(graph) = tx.work else {
            return Ok(());
        };
        let mut state = self.inner.state.write();
        if state.version != tx.base_version {
            return Err(Error::StoreTransaction(format!(
                "{} conflicts with a concurrent commit",
                tx.id
            )));
        }
        state.graph = graph;
        state.version += 1;
        debug!(tx = %tx.id, version = state.version, things = state.graph.len(), "committed");
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        trace!(tx = %tx.id, "rolled back");
        Ok(())
    }

    async fn execute(&self, tx: &mut MemoryTx, statement: &Statement) -> Result<usize> {
        self.check_available()?;
        if !tx.is_writable() {
            return Err(Error::StoreTransaction(format!("{} is read-only", tx.id)));
        }
        let hierarchy = &self.inner.hierarchy;
        let graph = tx
            .work
            .as_mut()
            .ok_or_else(|| Error::StoreTransaction(format!("{} has no working copy", tx.id)))?;
        trace!(%statement, "execute");
        match statement {
            Statement::Insert { matches, inserts } => insert(graph, hierarchy, matches, inserts),
            Statement::Delete { matches, deletes } => delete(graph, hierarchy, matches, deletes),
            Statement::PurgeOrphanAttributes => Ok(graph.purge_orphan_attributes()),
        }
    }

    async fn existing_ids(&self, tx: &MemoryTx, id_attribute: &str, ids: &[String]) -> Result<HashSet<String>> {
        self.check_available()?;
        Ok(self.read(tx, |graph| {
            ids.iter()
                .filter(|id| graph.find_by_id(id_attribute, id).is_some())
                .cloned()
                .collect()
        }))
    }

    async fn fetch(&self, tx: &MemoryTx, id_attribute: &str, id: &str) -> Result<Option<ThingRecord>> {
        self.check_available()?;
        Ok(self.read(tx, |graph| {
            graph
                .find_by_id(id_attribute, id)
                .and_then(|thing| graph.describe(thing, id_attribute))
        }))
    }
}
