//! # Batch Commit
//!
//! The `add` pipeline: encode every object, look the batch up in the store
//! once, schedule, then commit layer by layer with one write transaction
//! per layer.
//!
//! Object-level failures end up in the ledger. The call itself fails only
//! when the store is unreachable before any write, or when the batch
//! contains a dependency cycle (nothing is written in that case).

use hashbrown::HashSet;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, info, warn};

use crate::encode::{self, EncodedUnit};
use crate::ledger::{InstructionResult, Ledger, Status};
use crate::mapping::{MappingTable, ID_ATTRIBUTE};
use crate::model::ImportableObject;
use crate::query::Statement;
use crate::schedule::DependencyGraph;
use crate::storage::StoreBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Insert `objects` in dependency order.
pub async fn add_batch<B: StoreBackend>(
    backend: &B,
    table: &MappingTable,
    objects: Vec<ImportableObject>,
) -> Result<Vec<InstructionResult>> {
    backend.ping().await?;
    let mut ledger = Ledger::new();

    // ========================================================================
    // Encode
    // ========================================================================

    let mut units: IndexMap<String, EncodedUnit> = IndexMap::new();
    for object in &objects {
        let id = object.id();
        if !ledger.open(id, Status::AddedForInsertion) {
            warn!(id = %id, "duplicate id in batch, ignoring repeat");
            continue;
        }
        match encode::encode(table, object) {
            Ok(unit) => {
                debug!(id = %id, dependencies = unit.dependency_ids.len(), "encoded");
                units.insert(id.to_string(), unit);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "encode failed");
                ledger.fail(id, Status::Error, e.to_string())?;
            }
        }
    }

    // ========================================================================
    // Store lookup: batch ids plus referenced ids outside the batch
    // ========================================================================

    let mut lookup: IndexSet<String> = units.keys().cloned().collect();
    for unit in units.values() {
        lookup.extend(unit.dependency_ids.iter().filter(|d| !units.contains_key(*d)).cloned());
    }
    let lookup: Vec<String> = lookup.into_iter().collect();
    let existing = existing_ids(backend, &lookup).await?;

    units.retain(|id, unit| {
        if !existing.contains(id) {
            return true;
        }
        debug!(id = %id, "already in store");
        let settled = ledger
            .query_created(id, unit.insert_statement().to_string())
            .and_then(|_| ledger.advance(id, Status::AlreadyExistsInStore));
        if let Err(e) = settled {
            error!(id = %id, error = %e, "ledger rejected transition");
        }
        false
    });

    // ========================================================================
    // Schedule
    // ========================================================================

    let mut graph = DependencyGraph::new();
    for (id, unit) in &units {
        graph.add_unit(id, unit.dependency_ids.iter().map(String::as_str));
    }
    let plan = graph.plan_insertion(&existing);

    for (id, absent) in &plan.missing {
        warn!(id = %id, missing = ?absent, "missing dependency");
        let message = Error::MissingDependency(absent.join(", ")).to_string();
        ledger.fail(id, Status::FailedMissingDependency, message)?;
    }

    if plan.has_cycle() {
        error!(cycle = ?plan.cyclical, "cyclical dependency, aborting batch");
        for id in &plan.cyclical {
            ledger.fail(id, Status::FailedCyclical, "member of a dependency cycle")?;
        }
        for id in &plan.blocked {
            ledger.fail(id, Status::FailedCyclical, "depends on a dependency cycle")?;
        }
        for id in plan.ordered() {
            ledger.fail(id, Status::Error, "batch aborted: cyclical dependency")?;
        }
        return Err(Error::CyclicalDependency { cycle: plan.cyclical.clone(), results: ledger.into_results() });
    }

    // ========================================================================
    // Layered commit
    // ========================================================================

    let mut failed: HashSet<String> = HashSet::new();
    for (depth, layer) in plan.layers.iter().enumerate() {
        let mut statements = Vec::with_capacity(layer.len());
        for id in layer {
            let Some(unit) = units.get(id) else {
                continue;
            };
            if let Some(dep) = unit.dependency_ids.iter().find(|d| failed.contains(*d)) {
                ledger.fail(id, Status::Error, format!("dependency {dep} failed to commit"))?;
                failed.insert(id.clone());
                continue;
            }
            let statement = unit.insert_statement();
            ledger.query_created(id, statement.to_string())?;
            statements.push((id.clone(), statement));
        }
        if statements.is_empty() {
            continue;
        }
        debug!(layer = depth, units = statements.len(), "committing layer");
        let outcome = commit_layer(backend, &statements).await;
        settle_layer(&mut ledger, &statements, outcome, &mut failed)?;
    }

    info!(summary = ?ledger.tally(), "add batch finished");
    Ok(ledger.into_results())
}

async fn existing_ids<B: StoreBackend>(backend: &B, ids: &[String]) -> Result<HashSet<String>> {
    let tx = backend.begin_tx(TxMode::ReadOnly).await?;
    let found = backend.existing_ids(&tx, ID_ATTRIBUTE, ids).await;
    backend.rollback_tx(tx).await?;
    found
}

// ============================================================================
// Layer transactions (shared with delete)
// ============================================================================

/// Why a layer did not commit.
#[derive(Debug)]
pub(crate) struct LayerFailure {
    /// The statement that failed, if the failure is attributable to one.
    pub id: Option<String>,
    pub message: String,
}

/// Execute one layer in a single write transaction. An insert or delete
/// that matches nothing fails the layer.
pub(crate) async fn commit_layer<B: StoreBackend>(
    backend: &B,
    statements: &[(String, Statement)],
) -> std::result::Result<(), LayerFailure> {
    let mut tx = backend
        .begin_tx(TxMode::ReadWrite)
        .await
        .map_err(|e| LayerFailure { id: None, message: e.to_string() })?;
    for (id, statement) in statements {
        let message = match backend.execute(&mut tx, statement).await {
            Ok(0) if !matches!(statement, Statement::PurgeOrphanAttributes) => {
                "statement matched nothing in the store".to_string()
            }
            Ok(_) => continue,
            Err(e) => e.to_string(),
        };
        if let Err(e) = backend.rollback_tx(tx).await {
            warn!(error = %e, "rollback failed");
        }
        return Err(LayerFailure { id: Some(id.clone()), message });
    }
    backend
        .commit_tx(tx)
        .await
        .map_err(|e| LayerFailure { id: None, message: e.to_string() })
}

/// Record a layer outcome: every unit succeeds, or every unit errors.
pub(crate) fn settle_layer(
    ledger: &mut Ledger,
    statements: &[(String, Statement)],
    outcome: std::result::Result<(), LayerFailure>,
    failed: &mut HashSet<String>,
) -> Result<()> {
    match outcome {
        Ok(()) => {
            for (id, _) in statements {
                ledger.advance(id, Status::Success)?;
            }
        }
        Err(failure) => {
            error!(culprit = ?failure.id, error = %failure.message, "layer rolled back");
            for (id, _) in statements {
                let message = match &failure.id {
                    Some(culprit) if culprit == id => failure.message.clone(),
                    Some(culprit) => format!("layer rolled back after {culprit} failed: {}", failure.message),
                    None => Error::StoreTransaction(failure.message.clone()).to_string(),
                };
                ledger.fail(id, Status::Error, message)?;
                failed.insert(id.clone());
            }
        }
    }
    Ok(())
}
