//! # Delete Layering
//!
//! Each target is fetched, decoded and re-encoded so its delete statement
//! matches exactly what an insert of the stored object would have written.
//! Targets are removed dependents first; a final statement sweeps attributes
//! nothing holds any more.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::commit::{commit_layer, settle_layer};
use crate::decode::decode_record;
use crate::encode::{self, EncodedUnit};
use crate::ledger::{InstructionResult, Ledger, Status};
use crate::mapping::{MappingTable, ID_ATTRIBUTE};
use crate::query::Statement;
use crate::schedule::DependencyGraph;
use crate::storage::StoreBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Remove the objects named by `ids`.
pub async fn delete_batch<B: StoreBackend>(
    backend: &B,
    table: &MappingTable,
    ids: &[String],
) -> Result<Vec<InstructionResult>> {
    backend.ping().await?;
    let mut ledger = Ledger::new();

    let mut units: IndexMap<String, EncodedUnit> = IndexMap::new();
    let tx = backend.begin_tx(TxMode::ReadOnly).await?;
    for id in ids {
        if !ledger.open(id, Status::AddedForDeletion) {
            warn!(id = %id, "duplicate id in delete batch, ignoring repeat");
            continue;
        }
        let unit = match backend.fetch(&tx, ID_ATTRIBUTE, id).await {
            Ok(Some(record)) => decode_record(table, &record).and_then(|object| encode::encode_stored(table, &object)),
            Ok(None) => Err(Error::NotFound(id.clone())),
            Err(e) => Err(e),
        };
        match unit {
            Ok(unit) => {
                units.insert(id.clone(), unit);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "cannot delete");
                ledger.fail(id, Status::Error, e.to_string())?;
            }
        }
    }
    backend.rollback_tx(tx).await?;

    // targets referencing another target, per referenced target
    let mut holders: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut graph = DependencyGraph::new();
    for (id, unit) in &units {
        graph.add_unit(id, unit.dependency_ids.iter().map(String::as_str));
        for dep in unit.dependency_ids.iter().filter(|d| units.contains_key(*d)) {
            holders.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }
    let plan = graph.plan_removal();
    for id in plan.cyclical.iter().chain(&plan.blocked) {
        ledger.fail(id, Status::Error, "cyclical dependency between delete targets")?;
    }

    let mut failed: HashSet<String> = HashSet::new();
    for layer in &plan.layers {
        let mut statements = Vec::with_capacity(layer.len());
        for id in layer {
            let Some(unit) = units.get(id) else {
                continue;
            };
            let held_by = holders
                .get(id.as_str())
                .and_then(|hs| hs.iter().find(|h| failed.contains(**h)));
            if let Some(holder) = held_by {
                ledger.fail(id, Status::Error, format!("still referenced by {holder}"))?;
                failed.insert(id.clone());
                continue;
            }
            let statement = unit.delete_statement();
            ledger.query_created(id, statement.to_string())?;
            statements.push((id.clone(), statement));
        }
        if statements.is_empty() {
            continue;
        }
        debug!(units = statements.len(), "deleting layer");
        let outcome = commit_layer(backend, &statements).await;
        settle_layer(&mut ledger, &statements, outcome, &mut failed)?;
    }

    let sweep = [("orphan-attributes".to_string(), Statement::PurgeOrphanAttributes)];
    if let Err(failure) = commit_layer(backend, &sweep).await {
        warn!(error = %failure.message, "orphan attribute sweep failed");
    }

    info!(summary = ?ledger.tally(), "delete batch finished");
    Ok(ledger.into_results())
}
