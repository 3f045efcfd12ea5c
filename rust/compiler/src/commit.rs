// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transactional committer.
//!
//! One transaction per batch moves through
//! `Locking -> Replacing -> Publishing -> Dequeuing -> Committing -> Committed`.
//! Clone generations are swapped during `Replacing`. A failure in any phase
//! rolls the whole transaction back, clones included, and the batch is
//! retried as a unit.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use diagram_core::{
    DownstreamSignal, Error, GridIndexEntry, LocationIndexEntry, ObjectId, Result,
};
use rustc_hash::FxHashSet;
use tracing::{debug, error, trace, warn};

use crate::store::{CloneReplacement, CompiledObject, IndexStore, IndexTransaction};

/// Phases of a batch commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitPhase {
    Locking,
    Replacing,
    Publishing,
    Dequeuing,
    Committing,
    Committed,
    Failed,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitPhase::Locking => "locking",
            CommitPhase::Replacing => "replacing",
            CommitPhase::Publishing => "publishing",
            CommitPhase::Dequeuing => "dequeuing",
            CommitPhase::Committing => "committing",
            CommitPhase::Committed => "committed",
            CommitPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything one batch writes.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Objects whose index rows are replaced, including new clones.
    pub object_ids: Vec<ObjectId>,
    pub grid: Vec<GridIndexEntry>,
    pub locations: Vec<LocationIndexEntry>,
    pub compiled: Vec<CompiledObject>,
    /// Clone generations swapped in before the index rows are written.
    pub clones: CloneReplacement,
    /// Queue rows acknowledged by this batch.
    pub queue_item_ids: Vec<i64>,
}

/// Row counts of a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub locked: usize,
    pub clones_retired: usize,
    pub clones_inserted: usize,
    pub grid_rows: u64,
    pub location_rows: u64,
    pub signals_published: u64,
    pub dequeued: u64,
}

/// The set of downstream signals for a batch: every bucket the new rows
/// occupy and every bucket the old rows occupied.
pub fn collect_signals(
    grid: &[GridIndexEntry],
    locations: &[LocationIndexEntry],
    vacated: &[DownstreamSignal],
) -> Vec<DownstreamSignal> {
    let mut signals: BTreeSet<DownstreamSignal> = BTreeSet::new();
    signals.extend(grid.iter().map(DownstreamSignal::from));
    signals.extend(locations.iter().map(DownstreamSignal::from));
    signals.extend(vacated.iter().copied());
    signals.into_iter().collect()
}

/// Commits `batch` in a single transaction.
pub async fn commit_batch(store: &dyn IndexStore, batch: CommitBatch) -> Result<CommitSummary> {
    let start = Instant::now();
    let mut phase = CommitPhase::Locking;

    match run(store, &batch, &mut phase).await {
        Ok(summary) => {
            debug!(
                locked = summary.locked,
                clones_retired = summary.clones_retired,
                clones_inserted = summary.clones_inserted,
                grid_rows = summary.grid_rows,
                location_rows = summary.location_rows,
                signals = summary.signals_published,
                dequeued = summary.dequeued,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Committed batch"
            );
            Ok(summary)
        }
        Err(err) => {
            let failed_in = phase;
            advance(&mut phase, CommitPhase::Failed);
            if err.is_invariant_violation() {
                error!(phase = %failed_in, error = %err, "Batch commit failed");
            } else {
                warn!(phase = %failed_in, error = %err, "Batch commit failed");
            }
            Err(err)
        }
    }
}

/// Drives one transaction, leaving `phase` at the phase that failed.
async fn run(
    store: &dyn IndexStore,
    batch: &CommitBatch,
    phase: &mut CommitPhase,
) -> Result<CommitSummary> {
    let mut tx = store.begin().await?;

    let replaced = replace(tx.as_mut(), batch, phase).await;
    match replaced {
        Ok(summary) => {
            advance(phase, CommitPhase::Committing);
            tx.commit().await?;
            advance(phase, CommitPhase::Committed);
            Ok(summary)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn advance(phase: &mut CommitPhase, next: CommitPhase) {
    trace!(from = %phase, to = %next, "Commit phase");
    *phase = next;
}

async fn replace(
    tx: &mut (dyn IndexTransaction + '_),
    batch: &CommitBatch,
    phase: &mut CommitPhase,
) -> Result<CommitSummary> {
    let mut summary = CommitSummary::default();

    let mut ids = batch.object_ids.clone();
    ids.extend_from_slice(&batch.clones.owner_ids);
    ids.sort_unstable();
    ids.dedup();
    let mut locked = tx.lock_objects(&ids).await?;
    locked.sort_unstable();
    summary.locked = locked.len();

    advance(phase, CommitPhase::Replacing);

    // Pointers deleted since loading keep no clones.
    let replacement = batch.clones.restrict_to(&locked);
    let retired: FxHashSet<ObjectId> = if replacement.is_empty() {
        FxHashSet::default()
    } else {
        tx.replace_clones(&replacement).await?.into_iter().collect()
    };
    summary.clones_retired = retired.len();
    summary.clones_inserted = replacement.clones.len();

    // Objects deleted since loading, or retired above, have no rows left to
    // replace. Owners outside `object_ids` were skipped and keep their rows.
    let compiled_ids: FxHashSet<ObjectId> = batch.object_ids.iter().copied().collect();
    let mut live: FxHashSet<ObjectId> = locked
        .iter()
        .copied()
        .filter(|id| compiled_ids.contains(id) && !retired.contains(id))
        .collect();
    live.extend(replacement.clones.iter().map(|c| c.id));

    let grid: Vec<GridIndexEntry> = batch
        .grid
        .iter()
        .filter(|e| live.contains(&e.object_id))
        .cloned()
        .collect();
    let locations: Vec<LocationIndexEntry> = batch
        .locations
        .iter()
        .filter(|e| live.contains(&e.object_id))
        .cloned()
        .collect();
    let compiled: Vec<CompiledObject> = batch
        .compiled
        .iter()
        .filter(|c| live.contains(&c.object_id))
        .cloned()
        .collect();

    let mut stale: Vec<ObjectId> = live.iter().chain(retired.iter()).copied().collect();
    stale.sort_unstable();
    stale.dedup();
    let vacated = tx.delete_index_rows(&stale).await?;

    summary.grid_rows = tx.insert_grid_entries(&grid).await?;
    expect_rows("grid", summary.grid_rows, grid.len())?;

    summary.location_rows = tx.insert_location_entries(&locations).await?;
    expect_rows("location", summary.location_rows, locations.len())?;

    let saved = tx.save_compiled(&compiled).await?;
    expect_rows("compiled object", saved, compiled.len())?;

    advance(phase, CommitPhase::Publishing);
    let signals = collect_signals(&grid, &locations, &vacated);
    tx.publish_signals(&signals).await?;
    summary.signals_published = signals.len() as u64;

    advance(phase, CommitPhase::Dequeuing);
    summary.dequeued = tx.dequeue(&batch.queue_item_ids).await?;

    Ok(summary)
}

fn expect_rows(what: &str, written: u64, expected: usize) -> Result<()> {
    if written != expected as u64 {
        return Err(Error::InvariantViolation(format!(
            "wrote {} {} rows, expected {}",
            written, what, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreOp};
    use diagram_core::{GraphicObject, GridKey, ObjectKind};

    fn grid(object_id: ObjectId, x: i64) -> GridIndexEntry {
        GridIndexEntry {
            object_id,
            coord_space_id: 1,
            grid_key: GridKey::Cell {
                coord_space_id: 1,
                level: 0,
                x,
                y: 0,
            },
            import_group_hash: None,
        }
    }

    #[test]
    fn signals_are_deduplicated_across_the_batch() {
        let rows = vec![grid(1, 0), grid(2, 0), grid(3, 1)];
        let locations = vec![
            LocationIndexEntry {
                object_id: 1,
                model_set_id: 4,
                index_bucket: 12,
            },
            LocationIndexEntry {
                object_id: 2,
                model_set_id: 4,
                index_bucket: 12,
            },
        ];
        let vacated = vec![DownstreamSignal::from(&grid(9, 5)), DownstreamSignal::from(&grid(9, 0))];

        let signals = collect_signals(&rows, &locations, &vacated);
        assert_eq!(signals.len(), 4);
    }

    #[test]
    fn row_count_mismatch_is_an_invariant_violation() {
        assert!(expect_rows("grid", 3, 3).is_ok());
        assert!(expect_rows("grid", 2, 3).unwrap_err().is_invariant_violation());
    }

    #[tokio::test]
    async fn failure_is_attributed_to_its_phase() {
        let store = MemoryStore::new();
        store.insert_object(GraphicObject::new(1, 1, ObjectKind::Polyline));
        let batch = CommitBatch {
            object_ids: vec![1],
            grid: vec![grid(1, 0)],
            ..CommitBatch::default()
        };

        for (op, expected) in [
            (StoreOp::LockObjects, CommitPhase::Locking),
            (StoreOp::InsertGridEntries, CommitPhase::Replacing),
            (StoreOp::PublishSignals, CommitPhase::Publishing),
            (StoreOp::Dequeue, CommitPhase::Dequeuing),
            (StoreOp::Commit, CommitPhase::Committing),
        ] {
            store.fail_on(op);
            let mut phase = CommitPhase::Locking;
            assert!(run(&store, &batch, &mut phase).await.is_err());
            assert_eq!(phase, expected, "{:?}", op);
            store.clear_faults();
        }

        let mut phase = CommitPhase::Locking;
        let summary = run(&store, &batch, &mut phase).await.unwrap();
        assert_eq!(phase, CommitPhase::Committed);
        assert_eq!(summary.grid_rows, 1);
        assert_eq!(CommitPhase::Committing.to_string(), "committing");
    }
}
