// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collaborator seams.
//!
//! The compiler reaches every external system through the traits in this
//! module. The PostgreSQL worker implements them against the database and
//! [`crate::memory::MemoryStore`] implements them in memory for tests.

use std::time::Duration;

use async_trait::async_trait;
use diagram_core::{
    Catalog, CompileQueueItem, DownstreamSignal, GraphicObject, GridIndexEntry,
    LocationDescriptor, LocationIndexEntry, LiveValue, ObjectId, Result,
};
use rustc_hash::FxHashMap;

/// The compiled form of one object, written back inside the commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledObject {
    pub object_id: ObjectId,
    /// Lowercase hex SHA-256 of the canonical field set.
    pub hash_id: String,
    /// Canonical JSON payload including the hash.
    pub payload: String,
    pub location: Option<LocationDescriptor>,
}

/// A fresh generation of clones for a set of pointers, applied inside the
/// index transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloneReplacement {
    /// Pointers whose current clones are retired. Includes pointers whose
    /// target group is gone.
    pub owner_ids: Vec<ObjectId>,
    pub clones: Vec<GraphicObject>,
    /// Target name recorded on each resolved pointer.
    pub target_names: Vec<(ObjectId, String)>,
}

impl CloneReplacement {
    pub fn is_empty(&self) -> bool {
        self.owner_ids.is_empty() && self.clones.is_empty()
    }

    /// Keeps only the part owned by `owners`.
    pub fn restrict_to(&self, owners: &[ObjectId]) -> Self {
        let keep = |id: &ObjectId| owners.binary_search(id).is_ok();
        Self {
            owner_ids: self.owner_ids.iter().copied().filter(keep).collect(),
            clones: self
                .clones
                .iter()
                .filter(|c| c.group_id.as_ref().is_some_and(keep))
                .cloned()
                .collect(),
            target_names: self
                .target_names
                .iter()
                .filter(|(id, _)| keep(id))
                .cloned()
                .collect(),
        }
    }
}

/// Read access to display objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Loads objects by id. Unknown ids are skipped.
    async fn load_objects(&self, ids: &[ObjectId]) -> Result<Vec<GraphicObject>>;

    /// Current children of each owner, ordered by id. Owners without
    /// children are absent from the map.
    async fn load_children(
        &self,
        owner_ids: &[ObjectId],
    ) -> Result<FxHashMap<ObjectId, Vec<GraphicObject>>>;
}

/// Read-only coordinate-space catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_catalog(&self) -> Result<Catalog>;
}

/// Pre-allocates object ids.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Reserves exactly `count` fresh ids.
    async fn reserve(&self, count: usize) -> Result<Vec<ObjectId>>;
}

/// External live-value source, read in batches.
#[async_trait]
pub trait LiveValueSource: Send + Sync {
    /// Values for `keys` in `namespace`. Keys without a value are absent.
    async fn fetch(&self, namespace: &str, keys: &[String]) -> Result<FxHashMap<String, LiveValue>>;
}

/// Opens index transactions.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction + '_>>;
}

/// One all-or-nothing transaction over the index tables, the downstream
/// queues, the compile queue and the compiled columns of the object table.
///
/// Dropping a transaction without calling [`IndexTransaction::commit`]
/// discards every write.
#[async_trait]
pub trait IndexTransaction: Send {
    /// Row-locks `ids`, waiting for other transactions that hold them.
    /// Returns the ids that still exist.
    async fn lock_objects(&mut self, ids: &[ObjectId]) -> Result<Vec<ObjectId>>;

    /// Deletes every object owned by `replacement.owner_ids`, inserts the new
    /// clones and records the target names. Returns the ids of the deleted
    /// objects; their index rows are left for
    /// [`IndexTransaction::delete_index_rows`].
    async fn replace_clones(&mut self, replacement: &CloneReplacement) -> Result<Vec<ObjectId>>;

    /// Deletes all grid and location rows of `ids` and returns the buckets
    /// those rows occupied.
    async fn delete_index_rows(&mut self, ids: &[ObjectId]) -> Result<Vec<DownstreamSignal>>;

    /// Returns the number of rows inserted.
    async fn insert_grid_entries(&mut self, entries: &[GridIndexEntry]) -> Result<u64>;

    /// Returns the number of rows inserted.
    async fn insert_location_entries(&mut self, entries: &[LocationIndexEntry]) -> Result<u64>;

    /// Writes hash, payload and location back onto the objects. Returns the
    /// number of objects updated.
    async fn save_compiled(&mut self, objects: &[CompiledObject]) -> Result<u64>;

    /// Queues downstream recompilation. Signals already queued are not
    /// duplicated.
    async fn publish_signals(&mut self, signals: &[DownstreamSignal]) -> Result<u64>;

    /// Deletes compile queue rows.
    async fn dequeue(&mut self, item_ids: &[i64]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// The compile work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Claims up to `limit` visible items and hides them for `lease` so no
    /// other worker picks them up meanwhile.
    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<CompileQueueItem>>;

    /// Returns items to the queue after `delay`, counting one more attempt.
    async fn release(&self, items: &[CompileQueueItem], delay: Duration, error: &str) -> Result<()>;

    /// Moves items to the dead-letter table.
    async fn dead_letter(&self, items: &[CompileQueueItem], error: &str) -> Result<()>;
}
