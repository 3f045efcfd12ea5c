// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory implementation of every collaborator trait.
//!
//! Used by the tests and for running the compiler without a database.
//! Transactions take per-object row locks (in id order, so overlapping
//! batches cannot deadlock), buffer their writes and apply them in one step
//! on commit. Faults can be injected into any store operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use diagram_core::{
    Catalog, CompileQueueItem, DownstreamSignal, Error, GraphicObject, GridIndexEntry,
    LiveValue, LocationIndexEntry, ObjectId, ObjectKind, Result,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use crate::store::{
    CatalogSource, CloneReplacement, CompiledObject, IdAllocator, IndexStore, IndexTransaction,
    LiveValueSource, ObjectStore, WorkQueue,
};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    LoadObjects,
    ReplaceClones,
    Reserve,
    FetchLiveValues,
    LockObjects,
    DeleteIndexRows,
    InsertGridEntries,
    InsertLocationEntries,
    SaveCompiled,
    PublishSignals,
    Dequeue,
    Commit,
}

/// A compile queue row.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRow {
    pub item: CompileQueueItem,
    pub visible_at: Instant,
    pub last_error: Option<String>,
}

/// A queue item given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub item: CompileQueueItem,
    pub error: String,
}

#[derive(Default)]
struct State {
    catalog: Catalog,
    objects: BTreeMap<ObjectId, GraphicObject>,
    grid: Vec<GridIndexEntry>,
    locations: Vec<LocationIndexEntry>,
    signals: BTreeSet<DownstreamSignal>,
    queue: BTreeMap<i64, QueueRow>,
    dead_letters: Vec<DeadLetter>,
    live_values: FxHashMap<(String, String), LiveValue>,
    live_fetches: usize,
    next_object_id: ObjectId,
    next_queue_id: i64,
    faults: FxHashSet<StoreOp>,
    short_grid_writes: bool,
}

impl State {
    fn check(&self, op: StoreOp) -> Result<()> {
        if self.faults.contains(&op) {
            return Err(Error::TransientStore(format!("injected fault in {:?}", op)));
        }
        Ok(())
    }

    /// Removes the index rows of `ids`, returning the buckets they occupied.
    fn remove_index_rows(&mut self, ids: &FxHashSet<ObjectId>) -> Vec<DownstreamSignal> {
        let mut vacated = Vec::new();
        self.grid.retain(|e| {
            let hit = ids.contains(&e.object_id);
            if hit {
                vacated.push(DownstreamSignal::from(e));
            }
            !hit
        });
        self.locations.retain(|e| {
            let hit = ids.contains(&e.object_id);
            if hit {
                vacated.push(DownstreamSignal::from(e));
            }
            !hit
        });
        vacated
    }
}

/// In-memory store, work queue and live-value source.
pub struct MemoryStore {
    state: Mutex<State>,
    row_locks: Mutex<FxHashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_object_id: 1_000_000,
                next_queue_id: 1,
                ..State::default()
            }),
            row_locks: Mutex::new(FxHashMap::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: ObjectId) -> Arc<tokio::sync::Mutex<()>> {
        self.row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    // ── Setup ──

    pub fn set_catalog(&self, catalog: Catalog) {
        self.state().catalog = catalog;
    }

    pub fn insert_object(&self, object: GraphicObject) {
        self.state().objects.insert(object.id, object);
    }

    pub fn remove_object(&self, id: ObjectId) {
        let mut state = self.state();
        state.objects.remove(&id);
        state.remove_index_rows(&[id].into_iter().collect());
    }

    pub fn set_live_value(&self, namespace: &str, key: &str, value: LiveValue) {
        self.state()
            .live_values
            .insert((namespace.to_string(), key.to_string()), value);
    }

    /// Queues `object_id` for compilation and returns the queue row id.
    pub fn enqueue(&self, object_id: ObjectId) -> i64 {
        let mut state = self.state();
        let id = state.next_queue_id;
        state.next_queue_id += 1;
        state.queue.insert(
            id,
            QueueRow {
                item: CompileQueueItem::new(id, object_id),
                visible_at: Instant::now(),
                last_error: None,
            },
        );
        id
    }

    /// Makes `op` fail until [`MemoryStore::clear_faults`] is called.
    pub fn fail_on(&self, op: StoreOp) {
        self.state().faults.insert(op);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.faults.clear();
        state.short_grid_writes = false;
    }

    /// Makes grid inserts report one row fewer than requested.
    pub fn short_grid_writes(&self) {
        self.state().short_grid_writes = true;
    }

    // ── Inspection ──

    pub fn object(&self, id: ObjectId) -> Option<GraphicObject> {
        self.state().objects.get(&id).cloned()
    }

    /// Objects owned by `owner_id`, ordered by id.
    pub fn children_of(&self, owner_id: ObjectId) -> Vec<GraphicObject> {
        self.state()
            .objects
            .values()
            .filter(|o| o.group_id == Some(owner_id))
            .cloned()
            .collect()
    }

    pub fn grid_entries(&self) -> Vec<GridIndexEntry> {
        self.state().grid.clone()
    }

    pub fn grid_entries_for(&self, object_id: ObjectId) -> Vec<GridIndexEntry> {
        self.state()
            .grid
            .iter()
            .filter(|e| e.object_id == object_id)
            .cloned()
            .collect()
    }

    pub fn location_entries(&self) -> Vec<LocationIndexEntry> {
        self.state().locations.clone()
    }

    /// Downstream recompilation queue, in order.
    pub fn signals(&self) -> Vec<DownstreamSignal> {
        self.state().signals.iter().copied().collect()
    }

    pub fn clear_signals(&self) {
        self.state().signals.clear();
    }

    pub fn queue_rows(&self) -> Vec<QueueRow> {
        self.state().queue.values().cloned().collect()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state().dead_letters.clone()
    }

    /// Number of live-value fetches served.
    pub fn live_fetches(&self) -> usize {
        self.state().live_fetches
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn load_objects(&self, ids: &[ObjectId]) -> Result<Vec<GraphicObject>> {
        let state = self.state();
        state.check(StoreOp::LoadObjects)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.objects.get(id).cloned())
            .collect())
    }

    async fn load_children(
        &self,
        owner_ids: &[ObjectId],
    ) -> Result<FxHashMap<ObjectId, Vec<GraphicObject>>> {
        let state = self.state();
        state.check(StoreOp::LoadObjects)?;
        let owners: FxHashSet<ObjectId> = owner_ids.iter().copied().collect();

        let mut children: FxHashMap<ObjectId, Vec<GraphicObject>> = FxHashMap::default();
        for object in state.objects.values() {
            if let Some(owner) = object.group_id.filter(|g| owners.contains(g)) {
                children.entry(owner).or_default().push(object.clone());
            }
        }
        Ok(children)
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn load_catalog(&self) -> Result<Catalog> {
        Ok(self.state().catalog.clone())
    }
}

#[async_trait]
impl IdAllocator for MemoryStore {
    async fn reserve(&self, count: usize) -> Result<Vec<ObjectId>> {
        let mut state = self.state();
        state.check(StoreOp::Reserve)?;
        let first = state.next_object_id;
        state.next_object_id += count as ObjectId;
        Ok((first..first + count as ObjectId).collect())
    }
}

#[async_trait]
impl LiveValueSource for MemoryStore {
    async fn fetch(&self, namespace: &str, keys: &[String]) -> Result<FxHashMap<String, LiveValue>> {
        let mut state = self.state();
        state.check(StoreOp::FetchLiveValues)?;
        state.live_fetches += 1;
        Ok(keys
            .iter()
            .filter_map(|key| {
                state
                    .live_values
                    .get(&(namespace.to_string(), key.clone()))
                    .map(|v| (key.clone(), v.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            guards: Vec::new(),
            pending: Pending::default(),
        }))
    }
}

#[derive(Default)]
struct Pending {
    retired: FxHashSet<ObjectId>,
    clones: Vec<GraphicObject>,
    target_names: Vec<(ObjectId, String)>,
    deleted: FxHashSet<ObjectId>,
    grid: Vec<GridIndexEntry>,
    locations: Vec<LocationIndexEntry>,
    compiled: Vec<CompiledObject>,
    signals: Vec<DownstreamSignal>,
    dequeued: Vec<i64>,
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    guards: Vec<OwnedMutexGuard<()>>,
    pending: Pending,
}

#[async_trait]
impl IndexTransaction for MemoryTransaction<'_> {
    async fn lock_objects(&mut self, ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        self.store.state().check(StoreOp::LockObjects)?;

        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &id in &sorted {
            let lock = self.store.row_lock(id);
            self.guards.push(lock.lock_owned().await);
        }

        let state = self.store.state();
        Ok(sorted
            .into_iter()
            .filter(|id| state.objects.contains_key(id))
            .collect())
    }

    async fn replace_clones(&mut self, replacement: &CloneReplacement) -> Result<Vec<ObjectId>> {
        let state = self.store.state();
        state.check(StoreOp::ReplaceClones)?;

        let owners: FxHashSet<ObjectId> = replacement.owner_ids.iter().copied().collect();
        let retired: Vec<ObjectId> = state
            .objects
            .values()
            .filter(|o| o.group_id.is_some_and(|g| owners.contains(&g)))
            .map(|o| o.id)
            .collect();

        self.pending.retired.extend(retired.iter().copied());
        self.pending.clones.extend(replacement.clones.iter().cloned());
        self.pending
            .target_names
            .extend(replacement.target_names.iter().cloned());
        Ok(retired)
    }

    async fn delete_index_rows(&mut self, ids: &[ObjectId]) -> Result<Vec<DownstreamSignal>> {
        let state = self.store.state();
        state.check(StoreOp::DeleteIndexRows)?;

        let ids: FxHashSet<ObjectId> = ids.iter().copied().collect();
        let vacated = state
            .grid
            .iter()
            .filter(|e| ids.contains(&e.object_id))
            .map(DownstreamSignal::from)
            .chain(
                state
                    .locations
                    .iter()
                    .filter(|e| ids.contains(&e.object_id))
                    .map(DownstreamSignal::from),
            )
            .collect();
        self.pending.deleted.extend(ids);
        Ok(vacated)
    }

    async fn insert_grid_entries(&mut self, entries: &[GridIndexEntry]) -> Result<u64> {
        let state = self.store.state();
        state.check(StoreOp::InsertGridEntries)?;
        self.pending.grid.extend_from_slice(entries);
        let written = entries.len() as u64;
        if state.short_grid_writes && written > 0 {
            return Ok(written - 1);
        }
        Ok(written)
    }

    async fn insert_location_entries(&mut self, entries: &[LocationIndexEntry]) -> Result<u64> {
        self.store.state().check(StoreOp::InsertLocationEntries)?;
        self.pending.locations.extend_from_slice(entries);
        Ok(entries.len() as u64)
    }

    async fn save_compiled(&mut self, objects: &[CompiledObject]) -> Result<u64> {
        self.store.state().check(StoreOp::SaveCompiled)?;
        self.pending.compiled.extend_from_slice(objects);
        Ok(objects.len() as u64)
    }

    async fn publish_signals(&mut self, signals: &[DownstreamSignal]) -> Result<u64> {
        self.store.state().check(StoreOp::PublishSignals)?;
        self.pending.signals.extend_from_slice(signals);
        Ok(signals.len() as u64)
    }

    async fn dequeue(&mut self, item_ids: &[i64]) -> Result<u64> {
        let state = self.store.state();
        state.check(StoreOp::Dequeue)?;
        self.pending.dequeued.extend_from_slice(item_ids);
        Ok(item_ids.iter().filter(|id| state.queue.contains_key(id)).count() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let store = self.store;
        let mut state = store.state();
        state.check(StoreOp::Commit)?;

        let Pending {
            retired,
            clones,
            target_names,
            deleted,
            grid,
            locations,
            compiled,
            signals,
            dequeued,
        } = self.pending;

        state.objects.retain(|id, _| !retired.contains(id));
        for clone in clones {
            state.objects.insert(clone.id, clone);
        }
        for (pointer_id, name) in target_names {
            if let Some(ObjectKind::GroupPointer(p)) =
                state.objects.get_mut(&pointer_id).map(|o| &mut o.kind)
            {
                p.target_group_name = Some(name);
            }
        }

        state.remove_index_rows(&deleted);
        state.grid.extend(grid);
        state.locations.extend(locations);
        for c in compiled {
            if let Some(object) = state.objects.get_mut(&c.object_id) {
                object.hash_id = Some(c.hash_id);
                object.payload = Some(c.payload);
                object.location = c.location;
            }
        }
        state.signals.extend(signals);
        for id in dequeued {
            state.queue.remove(&id);
        }

        // Row locks are released when the guards drop.
        drop(state);
        drop(self.guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for MemoryStore {
    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<CompileQueueItem>> {
        let mut state = self.state();
        let now = Instant::now();
        let mut claimed = Vec::new();
        for row in state.queue.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if row.visible_at <= now {
                row.visible_at = now + lease;
                claimed.push(row.item.clone());
            }
        }
        Ok(claimed)
    }

    async fn release(&self, items: &[CompileQueueItem], delay: Duration, error: &str) -> Result<()> {
        let mut state = self.state();
        let visible_at = Instant::now() + delay;
        for item in items {
            if let Some(row) = state.queue.get_mut(&item.id) {
                row.item.attempts += 1;
                row.visible_at = visible_at;
                row.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn dead_letter(&self, items: &[CompileQueueItem], error: &str) -> Result<()> {
        let mut state = self.state();
        for item in items {
            if let Some(row) = state.queue.remove(&item.id) {
                let mut item = row.item;
                item.attempts += 1;
                state.dead_letters.push(DeadLetter {
                    item,
                    error: error.to_string(),
                });
            }
        }
        Ok(())
    }
}
