// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The batch pipeline.
//!
//! ```text
//! queue items -> clones -> load -> live values -> scale -> templates
//!             -> {grid, location} (parallel) -> hash/payload -> commit
//! ```
//!
//! Per-object errors drop only the failing object. Anything else aborts the
//! batch before the commit transaction is opened, or rolls it back.

use std::sync::Arc;
use std::time::Instant;

use diagram_core::{
    item_ids, unique_object_ids, Catalog, CompileQueueItem, Error, GridIndexEntry, ObjectId, Result,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::clone::resolve_clones;
use crate::commit::{commit_batch, CommitBatch};
use crate::indexer::{grid_entries, location_entry, Located};
use crate::overlay::apply_live_values;
use crate::packer::pack;
use crate::prepare::{prepare, PreparedObject};
use crate::report::{CompileReport, SkippedObject};
use crate::store::{CatalogSource, IdAllocator, IndexStore, LiveValueSource, ObjectStore};
use crate::template::pack_templates;

/// Tunables of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Number of location index buckets per model namespace.
    pub location_bucket_count: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            location_bucket_count: 8192,
        }
    }
}

/// Compiles queued objects into index rows and payloads.
#[derive(Clone)]
pub struct Compiler {
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogSource>,
    allocator: Arc<dyn IdAllocator>,
    index: Arc<dyn IndexStore>,
    live_values: Arc<dyn LiveValueSource>,
    options: CompileOptions,
}

struct Indexed {
    prepared: PreparedObject,
    grid: Vec<GridIndexEntry>,
    location: Option<Located>,
}

impl Compiler {
    /// Builds a compiler over one backing store and a separate live-value
    /// source.
    pub fn new<S>(store: Arc<S>, live_values: Arc<dyn LiveValueSource>, options: CompileOptions) -> Self
    where
        S: ObjectStore + CatalogSource + IdAllocator + IndexStore + 'static,
    {
        Self {
            objects: store.clone(),
            catalog: store.clone(),
            allocator: store.clone(),
            index: store,
            live_values,
            options,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles one claimed batch and commits it.
    pub async fn compile_batch(&self, items: &[CompileQueueItem]) -> Result<CompileReport> {
        let start = Instant::now();
        let mut report = CompileReport {
            queue_items: items.len(),
            ..CompileReport::default()
        };

        let catalog = self.catalog.load_catalog().await?;

        let cloned = resolve_clones(
            self.objects.as_ref(),
            self.allocator.as_ref(),
            &unique_object_ids(items),
        )
        .await?;
        report.skipped.extend(cloned.skipped);

        let mut objects = self.objects.load_objects(&cloned.ids).await?;
        objects.extend(cloned.replacement.clones.iter().cloned());

        report.live_values_applied =
            apply_live_values(self.live_values.as_ref(), &mut objects, &catalog).await?;

        let mut prepared = Vec::with_capacity(objects.len());
        for object in objects {
            let id = object.id;
            match prepare(object, &catalog) {
                Ok(p) => prepared.push(p),
                Err(err) => skip(&mut report, id, err)?,
            }
        }

        report.templates_packed =
            pack_templates(self.objects.as_ref(), &mut prepared, &catalog).await?;

        let indexed = self.index_all(prepared, &catalog, &mut report)?;

        let mut batch = CommitBatch {
            clones: cloned.replacement,
            queue_item_ids: item_ids(items),
            ..CommitBatch::default()
        };
        for Indexed {
            mut prepared,
            grid,
            location,
        } in indexed
        {
            let descriptor = location.as_ref().map(|l| l.descriptor);
            batch.compiled.push(pack(&mut prepared, descriptor)?);
            batch.object_ids.push(prepared.object.id);
            batch.grid.extend(grid);
            batch.locations.extend(location.map(|l| l.entry));
        }
        report.objects_compiled = batch.object_ids.len();

        let summary = commit_batch(self.index.as_ref(), batch).await?;
        report.clones_created = summary.clones_inserted;
        report.grid_rows = summary.grid_rows;
        report.location_rows = summary.location_rows;
        report.signals_published = summary.signals_published;
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            queue_items = report.queue_items,
            objects = report.objects_compiled,
            clones = report.clones_created,
            skipped = report.skipped.len(),
            grid_rows = report.grid_rows,
            location_rows = report.location_rows,
            signals = report.signals_published,
            elapsed_ms = report.elapsed_ms,
            "Compiled batch"
        );

        Ok(report)
    }

    /// Runs both indexers over the batch in parallel.
    fn index_all(
        &self,
        prepared: Vec<PreparedObject>,
        catalog: &Catalog,
        report: &mut CompileReport,
    ) -> Result<Vec<Indexed>> {
        let start = Instant::now();
        let bucket_count = self.options.location_bucket_count;

        let results: Vec<(ObjectId, Result<Indexed>)> = prepared
            .into_par_iter()
            .map(|prepared| {
                let id = prepared.object.id;
                let indexed = grid_entries(&prepared, catalog).and_then(|grid| {
                    let location = location_entry(&prepared, catalog, bucket_count)?;
                    Ok(Indexed {
                        prepared,
                        grid,
                        location,
                    })
                });
                (id, indexed)
            })
            .collect();

        let mut indexed = Vec::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(i) => indexed.push(i),
                Err(err) => skip(report, id, err)?,
            }
        }

        debug!(
            objects = indexed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed batch"
        );
        Ok(indexed)
    }
}

/// Records an object-scoped error, or hands back any other error.
fn skip(report: &mut CompileReport, object_id: ObjectId, err: Error) -> Result<()> {
    if !err.is_object_scoped() {
        return Err(err);
    }
    warn!(object_id, error = %err, "Object skipped");
    report.skipped.push(SkippedObject::new(object_id, &err));
    Ok(())
}
