// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Batch compile results.

use diagram_core::{Error, ObjectId};
use serde::Serialize;

/// An object left out of a batch because of an object-scoped error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedObject {
    pub object_id: ObjectId,
    pub reason: String,
}

impl SkippedObject {
    pub fn new(object_id: ObjectId, err: &Error) -> Self {
        Self {
            object_id,
            reason: err.to_string(),
        }
    }
}

/// Counts for one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileReport {
    pub queue_items: usize,
    pub objects_compiled: usize,
    pub clones_created: usize,
    pub templates_packed: usize,
    pub live_values_applied: usize,
    pub grid_rows: u64,
    pub location_rows: u64,
    pub signals_published: u64,
    pub skipped: Vec<SkippedObject>,
    pub elapsed_ms: u64,
}

impl CompileReport {
    pub fn was_skipped(&self, object_id: ObjectId) -> bool {
        self.skipped.iter().any(|s| s.object_id == object_id)
    }
}
