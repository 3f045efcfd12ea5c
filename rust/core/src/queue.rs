// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile queue items.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// A pending request to compile one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileQueueItem {
    /// Queue row id, used to acknowledge the item.
    pub id: i64,
    pub object_id: ObjectId,
    /// Number of failed deliveries so far.
    pub attempts: u32,
}

impl CompileQueueItem {
    pub fn new(id: i64, object_id: ObjectId) -> Self {
        Self {
            id,
            object_id,
            attempts: 0,
        }
    }
}

/// Distinct object ids of a claimed batch, in first-seen order.
pub fn unique_object_ids(items: &[CompileQueueItem]) -> Vec<ObjectId> {
    let mut seen = FxHashSet::default();
    items
        .iter()
        .filter(|item| seen.insert(item.object_id))
        .map(|item| item.object_id)
        .collect()
}

/// Queue row ids of a claimed batch.
pub fn item_ids(items: &[CompileQueueItem]) -> Vec<i64> {
    items.iter().map(|item| item.id).collect()
}
