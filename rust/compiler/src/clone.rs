// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Clone resolution for placement pointers.
//!
//! Every pointer in the batch that targets a template group gets a fresh
//! generation of clones: each current child of the target group is copied,
//! offset by the pointer's placement point and re-owned by the pointer. Ids
//! are fresh on every run, shapes are not.
//!
//! Nothing is written here. The previous generation is retired and the new
//! one inserted by the commit, in the same transaction as the index rows.

use std::time::Instant;

use diagram_core::{Error, GraphicObject, ObjectId, ObjectKind, Point, Result};
use diagram_geometry::translate;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::report::SkippedObject;
use crate::store::{CloneReplacement, IdAllocator, ObjectStore};

/// What clone resolution produced for a batch.
#[derive(Debug, Default)]
pub struct CloneOutcome {
    /// Stored ids to compile: the input minus skipped pointers. The clones
    /// are not stored yet and live in `replacement`.
    pub ids: Vec<ObjectId>,
    pub replacement: CloneReplacement,
    pub skipped: Vec<SkippedObject>,
}

/// Builds the clone of `child` placed by `pointer`. The id is assigned later.
pub fn clone_child(child: &GraphicObject, pointer: &GraphicObject, id: ObjectId) -> GraphicObject {
    let placement = pointer.geometry.first().copied().unwrap_or(Point::default());

    let mut clone = child.clone();
    clone.id = id;
    clone.group_id = Some(pointer.id);
    clone.coord_space_id = pointer.coord_space_id;
    clone.geometry = translate(&child.geometry, placement);
    clone.import_group_hash = pointer.import_group_hash.clone();
    clone.hash_id = None;
    clone.payload = None;
    clone.location = None;
    clone
}

/// Name recorded on a pointer for its target group.
pub fn target_name(group: &GraphicObject, name: &str) -> String {
    format!("{}|{}", group.coord_space_id, name)
}

/// Resolves clones for the pointers among `ids`.
pub async fn resolve_clones(
    objects: &dyn ObjectStore,
    allocator: &dyn IdAllocator,
    ids: &[ObjectId],
) -> Result<CloneOutcome> {
    let start = Instant::now();

    let pointers: Vec<GraphicObject> = objects
        .load_objects(ids)
        .await?
        .into_iter()
        .filter(|o| matches!(&o.kind, ObjectKind::GroupPointer(p) if p.target_group_id.is_some()))
        .collect();

    if pointers.is_empty() {
        return Ok(CloneOutcome {
            ids: ids.to_vec(),
            ..CloneOutcome::default()
        });
    }

    let mut target_ids: Vec<ObjectId> = pointers.iter().filter_map(target_of).collect();
    target_ids.sort_unstable();
    target_ids.dedup();

    let groups: FxHashMap<ObjectId, GraphicObject> = objects
        .load_objects(&target_ids)
        .await?
        .into_iter()
        .filter(|o| o.kind.as_group().is_some())
        .map(|o| (o.id, o))
        .collect();
    let children = objects.load_children(&target_ids).await?;

    let mut skipped = Vec::new();
    let mut skipped_ids = FxHashSet::default();
    let mut clones = Vec::new();
    let mut target_names = Vec::new();

    for pointer in &pointers {
        let Some(group_id) = target_of(pointer) else {
            continue;
        };

        let group = groups.get(&group_id);
        let group_children = children.get(&group_id).filter(|c| !c.is_empty());

        let (Some(group), Some(group_children)) = (group, group_children) else {
            let err = Error::DanglingReference {
                pointer_id: pointer.id,
                group_id,
            };
            warn!(pointer_id = pointer.id, group_id, "{}", err);
            skipped_ids.insert(pointer.id);
            skipped.push(SkippedObject::new(pointer.id, &err));
            continue;
        };

        if let Some(name) = group.kind.as_group().map(|g| g.name.as_str()) {
            target_names.push((pointer.id, target_name(group, name)));
        }

        let mut sorted: Vec<&GraphicObject> = group_children.iter().collect();
        sorted.sort_by_key(|c| c.id);
        clones.extend(sorted.into_iter().map(|child| clone_child(child, pointer, 0)));
    }

    if !clones.is_empty() {
        let fresh = allocator.reserve(clones.len()).await?;
        if fresh.len() != clones.len() {
            return Err(Error::InvariantViolation(format!(
                "reserved {} ids for {} clones",
                fresh.len(),
                clones.len()
            )));
        }
        for (clone, id) in clones.iter_mut().zip(fresh) {
            clone.id = id;
        }
    }

    let mut owner_ids: Vec<ObjectId> = pointers.iter().map(|p| p.id).collect();
    owner_ids.sort_unstable();
    owner_ids.dedup();

    let out_ids: Vec<ObjectId> = ids
        .iter()
        .copied()
        .filter(|id| !skipped_ids.contains(id))
        .collect();

    debug!(
        pointers = pointers.len(),
        clones = clones.len(),
        skipped = skipped.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Resolved placement clones"
    );

    Ok(CloneOutcome {
        ids: out_ids,
        replacement: CloneReplacement {
            owner_ids,
            clones,
            target_names,
        },
        skipped,
    })
}

fn target_of(pointer: &GraphicObject) -> Option<ObjectId> {
    pointer.kind.as_pointer().and_then(|p| p.target_group_id)
}
