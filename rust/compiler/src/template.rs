// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Template packing.
//!
//! A group flagged to compile as a template carries every current child
//! inline, so renderers can draw a placement without further queries. The
//! children are loaded from the store rather than taken from the batch, since
//! the batch may hold only some of them.

use std::time::Instant;

use diagram_core::{field, strip_attrs, AttrValue, Catalog, ObjectId, Result};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::prepare::{prepare, PreparedObject};
use crate::store::ObjectStore;

/// Embeds children into every template group in `batch`. Returns the number
/// of groups packed.
pub async fn pack_templates(
    objects: &dyn ObjectStore,
    batch: &mut [PreparedObject],
    catalog: &Catalog,
) -> Result<usize> {
    let start = Instant::now();

    let group_ids: Vec<ObjectId> = batch
        .iter()
        .filter(|p| p.object.kind.as_group().is_some_and(|g| g.compile_as_template))
        .map(|p| p.object.id)
        .collect();

    if group_ids.is_empty() {
        return Ok(0);
    }

    let children = objects.load_children(&group_ids).await?;

    // Children already in the batch carry their live values.
    let in_batch: FxHashMap<ObjectId, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, p)| (p.object.id, i))
        .collect();

    let mut packed_groups = Vec::with_capacity(group_ids.len());
    for &group_id in &group_ids {
        let mut members = children.get(&group_id).cloned().unwrap_or_default();
        members.sort_by_key(|c| c.id);

        let mut packed = Vec::with_capacity(members.len());
        for child in members {
            let entry = match in_batch.get(&child.id) {
                Some(&i) => strip_attrs(&batch[i].attrs),
                None => match prepare(child, catalog) {
                    Ok(prepared) => strip_attrs(&prepared.attrs),
                    Err(err) if err.is_object_scoped() => {
                        warn!(group_id, error = %err, "Template child left out of group");
                        continue;
                    }
                    Err(err) => return Err(err),
                },
            };
            packed.push(AttrValue::Map(entry));
        }
        packed_groups.push((group_id, packed));
    }

    for (group_id, packed) in packed_groups {
        if let Some(&i) = in_batch.get(&group_id) {
            batch[i]
                .attrs
                .insert(field::CHILDREN.to_string(), AttrValue::List(packed));
        }
    }

    debug!(
        groups = group_ids.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Packed template groups"
    );

    Ok(group_ids.len())
}
