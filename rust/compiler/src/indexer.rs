// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid and location indexers.
//!
//! Both are pure functions of a prepared object and the catalog, so a batch
//! is indexed in parallel.

use diagram_core::{
    Catalog, GraphicObject, GridIndexEntry, LocationDescriptor, LocationIndexEntry, ObjectKind,
    Result,
};
use diagram_geometry::{grid_keys_for_envelope, representative_point, template_key};
use xxhash_rust::xxh3::xxh3_64;

use crate::prepare::PreparedObject;

/// Stable 64-bit hash of a business key within a namespace.
pub fn stable_hash(namespace: &str, key: &str) -> u64 {
    xxh3_64(format!("{}:{}", namespace, key).as_bytes())
}

/// Location bucket of a business key.
pub fn location_bucket(namespace: &str, key: &str, bucket_count: u32) -> u32 {
    (stable_hash(namespace, key) % u64::from(bucket_count.max(1))) as u32
}

/// Grid rows for one object.
///
/// Template groups flagged for inline compilation and edge templates get
/// the single template key of their coordinate space. Other groups get
/// nothing. Everything else gets one row per overlapped cell per grid level,
/// restricted to levels visible at the object's display level.
pub fn grid_entries(prepared: &PreparedObject, catalog: &Catalog) -> Result<Vec<GridIndexEntry>> {
    let object = &prepared.object;
    let entry = |grid_key| GridIndexEntry {
        object_id: object.id,
        coord_space_id: object.coord_space_id,
        grid_key,
        import_group_hash: object.import_group_hash.clone(),
    };

    if object.kind.uses_template_key() {
        return Ok(vec![entry(template_key(object.coord_space_id))]);
    }
    if matches!(object.kind, ObjectKind::Group(_)) || !prepared.envelope.is_valid() {
        return Ok(Vec::new());
    }

    let space = catalog.coord_space(object.coord_space_id)?;
    let zoom = object
        .level_id
        .and_then(|id| catalog.level(id))
        .map(|level| (level.min_zoom, level.max_zoom));

    Ok(grid_keys_for_envelope(space, &prepared.envelope, zoom)?
        .into_iter()
        .map(entry)
        .collect())
}

/// A location row together with the descriptor written back onto the object.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub entry: LocationIndexEntry,
    pub descriptor: LocationDescriptor,
}

/// Location row for an object with a business key and geometry.
pub fn location_entry(
    prepared: &PreparedObject,
    catalog: &Catalog,
    bucket_count: u32,
) -> Result<Option<Located>> {
    let object: &GraphicObject = &prepared.object;
    let Some(key) = object.key.as_deref() else {
        return Ok(None);
    };
    let Some(point) = representative_point(&object.kind, &prepared.scaled) else {
        return Ok(None);
    };

    let namespace = catalog.namespace_for(object.coord_space_id)?;

    Ok(Some(Located {
        entry: LocationIndexEntry {
            object_id: object.id,
            model_set_id: namespace.id,
            index_bucket: location_bucket(&namespace.name, key, bucket_count),
        },
        descriptor: LocationDescriptor {
            coord_space_id: object.coord_space_id,
            object_id: object.id,
            x: point.x,
            y: point.y,
        },
    }))
}
