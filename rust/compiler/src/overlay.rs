// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live value overlay.
//!
//! Objects are grouped by the model namespace owning their coordinate space
//! and each namespace is fetched once, with the union of every key its
//! objects link to. Geometry is never touched.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use diagram_core::{Catalog, GraphicObject, Result};
use tracing::debug;

use crate::store::LiveValueSource;

/// Applies live values to `objects` and returns the number of attributes
/// that changed.
///
/// Objects in a coordinate space the catalog does not know are left alone;
/// they are reported when they fail to scale.
pub async fn apply_live_values(
    source: &dyn LiveValueSource,
    objects: &mut [GraphicObject],
    catalog: &Catalog,
) -> Result<usize> {
    let start = Instant::now();

    // namespace -> (object indices, keys)
    let mut by_namespace: BTreeMap<&str, (Vec<usize>, BTreeSet<String>)> = BTreeMap::new();
    for (i, object) in objects.iter().enumerate() {
        if object.live_links.is_empty() {
            continue;
        }
        let Ok(namespace) = catalog.namespace_for(object.coord_space_id) else {
            continue;
        };
        let entry = by_namespace.entry(namespace.name.as_str()).or_default();
        entry.0.push(i);
        entry
            .1
            .extend(object.live_links.iter().map(|l| l.live_key.clone()));
    }

    let mut applied = 0;
    let mut fetches = 0;

    for (namespace, (indices, keys)) in by_namespace {
        let keys: Vec<String> = keys.into_iter().collect();
        let values = source.fetch(namespace, &keys).await?;
        fetches += 1;

        for i in indices {
            let object = &mut objects[i];
            for link in &object.live_links {
                if let Some(value) = values.get(&link.live_key) {
                    if link.apply(value, &mut object.attrs) {
                        applied += 1;
                    }
                }
            }
        }
    }

    debug!(
        objects = objects.len(),
        fetches,
        applied,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Applied live values"
    );

    Ok(applied)
}
