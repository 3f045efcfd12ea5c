// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::sync::Arc;

use diagram_compiler::memory::MemoryStore;
use diagram_compiler::{CompileOptions, Compiler};
use diagram_core::{
    Catalog, CompileQueueItem, CoordinateSpace, GraphicObject, GridLevel, ModelNamespace,
    ObjectId, ObjectKind, PlacementPointer, Point, TemplateGroup, TextStyle,
};

pub const NAMESPACE: &str = "network";
pub const BUCKETS: u32 = 1024;

/// Space 1: scale 2, offset (10, 10), one coarse grid level.
pub const MAIN: i32 = 1;
/// Space 2: no scale configured.
pub const BROKEN: i32 = 2;
/// Space 3: unit scale, fine 10-unit cells.
pub const FINE: i32 = 3;

pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_namespace(ModelNamespace {
        id: 1,
        name: NAMESPACE.into(),
    });
    catalog.add_coord_space(CoordinateSpace {
        id: MAIN,
        name: "overview".into(),
        model_set_id: 1,
        scale: Some(2.0),
        offset: Some(Point::new(10.0, 10.0)),
        grid_levels: vec![GridLevel {
            key: 0,
            cell_size: 1000.0,
            min_zoom: 0.0,
            max_zoom: 100.0,
        }],
    });
    catalog.add_coord_space(CoordinateSpace {
        id: BROKEN,
        name: "unscaled".into(),
        model_set_id: 1,
        scale: None,
        offset: Some(Point::default()),
        grid_levels: Vec::new(),
    });
    catalog.add_coord_space(CoordinateSpace {
        id: FINE,
        name: "detail".into(),
        model_set_id: 1,
        scale: Some(1.0),
        offset: Some(Point::default()),
        grid_levels: vec![GridLevel {
            key: 0,
            cell_size: 10.0,
            min_zoom: 0.0,
            max_zoom: 100.0,
        }],
    });
    catalog.add_text_style(TextStyle {
        id: 1,
        font_size: 10.0,
        scale_factor: 1.0,
    });
    catalog
}

pub fn setup() -> (Arc<MemoryStore>, Compiler) {
    let store = Arc::new(MemoryStore::new());
    store.set_catalog(catalog());
    let compiler = Compiler::new(
        store.clone(),
        store.clone(),
        CompileOptions {
            location_bucket_count: BUCKETS,
        },
    );
    (store, compiler)
}

pub fn group(id: ObjectId, name: &str, compile_as_template: bool) -> GraphicObject {
    GraphicObject::new(
        id,
        MAIN,
        ObjectKind::Group(TemplateGroup {
            name: name.into(),
            compile_as_template,
        }),
    )
}

pub fn pointer(id: ObjectId, target: ObjectId, at: [f64; 2]) -> GraphicObject {
    GraphicObject::new(
        id,
        MAIN,
        ObjectKind::GroupPointer(PlacementPointer {
            target_group_id: Some(target),
            target_group_name: None,
        }),
    )
    .with_geometry(&[at])
}

/// Queues every object id and claims them as one batch.
pub fn queue(store: &MemoryStore, ids: &[ObjectId]) -> Vec<CompileQueueItem> {
    ids.iter()
        .map(|&id| {
            let row = store.enqueue(id);
            CompileQueueItem::new(row, id)
        })
        .collect()
}
