// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::*;
use diagram_compiler::location_bucket;
use diagram_core::{
    field, DownstreamSignal, GraphicObject, GridKey, LinkTarget, LiveLink, LiveValue, ObjectKind,
    Point,
};

fn seed_group(store: &diagram_compiler::memory::MemoryStore, compile_as_template: bool) {
    store.insert_object(group(100, "G", compile_as_template));
    store.insert_object(
        GraphicObject::new(101, MAIN, ObjectKind::Polygon)
            .with_group(100)
            .with_geometry(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]])
            .with_attr(field::FILL_COLOR, 3i64),
    );
    store.insert_object(
        GraphicObject::new(102, MAIN, ObjectKind::Polyline)
            .with_group(100)
            .with_geometry(&[[0.0, 0.0], [5.0, 5.0]])
            .with_attr(field::LINE_WIDTH, 2i64)
            .with_attr(field::SELECTABLE, false),
    );
}

#[tokio::test]
async fn pointer_and_keyed_object_batch() {
    let (store, compiler) = setup();
    seed_group(&store, false);
    store.insert_object(pointer(200, 100, [50.0, 50.0]));
    store.insert_object(
        GraphicObject::new(300, MAIN, ObjectKind::Polyline)
            .with_key("k1")
            .with_geometry(&[[0.0, 0.0]]),
    );

    let items = queue(&store, &[200, 300, 100]);
    let report = compiler.compile_batch(&items).await.unwrap();

    // Two clones, owned by the pointer and offset by its placement point.
    let clones = store.children_of(200);
    assert_eq!(clones.len(), 2);
    assert_eq!(report.clones_created, 2);
    assert_eq!(
        clones[0].geometry,
        vec![
            Point::new(50.0, 50.0),
            Point::new(60.0, 50.0),
            Point::new(60.0, 60.0)
        ]
    );
    assert_eq!(clones[1].geometry, vec![Point::new(50.0, 50.0), Point::new(55.0, 55.0)]);
    assert!(clones.iter().all(|c| c.coord_space_id == MAIN));

    // The pointer records its target's name.
    let ObjectKind::GroupPointer(p) = store.object(200).unwrap().kind else {
        panic!("pointer changed kind");
    };
    assert_eq!(p.target_group_name.as_deref(), Some("1|G"));

    // One location row, for the keyed object.
    let locations = store.location_entries();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].object_id, 300);
    assert_eq!(locations[0].index_bucket, location_bucket(NAMESPACE, "k1", BUCKETS));
    let located = store.object(300).unwrap().location.unwrap();
    assert_eq!((located.x, located.y), (10.0, 10.0));

    // Grid rows for the keyed object, both clones and the pointer; the
    // plain group gets none.
    for clone in &clones {
        assert_eq!(store.grid_entries_for(clone.id).len(), 1);
    }
    assert_eq!(store.grid_entries_for(300).len(), 1);
    assert_eq!(store.grid_entries_for(200).len(), 1);
    assert!(store.grid_entries_for(100).is_empty());

    // Every row lands in the same cell, so one grid and one location signal.
    let signals = store.signals();
    assert_eq!(signals.len(), 2);
    assert!(signals.contains(&DownstreamSignal::Grid {
        coord_space_id: MAIN,
        grid_key: GridKey::Cell {
            coord_space_id: MAIN,
            level: 0,
            x: 0,
            y: 0
        }
    }));
    assert!(signals.iter().any(|s| matches!(s, DownstreamSignal::Location { model_set_id: 1, .. })));

    assert!(store.queue_rows().is_empty());
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn template_group_embeds_children() {
    let (store, compiler) = setup();
    seed_group(&store, true);

    let report = compiler.compile_batch(&queue(&store, &[100])).await.unwrap();
    assert_eq!(report.templates_packed, 1);

    let compiled = store.object(100).unwrap();
    let payload: serde_json::Value = serde_json::from_str(compiled.payload.as_deref().unwrap()).unwrap();
    let children = payload[field::CHILDREN].as_array().unwrap();
    assert_eq!(children.len(), 2);

    // Scaled by 2, offset by 10.
    assert_eq!(children[0][field::GEOMETRY], serde_json::json!([[10.0, 10.0], [30.0, 10.0], [30.0, 30.0]]));
    assert_eq!(children[1][field::GEOMETRY], serde_json::json!([[10.0, 10.0], [20.0, 20.0]]));
    assert_eq!(children[0][field::FILL_COLOR], 3);
    // Stripped: no nulls, no false values.
    assert!(children[1].get(field::SELECTABLE).is_none());
    assert!(children[1].get(field::KEY).is_none());

    assert_eq!(payload[field::HASH].as_str(), compiled.hash_id.as_deref());

    let rows = store.grid_entries_for(100);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].grid_key, GridKey::Template { coord_space_id: MAIN });
}

#[tokio::test]
async fn edge_templates_share_the_template_key() {
    let (store, compiler) = setup();
    store.insert_object(GraphicObject::new(
        5,
        MAIN,
        ObjectKind::EdgeTemplate {
            name: "feeder".into(),
        },
    ));
    store.insert_object(group(6, "T", true));

    compiler.compile_batch(&queue(&store, &[5, 6])).await.unwrap();

    let template = GridKey::Template { coord_space_id: MAIN };
    assert_eq!(store.grid_entries_for(5)[0].grid_key, template);
    assert_eq!(store.grid_entries_for(6)[0].grid_key, template);
    assert_eq!(store.signals().len(), 1);
}

#[tokio::test]
async fn recompiling_a_pointer_replaces_its_clones() {
    let (store, compiler) = setup();
    seed_group(&store, false);
    store.insert_object(pointer(200, 100, [5.0, -5.0]));

    compiler.compile_batch(&queue(&store, &[200])).await.unwrap();
    let first = store.children_of(200);

    compiler.compile_batch(&queue(&store, &[200])).await.unwrap();
    let second = store.children_of(200);

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    for (a, b) in first.iter().zip(&second) {
        assert_ne!(a.id, b.id);
        assert_eq!(a.geometry, b.geometry);
        assert_eq!(a.hash_id, b.hash_id);
    }
    // Rows of the first generation are gone.
    for old in &first {
        assert!(store.grid_entries_for(old.id).is_empty());
        assert!(store.object(old.id).is_none());
    }
}

#[tokio::test]
async fn dangling_pointer_is_skipped_and_keeps_its_rows() {
    let (store, compiler) = setup();
    seed_group(&store, false);
    store.insert_object(pointer(200, 100, [0.0, 0.0]));
    compiler.compile_batch(&queue(&store, &[200])).await.unwrap();
    let before = store.grid_entries_for(200);
    assert_eq!(before.len(), 1);

    store.remove_object(101);
    store.remove_object(102);
    store.insert_object(GraphicObject::new(400, MAIN, ObjectKind::Polyline).with_geometry(&[[1.0, 1.0]]));

    let report = compiler.compile_batch(&queue(&store, &[200, 400])).await.unwrap();

    assert!(report.was_skipped(200));
    assert_eq!(store.grid_entries_for(200), before);
    assert!(store.children_of(200).is_empty());
    assert_eq!(store.grid_entries_for(400).len(), 1);
    assert!(store.queue_rows().is_empty());
}

#[tokio::test]
async fn bad_scale_skips_only_that_object() {
    let (store, compiler) = setup();
    store.insert_object(GraphicObject::new(1, BROKEN, ObjectKind::Polygon).with_geometry(&[[0.0, 0.0]]));
    store.insert_object(GraphicObject::new(2, MAIN, ObjectKind::Polygon).with_geometry(&[[0.0, 0.0]]));

    let report = compiler.compile_batch(&queue(&store, &[1, 2])).await.unwrap();

    assert!(report.was_skipped(1));
    assert_eq!(report.objects_compiled, 1);
    assert!(store.grid_entries_for(1).is_empty());
    assert!(store.object(1).unwrap().payload.is_none());
    assert_eq!(store.grid_entries_for(2).len(), 1);
}

#[tokio::test]
async fn object_spanning_too_many_cells_is_skipped() {
    let (store, compiler) = setup();
    store.insert_object(
        GraphicObject::new(1, FINE, ObjectKind::Polyline).with_geometry(&[[0.0, 0.0], [1.0e7, 1.0e7]]),
    );
    store.insert_object(GraphicObject::new(2, FINE, ObjectKind::Polyline).with_geometry(&[[5.0, 5.0]]));

    let report = compiler.compile_batch(&queue(&store, &[1, 2])).await.unwrap();

    assert!(report.was_skipped(1));
    assert!(store.grid_entries_for(1).is_empty());
    assert_eq!(store.grid_entries_for(2).len(), 1);
    assert!(store.queue_rows().is_empty());
}

#[tokio::test]
async fn live_values_are_fetched_once_per_namespace() {
    let (store, compiler) = setup();
    store.set_live_value(
        NAMESPACE,
        "sw1.state",
        LiveValue {
            raw: Some("closed".into()),
            display: Some("Closed".into()),
            color_id: Some(7),
        },
    );
    store.insert_object(
        GraphicObject::new(1, MAIN, ObjectKind::Polygon)
            .with_geometry(&[[0.0, 0.0]])
            .with_link(LiveLink::new("sw1.state", LinkTarget::FillColor)),
    );
    store.insert_object(
        GraphicObject::new(2, FINE, ObjectKind::Polyline)
            .with_geometry(&[[0.0, 0.0]])
            .with_attr(field::TEXT, "old")
            .with_link(LiveLink::new("sw1.state", LinkTarget::Text).with_format("SW1 {}"))
            .with_link(LiveLink::new("missing", LinkTarget::LineColor)),
    );

    let report = compiler.compile_batch(&queue(&store, &[1, 2])).await.unwrap();

    assert_eq!(store.live_fetches(), 1);
    assert_eq!(report.live_values_applied, 2);

    let payload = |id| -> serde_json::Value {
        serde_json::from_str(store.object(id).unwrap().payload.as_deref().unwrap()).unwrap()
    };
    assert_eq!(payload(1)[field::FILL_COLOR], 7);
    assert_eq!(payload(2)[field::TEXT], "SW1 Closed");
    // Geometry is untouched by the overlay.
    assert_eq!(store.object(2).unwrap().geometry, vec![Point::new(0.0, 0.0)]);
}

#[tokio::test]
async fn moving_an_object_signals_the_cell_it_left() {
    let (store, compiler) = setup();
    store.insert_object(GraphicObject::new(1, FINE, ObjectKind::Polyline).with_geometry(&[[5.0, 5.0]]));
    compiler.compile_batch(&queue(&store, &[1])).await.unwrap();
    store.clear_signals();

    store.insert_object(GraphicObject::new(1, FINE, ObjectKind::Polyline).with_geometry(&[[25.0, 5.0]]));
    compiler.compile_batch(&queue(&store, &[1])).await.unwrap();

    let cell = |x| DownstreamSignal::Grid {
        coord_space_id: FINE,
        grid_key: GridKey::Cell {
            coord_space_id: FINE,
            level: 0,
            x,
            y: 0,
        },
    };
    assert_eq!(store.signals(), vec![cell(0), cell(2)]);
    assert_eq!(store.grid_entries_for(1).len(), 1);
}

#[tokio::test]
async fn identical_objects_share_a_hash() {
    let (store, compiler) = setup();
    for id in [1, 2] {
        store.insert_object(
            GraphicObject::new(id, MAIN, ObjectKind::Polyline)
                .with_geometry(&[[1.0, 2.0], [3.0, 4.0]])
                .with_attr(field::LINE_COLOR, 4i64),
        );
    }
    store.insert_object(
        GraphicObject::new(3, MAIN, ObjectKind::Polyline)
            .with_geometry(&[[1.0, 2.0], [3.0, 4.0]])
            .with_attr(field::LINE_COLOR, 5i64),
    );

    compiler.compile_batch(&queue(&store, &[1, 2, 3])).await.unwrap();

    let hash = |id| store.object(id).unwrap().hash_id.unwrap();
    assert_eq!(hash(1), hash(2));
    assert_ne!(hash(1), hash(3));
}

#[tokio::test]
async fn labels_cover_their_text_extent() {
    let (store, compiler) = setup();
    store.insert_object(
        GraphicObject::new(
            1,
            FINE,
            ObjectKind::Text(diagram_core::TextShape {
                text_style_id: 1,
                h_align: -1,
                v_align: -1,
                ..Default::default()
            }),
        )
        .with_geometry(&[[1.0, 15.0]])
        .with_attr(field::TEXT, "ABCDEFGH"),
    );

    compiler.compile_batch(&queue(&store, &[1])).await.unwrap();

    // 8 glyphs * 10 * 0.6 = 48 wide, 10 tall above the anchor:
    // x 1..49 -> cells 0..4, y 5..15 -> cells 0..1
    assert_eq!(store.grid_entries_for(1).len(), 10);
}
