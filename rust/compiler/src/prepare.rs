// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scaling stage.
//!
//! Scales each object once into its coordinate space and keeps the result
//! alongside the object for every later stage.

use diagram_core::{field, AttrMap, AttrValue, Catalog, GraphicObject, Point, Result};
use diagram_geometry::{object_envelope, Envelope, ScaleParams};

/// An object with its scaled geometry and compact attributes.
#[derive(Debug, Clone)]
pub struct PreparedObject {
    pub object: GraphicObject,
    /// Device-space points. Empty for groups and edge templates.
    pub scaled: Vec<Point>,
    /// Drawn extent of `scaled`; invalid when there is no geometry.
    pub envelope: Envelope,
    /// Compact attributes, including the scaled geometry.
    pub attrs: AttrMap,
}

/// Scales `object` and builds its compact attributes.
pub fn prepare(object: GraphicObject, catalog: &Catalog) -> Result<PreparedObject> {
    let space = catalog.coord_space(object.coord_space_id)?;

    let (scaled, envelope) = if object.kind.has_geometry() {
        let params = ScaleParams::for_space(space)?;
        let scaled: Vec<Point> = object.geometry.iter().map(|&p| params.apply(p)).collect();
        let envelope = object_envelope(&object, &scaled, &params, catalog)?;
        (scaled, envelope)
    } else {
        (Vec::new(), Envelope::new())
    };

    let mut attrs = object.compact_attrs();
    if !scaled.is_empty() {
        attrs.insert(field::GEOMETRY.to_string(), geometry_value(&scaled));
    }

    Ok(PreparedObject {
        object,
        scaled,
        envelope,
        attrs,
    })
}

/// Geometry as a list of `[x, y]` pairs.
pub fn geometry_value(points: &[Point]) -> AttrValue {
    AttrValue::List(
        points
            .iter()
            .map(|p| AttrValue::List(vec![AttrValue::Double(p.x), AttrValue::Double(p.y)]))
            .collect(),
    )
}
