// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Where an object sits and how much of the space it covers.

use diagram_core::{Catalog, GraphicObject, ObjectKind, Point, Result};

use crate::envelope::Envelope;
use crate::scale::ScaleParams;
use crate::text::{measure, text_envelope};

const AREA_EPSILON: f64 = 1e-12;

/// Centroid of a closed ring by the shoelace formula.
///
/// Returns `None` for fewer than three points or a ring with no area.
pub fn ring_centroid(points: &[Point]) -> Option<Point> {
    if points.len() < 3 {
        return None;
    }

    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        let cross = a.x * b.y - b.x * a.y;
        twice_area += cross;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }

    if twice_area.abs() < AREA_EPSILON {
        return None;
    }

    let factor = 1.0 / (3.0 * twice_area);
    Some(Point::new(cx * factor, cy * factor))
}

/// The point an object is located by: the centroid of the ring for area
/// objects, the first point for everything else.
pub fn representative_point(kind: &ObjectKind, scaled: &[Point]) -> Option<Point> {
    let first = *scaled.first()?;
    if !kind.is_area() {
        return Some(first);
    }
    Some(ring_centroid(scaled).unwrap_or_else(|| Envelope::from_points(scaled).centroid()))
}

/// Envelope of an object's scaled geometry including its drawn extent.
///
/// Ellipses grow by their scaled radii and labels by their measured text
/// block. Objects without geometry produce an invalid envelope.
pub fn object_envelope(
    object: &GraphicObject,
    scaled: &[Point],
    params: &ScaleParams,
    catalog: &Catalog,
) -> Result<Envelope> {
    let points = Envelope::from_points(scaled);
    if !points.is_valid() {
        return Ok(points);
    }

    let env = match &object.kind {
        ObjectKind::Ellipse(shape) => {
            let (mut rx, mut ry) = (params.length(shape.x_radius), params.length(shape.y_radius));
            if shape.rotation % 180.0 != 0.0 {
                let r = rx.abs().max(ry.abs());
                rx = r;
                ry = r;
            }
            points.grow(rx, ry)
        }
        ObjectKind::Text(shape) => {
            let style = catalog.text_style(shape.text_style_id)?;
            let metrics = measure(object.text().unwrap_or_default(), shape, style, params);
            text_envelope(scaled[0], metrics, shape)
        }
        _ => points,
    };

    Ok(env)
}
