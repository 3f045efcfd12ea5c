// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping raw object-local points into a coordinate space.
//!
//! `scaled = raw * scale + offset`, applied per axis. The same affine helper
//! is used with a unit scale to offset cloned template children by their
//! placement point.

use diagram_core::{CoordinateSpace, Error, Point, Result};

/// Validated scale parameters of a coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub scale: f64,
    pub offset: Point,
}

impl ScaleParams {
    /// Reads the scale and offset from `space`, rejecting missing or
    /// non-finite settings and non-positive scales.
    pub fn for_space(space: &CoordinateSpace) -> Result<Self> {
        let config_error = |reason: &str| Error::ScaleConfiguration {
            coord_space_id: space.id,
            reason: reason.to_string(),
        };

        let scale = space.scale.ok_or_else(|| config_error("missing scale"))?;
        let offset = space.offset.ok_or_else(|| config_error("missing offset"))?;

        if !scale.is_finite() || scale <= 0.0 {
            return Err(config_error("scale must be finite and positive"));
        }
        if !offset.x.is_finite() || !offset.y.is_finite() {
            return Err(config_error("offset must be finite"));
        }

        Ok(Self { scale, offset })
    }

    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            p.x * self.scale + self.offset.x,
            p.y * self.scale + self.offset.y,
        )
    }

    /// Scales a length (radius, text height) without applying the offset.
    #[inline]
    pub fn length(&self, len: f64) -> f64 {
        len * self.scale
    }
}

/// Applies `p * (sx, sy) + (ox, oy)` to every point.
pub fn affine(points: &[Point], sx: f64, sy: f64, ox: f64, oy: f64) -> Vec<Point> {
    points
        .iter()
        .map(|p| Point::new(p.x * sx + ox, p.y * sy + oy))
        .collect()
}

/// Offsets every point by `by`.
pub fn translate(points: &[Point], by: Point) -> Vec<Point> {
    affine(points, 1.0, 1.0, by.x, by.y)
}

/// Scales `points` into `space`.
pub fn scale_geometry(points: &[Point], space: &CoordinateSpace) -> Result<Vec<Point>> {
    let params = ScaleParams::for_space(space)?;
    Ok(points.iter().map(|&p| params.apply(p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn space(scale: Option<f64>, offset: Option<Point>) -> CoordinateSpace {
        CoordinateSpace {
            id: 1,
            name: "test".into(),
            model_set_id: 1,
            scale,
            offset,
            grid_levels: Vec::new(),
        }
    }

    #[test]
    fn origin_maps_to_offset() {
        let s = space(Some(2.0), Some(Point::new(10.0, 10.0)));
        let scaled = scale_geometry(&[Point::new(0.0, 0.0)], &s).unwrap();
        assert_eq!(scaled, vec![Point::new(10.0, 10.0)]);
    }

    #[test]
    fn scaling_is_linear_and_monotonic() {
        let s = space(Some(2.0), Some(Point::new(10.0, 10.0)));
        let raw: Vec<Point> = (0..20)
            .map(|i| Point::new(i as f64 * 1.5 - 7.0, 3.0 - i as f64 * 0.25))
            .collect();
        let scaled = scale_geometry(&raw, &s).unwrap();

        for (r, p) in raw.iter().zip(&scaled) {
            assert_relative_eq!(p.x, r.x * 2.0 + 10.0);
            assert_relative_eq!(p.y, r.y * 2.0 + 10.0);
        }
        for pair in scaled.windows(2) {
            assert!(pair[1].x > pair[0].x);
            assert!(pair[1].y < pair[0].y);
        }
    }

    #[test]
    fn missing_scale_or_offset_is_a_configuration_error() {
        let p = [Point::new(1.0, 1.0)];
        for s in [
            space(None, Some(Point::default())),
            space(Some(1.0), None),
            space(Some(0.0), Some(Point::default())),
            space(Some(f64::NAN), Some(Point::default())),
        ] {
            assert!(matches!(
                scale_geometry(&p, &s),
                Err(Error::ScaleConfiguration { coord_space_id: 1, .. })
            ));
        }
    }

    #[test]
    fn translate_offsets_without_scaling() {
        let moved = translate(
            &[Point::new(1.0, 2.0), Point::new(-3.0, 0.5)],
            Point::new(100.0, -50.0),
        );
        assert_eq!(moved, vec![Point::new(101.0, -48.0), Point::new(97.0, -49.5)]);
    }
}
