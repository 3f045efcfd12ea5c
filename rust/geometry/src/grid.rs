// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid cell math.
//!
//! Each grid level divides the coordinate space into square cells of side
//! `cell_size`. A point `(x, y)` lives in cell `(floor(x / size), floor(y / size))`,
//! so the cells covering an envelope are the inclusive range between the
//! cells of its two corners.

use diagram_core::{CoordSpaceId, CoordinateSpace, Error, GridKey, Result};
use smallvec::SmallVec;

use crate::envelope::Envelope;

/// Grid keys of one object; most objects touch only a handful of cells.
pub type GridKeys = SmallVec<[GridKey; 8]>;

/// Most cells one object may occupy, summed over all levels.
pub const MAX_CELLS_PER_OBJECT: u64 = 1 << 16;

/// Inclusive rectangle of cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl CellRange {
    /// Cells overlapped by `env`, or `None` for an empty envelope or an
    /// unusable cell size.
    pub fn covering(env: &Envelope, cell_size: f64) -> Option<Self> {
        if !env.is_valid() || !cell_size.is_finite() || cell_size <= 0.0 {
            return None;
        }
        let (min_x, min_y) = cell_of(env.min_x, env.min_y, cell_size);
        let (max_x, max_y) = cell_of(env.max_x, env.max_y, cell_size);
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Number of cells, saturating at `u64::MAX`.
    pub fn len(&self) -> u64 {
        let width = i128::from(self.max_x) - i128::from(self.min_x) + 1;
        let height = i128::from(self.max_y) - i128::from(self.min_y) + 1;
        if width <= 0 || height <= 0 {
            return 0;
        }
        u64::try_from(width.saturating_mul(height)).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| (self.min_x..=self.max_x).map(move |x| (x, y)))
    }
}

/// The cell containing `(x, y)`.
#[inline]
pub fn cell_of(x: f64, y: f64, cell_size: f64) -> (i64, i64) {
    (
        (x / cell_size).floor() as i64,
        (y / cell_size).floor() as i64,
    )
}

/// The synthetic key under which a coordinate space's templates are indexed.
pub fn template_key(coord_space_id: CoordSpaceId) -> GridKey {
    GridKey::Template { coord_space_id }
}

/// Grid keys for `env` at every level of `space`.
///
/// When `zoom` is given, only levels whose zoom range overlaps it are used.
/// Fails with [`Error::TooManyCells`] when the envelope would occupy more
/// than [`MAX_CELLS_PER_OBJECT`] cells.
pub fn grid_keys_for_envelope(
    space: &CoordinateSpace,
    env: &Envelope,
    zoom: Option<(f64, f64)>,
) -> Result<GridKeys> {
    let mut keys = GridKeys::new();
    let mut cells: u64 = 0;

    for level in &space.grid_levels {
        if let Some((min_zoom, max_zoom)) = zoom {
            if !level.overlaps_zoom(min_zoom, max_zoom) {
                continue;
            }
        }

        let Some(range) = CellRange::covering(env, level.cell_size) else {
            continue;
        };

        cells = cells.saturating_add(range.len());
        if cells > MAX_CELLS_PER_OBJECT {
            return Err(Error::TooManyCells {
                coord_space_id: space.id,
                cells,
                limit: MAX_CELLS_PER_OBJECT,
            });
        }

        keys.extend(range.iter().map(|(x, y)| GridKey::Cell {
            coord_space_id: space.id,
            level: level.key,
            x,
            y,
        }));
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagram_core::{GridLevel, Point};

    fn space() -> CoordinateSpace {
        CoordinateSpace {
            id: 4,
            name: "grid".into(),
            model_set_id: 1,
            scale: Some(1.0),
            offset: Some(Point::default()),
            grid_levels: vec![
                GridLevel {
                    key: 0,
                    cell_size: 100.0,
                    min_zoom: 0.0,
                    max_zoom: 1.0,
                },
                GridLevel {
                    key: 1,
                    cell_size: 25.0,
                    min_zoom: 1.0,
                    max_zoom: 8.0,
                },
            ],
        }
    }

    #[test]
    fn negative_coordinates_floor_downwards() {
        assert_eq!(cell_of(-0.5, 0.5, 10.0), (-1, 0));
        assert_eq!(cell_of(-10.0, 10.0, 10.0), (-1, 1));
    }

    #[test]
    fn point_falls_in_one_cell_per_level() {
        let env = Envelope::from_points(&[Point::new(30.0, 60.0)]);
        let keys = grid_keys_for_envelope(&space(), &env, None).unwrap();
        assert_eq!(
            keys.as_slice(),
            &[
                GridKey::Cell {
                    coord_space_id: 4,
                    level: 0,
                    x: 0,
                    y: 0
                },
                GridKey::Cell {
                    coord_space_id: 4,
                    level: 1,
                    x: 1,
                    y: 2
                },
            ]
        );
    }

    #[test]
    fn zoom_filter_skips_levels() {
        let env = Envelope::from_points(&[Point::new(30.0, 60.0)]);
        let keys = grid_keys_for_envelope(&space(), &env, Some((2.0, 4.0))).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(matches!(keys[0], GridKey::Cell { level: 1, .. }));
    }

    #[test]
    fn covering_cells_contain_every_interior_point() {
        let size = 25.0;
        let envelopes = [
            Envelope::from_points(&[Point::new(-37.0, 12.5), Point::new(81.2, 140.0)]),
            Envelope::from_points(&[Point::new(0.0, 0.0), Point::new(25.0, 25.0)]),
            Envelope::from_points(&[Point::new(-0.1, -0.1), Point::new(0.1, 0.1)]),
        ];

        for env in envelopes {
            let range = CellRange::covering(&env, size).unwrap();
            assert_eq!(range.iter().count() as u64, range.len());

            let steps = 40;
            for i in 1..steps {
                for j in 1..steps {
                    let x = env.min_x + env.width() * i as f64 / steps as f64;
                    let y = env.min_y + env.height() * j as f64 / steps as f64;
                    let (cx, cy) = cell_of(x, y, size);
                    assert!(range.contains(cx, cy), "({x}, {y}) not covered");
                }
            }
        }
    }

    #[test]
    fn empty_envelope_has_no_keys() {
        let keys = grid_keys_for_envelope(&space(), &Envelope::new(), None).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn extreme_ranges_do_not_overflow() {
        let range = CellRange {
            min_x: i64::MIN,
            min_y: i64::MIN,
            max_x: i64::MAX,
            max_y: i64::MAX,
        };
        assert_eq!(range.len(), u64::MAX);
    }

    #[test]
    fn oversized_envelopes_are_refused() {
        let huge = Envelope::from_points(&[Point::new(0.0, 0.0), Point::new(1.0e9, 1.0e9)]);
        let err = grid_keys_for_envelope(&space(), &huge, None).unwrap_err();
        assert!(err.is_object_scoped());
        assert!(matches!(err, Error::TooManyCells { coord_space_id: 4, .. }));

        let unbounded = Envelope::from_points(&[
            Point::new(f64::NEG_INFINITY, 0.0),
            Point::new(f64::INFINITY, 1.0),
        ]);
        assert!(grid_keys_for_envelope(&space(), &unbounded, None).is_err());
    }

    #[test]
    fn limit_counts_cells_across_levels() {
        // 200 x 200 units: 4 cells at level 0 and 64 at level 1.
        let env = Envelope::from_points(&[Point::new(0.0, 0.0), Point::new(199.0, 199.0)]);
        let keys = grid_keys_for_envelope(&space(), &env, None).unwrap();
        assert_eq!(keys.len(), 4 + 64);
    }
}
