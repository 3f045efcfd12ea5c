// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned envelopes of scaled geometry.

use diagram_core::Point;

/// Axis-aligned bounding box in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    /// Number of points expanded into this envelope
    pub sample_count: usize,
}

impl Envelope {
    /// Create a new envelope initialized to the invalid state
    pub fn new() -> Self {
        Self {
            min_x: f64::MAX,
            min_y: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
            sample_count: 0,
        }
    }

    /// Envelope of a set of points; invalid if `points` is empty.
    pub fn from_points(points: &[Point]) -> Self {
        let mut env = Self::new();
        for p in points {
            env.expand(p.x, p.y);
        }
        env
    }

    /// Check if the envelope is valid (at least one point added)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.sample_count > 0
    }

    /// Expand to include a point
    #[inline]
    pub fn expand(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sample_count += 1;
    }

    /// Grow outward by `dx` horizontally and `dy` vertically on each side.
    pub fn grow(&self, dx: f64, dy: f64) -> Self {
        if !self.is_valid() {
            return *self;
        }
        Self {
            min_x: self.min_x - dx.abs(),
            min_y: self.min_y - dy.abs(),
            max_x: self.max_x + dx.abs(),
            max_y: self.max_y + dy.abs(),
            sample_count: self.sample_count,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        if self.is_valid() {
            self.max_x - self.min_x
        } else {
            0.0
        }
    }

    #[inline]
    pub fn height(&self) -> f64 {
        if self.is_valid() {
            self.max_y - self.min_y
        } else {
            0.0
        }
    }

    /// Center of the box
    #[inline]
    pub fn centroid(&self) -> Point {
        if !self.is_valid() {
            return Point::default();
        }
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Whether `p` lies inside or on the boundary.
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        self.is_valid()
            && p.x >= self.min_x
            && p.x <= self.max_x
            && p.y >= self.min_y
            && p.y <= self.max_y
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}
