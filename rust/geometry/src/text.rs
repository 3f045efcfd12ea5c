// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Approximate text metrics for label envelopes.
//!
//! Labels occupy space beyond their anchor point. Without a font rasterizer
//! we estimate glyph width as a fixed fraction of the line height, which is
//! enough to put a label into every grid cell it can be seen in.

use diagram_core::{Point, TextShape, TextStyle};
use nalgebra::{Point2, Rotation2};

use crate::envelope::Envelope;
use crate::scale::ScaleParams;

/// Average glyph advance as a fraction of line height.
pub const CHAR_WIDTH_RATIO: f64 = 0.6;

/// Rendered size of a block of text, in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

/// Measures `text` as it would be drawn with `shape` and `style`.
pub fn measure(text: &str, shape: &TextShape, style: &TextStyle, params: &ScaleParams) -> TextMetrics {
    let line_height = match shape.text_height {
        Some(h) => params.length(h),
        None => style.font_size * style.scale_factor,
    };

    let line_count = text.lines().count().max(1);
    let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);

    TextMetrics {
        width: longest as f64 * line_height * CHAR_WIDTH_RATIO * shape.h_stretch.abs(),
        height: line_height * line_count as f64,
    }
}

/// Envelope of a text block anchored at `anchor`, honouring alignment and
/// rotation (degrees, about the anchor).
pub fn text_envelope(anchor: Point, metrics: TextMetrics, shape: &TextShape) -> Envelope {
    let (w, h) = (metrics.width, metrics.height);

    let (left, right) = match shape.h_align {
        a if a < 0 => (0.0, w),
        a if a > 0 => (-w, 0.0),
        _ => (-w / 2.0, w / 2.0),
    };
    let (top, bottom) = match shape.v_align {
        a if a < 0 => (-h, 0.0),
        a if a > 0 => (0.0, h),
        _ => (-h / 2.0, h / 2.0),
    };

    let rotation = Rotation2::new(shape.rotation.to_radians());
    let mut env = Envelope::new();
    for (x, y) in [(left, top), (right, top), (right, bottom), (left, bottom)] {
        let p = rotation * Point2::new(x, y);
        env.expand(anchor.x + p.x, anchor.y + p.y);
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn style() -> TextStyle {
        TextStyle {
            id: 1,
            font_size: 10.0,
            scale_factor: 1.0,
        }
    }

    fn params(scale: f64) -> ScaleParams {
        ScaleParams {
            scale,
            offset: Point::default(),
        }
    }

    #[test]
    fn measures_longest_line() {
        let shape = TextShape::default();
        let m = measure("ab\nabcd", &shape, &style(), &params(1.0));
        assert_relative_eq!(m.width, 4.0 * 10.0 * CHAR_WIDTH_RATIO);
        assert_relative_eq!(m.height, 20.0);
    }

    #[test]
    fn explicit_text_height_is_scaled() {
        let shape = TextShape {
            text_height: Some(3.0),
            ..TextShape::default()
        };
        let m = measure("x", &shape, &style(), &params(2.0));
        assert_relative_eq!(m.height, 6.0);
    }

    #[test]
    fn alignment_positions_the_box() {
        let metrics = TextMetrics {
            width: 10.0,
            height: 4.0,
        };
        let left_top = TextShape {
            h_align: -1,
            v_align: -1,
            ..TextShape::default()
        };
        let env = text_envelope(Point::new(100.0, 100.0), metrics, &left_top);
        assert_relative_eq!(env.min_x, 100.0);
        assert_relative_eq!(env.max_x, 110.0);
        assert_relative_eq!(env.min_y, 96.0);
        assert_relative_eq!(env.max_y, 100.0);

        let centred = TextShape {
            h_align: 0,
            v_align: 0,
            ..TextShape::default()
        };
        let env = text_envelope(Point::new(0.0, 0.0), metrics, &centred);
        assert_relative_eq!(env.min_x, -5.0);
        assert_relative_eq!(env.max_y, 2.0);
    }

    #[test]
    fn rotation_swaps_extent() {
        let metrics = TextMetrics {
            width: 10.0,
            height: 2.0,
        };
        let shape = TextShape {
            h_align: 0,
            v_align: 0,
            rotation: 90.0,
            ..TextShape::default()
        };
        let env = text_envelope(Point::new(0.0, 0.0), metrics, &shape);
        assert_relative_eq!(env.width(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(env.height(), 10.0, epsilon = 1e-9);
    }
}
