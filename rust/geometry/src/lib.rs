// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagram Geometry
//!
//! Scaling of object-local points into coordinate spaces, envelopes, text
//! metrics and the grid cell math used by the spatial indexers.
//!
//! ## Overview
//!
//! - [`ScaleParams`] validates a coordinate space's scale and offset and maps
//!   raw points into device units.
//! - [`object_envelope`] measures the drawn extent of an object, including
//!   ellipse radii and label text blocks.
//! - [`grid_keys_for_envelope`] lists the grid cells an envelope overlaps at
//!   each level of a coordinate space.
//! - [`representative_point`] picks the point an object is located by.

pub mod envelope;
pub mod grid;
pub mod location;
pub mod scale;
pub mod text;

pub use envelope::Envelope;
pub use grid::{
    cell_of, grid_keys_for_envelope, template_key, CellRange, GridKeys, MAX_CELLS_PER_OBJECT,
};
pub use location::{object_envelope, representative_point, ring_centroid};
pub use scale::{affine, scale_geometry, translate, ScaleParams};
pub use text::{measure, text_envelope, TextMetrics, CHAR_WIDTH_RATIO};
