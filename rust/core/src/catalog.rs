// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only lookups threaded through every compile stage.
//!
//! The catalog is loaded once per batch and passed explicitly; nothing in
//! the compiler keeps it in global state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::{CoordSpaceId, Point};

pub type ModelSetId = i32;

/// One grid resolution level of a coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    /// Level key, unique within the coordinate space.
    pub key: i32,
    pub cell_size: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl GridLevel {
    /// Whether this level serves any zoom inside `[min_zoom, max_zoom]`.
    pub fn overlaps_zoom(&self, min_zoom: f64, max_zoom: f64) -> bool {
        self.min_zoom <= max_zoom && min_zoom <= self.max_zoom
    }
}

/// The scale/offset/grid configuration of one diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSpace {
    pub id: CoordSpaceId,
    pub name: String,
    pub model_set_id: ModelSetId,
    pub scale: Option<f64>,
    pub offset: Option<Point>,
    pub grid_levels: Vec<GridLevel>,
}

/// The model namespace that owns one or more coordinate spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNamespace {
    pub id: ModelSetId,
    /// Name used for live-value lookups and key bucketing.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub id: i32,
    pub font_size: f64,
    /// Multiplier applied to `font_size` to get the rendered height.
    pub scale_factor: f64,
}

/// Zoom range an object is shown at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayLevel {
    pub id: i32,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

/// Coordinate spaces, namespaces, text styles and display levels by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    coord_spaces: FxHashMap<CoordSpaceId, CoordinateSpace>,
    namespaces: FxHashMap<ModelSetId, ModelNamespace>,
    text_styles: FxHashMap<i32, TextStyle>,
    levels: FxHashMap<i32, DisplayLevel>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&mut self, namespace: ModelNamespace) {
        self.namespaces.insert(namespace.id, namespace);
    }

    pub fn add_coord_space(&mut self, space: CoordinateSpace) {
        self.coord_spaces.insert(space.id, space);
    }

    pub fn add_text_style(&mut self, style: TextStyle) {
        self.text_styles.insert(style.id, style);
    }

    pub fn add_level(&mut self, level: DisplayLevel) {
        self.levels.insert(level.id, level);
    }

    pub fn coord_space(&self, id: CoordSpaceId) -> Result<&CoordinateSpace> {
        self.coord_spaces
            .get(&id)
            .ok_or(Error::UnknownCoordSpace(id))
    }

    /// The namespace owning a coordinate space.
    pub fn namespace_for(&self, coord_space_id: CoordSpaceId) -> Result<&ModelNamespace> {
        let space = self.coord_space(coord_space_id)?;
        self.namespaces
            .get(&space.model_set_id)
            .ok_or(Error::UnknownCoordSpace(coord_space_id))
    }

    pub fn text_style(&self, id: i32) -> Result<&TextStyle> {
        self.text_styles.get(&id).ok_or(Error::UnknownTextStyle(id))
    }

    /// Unknown levels are treated as "always visible".
    pub fn level(&self, id: i32) -> Option<&DisplayLevel> {
        self.levels.get(&id)
    }

    pub fn coord_space_count(&self) -> usize {
        self.coord_spaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(min: f64, max: f64) -> GridLevel {
        GridLevel {
            key: 0,
            cell_size: 100.0,
            min_zoom: min,
            max_zoom: max,
        }
    }

    #[test]
    fn zoom_overlap() {
        let grid = level(0.5, 2.0);
        assert!(grid.overlaps_zoom(1.0, 5.0));
        assert!(grid.overlaps_zoom(0.0, 0.5));
        assert!(!grid.overlaps_zoom(2.5, 10.0));
        assert!(!grid.overlaps_zoom(0.0, 0.1));
    }

    #[test]
    fn namespace_resolves_through_coord_space() {
        let mut catalog = Catalog::new();
        catalog.add_namespace(ModelNamespace {
            id: 3,
            name: "network".into(),
        });
        catalog.add_coord_space(CoordinateSpace {
            id: 1,
            name: "overview".into(),
            model_set_id: 3,
            scale: Some(1.0),
            offset: Some(Point::new(0.0, 0.0)),
            grid_levels: vec![level(0.0, 10.0)],
        });

        assert_eq!(catalog.namespace_for(1).unwrap().name, "network");
        assert!(matches!(
            catalog.namespace_for(9),
            Err(Error::UnknownCoordSpace(9))
        ));
        assert!(matches!(catalog.text_style(4), Err(Error::UnknownTextStyle(4))));
    }
}
