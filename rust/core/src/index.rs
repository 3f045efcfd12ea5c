// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Grid and location index rows, and the downstream signals they produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::ModelSetId;
use crate::object::{CoordSpaceId, ObjectId};

/// One spatial bucket of one coordinate space.
///
/// Renders as `{space}.{level}:{x}.{y}` for cells and `{space}.template`
/// for the synthetic key that holds templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GridKey {
    Cell {
        coord_space_id: CoordSpaceId,
        level: i32,
        x: i64,
        y: i64,
    },
    Template {
        coord_space_id: CoordSpaceId,
    },
}

impl GridKey {
    pub fn coord_space_id(&self) -> CoordSpaceId {
        match self {
            GridKey::Cell { coord_space_id, .. } | GridKey::Template { coord_space_id } => {
                *coord_space_id
            }
        }
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridKey::Cell {
                coord_space_id,
                level,
                x,
                y,
            } => write!(f, "{}.{}:{}.{}", coord_space_id, level, x, y),
            GridKey::Template { coord_space_id } => write!(f, "{}.template", coord_space_id),
        }
    }
}

/// Error returned when a stored grid key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed grid key: {0}")]
pub struct ParseGridKeyError(pub String);

impl FromStr for GridKey {
    type Err = ParseGridKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseGridKeyError(s.to_string());

        if let Some(space) = s.strip_suffix(".template") {
            let coord_space_id = space.parse().map_err(|_| bad())?;
            return Ok(GridKey::Template { coord_space_id });
        }

        let (head, cell) = s.split_once(':').ok_or_else(bad)?;
        let (space, level) = head.split_once('.').ok_or_else(bad)?;
        let (x, y) = cell.split_once('.').ok_or_else(bad)?;

        Ok(GridKey::Cell {
            coord_space_id: space.parse().map_err(|_| bad())?,
            level: level.parse().map_err(|_| bad())?,
            x: x.parse().map_err(|_| bad())?,
            y: y.parse().map_err(|_| bad())?,
        })
    }
}

impl Serialize for GridKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GridKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An object's membership of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndexEntry {
    pub object_id: ObjectId,
    pub coord_space_id: CoordSpaceId,
    pub grid_key: GridKey,
    pub import_group_hash: Option<String>,
}

/// A business-key lookup row, sharded by hash bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationIndexEntry {
    pub object_id: ObjectId,
    pub model_set_id: ModelSetId,
    pub index_bucket: u32,
}

/// Notification that a bucket's compiled contents changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DownstreamSignal {
    Grid {
        coord_space_id: CoordSpaceId,
        grid_key: GridKey,
    },
    Location {
        model_set_id: ModelSetId,
        index_bucket: u32,
    },
}

impl From<&GridIndexEntry> for DownstreamSignal {
    fn from(e: &GridIndexEntry) -> Self {
        DownstreamSignal::Grid {
            coord_space_id: e.coord_space_id,
            grid_key: e.grid_key,
        }
    }
}

impl From<&LocationIndexEntry> for DownstreamSignal {
    fn from(e: &LocationIndexEntry) -> Self {
        DownstreamSignal::Location {
            model_set_id: e.model_set_id,
            index_bucket: e.index_bucket,
        }
    }
}
