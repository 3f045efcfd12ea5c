// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy for display object compilation.
//!
//! Errors fall into two scopes. Object-scoped errors exclude a single object
//! from a batch's index output and the batch carries on. Everything else is
//! batch-scoped: the whole batch is rolled back and redelivered.

use crate::object::ObjectId;

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling display objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A placement pointer references a template group that has no children.
    #[error("pointer {pointer_id} references group {group_id} which has no children")]
    DanglingReference { pointer_id: ObjectId, group_id: ObjectId },

    /// The coordinate space is missing (or has unusable) scale/offset settings.
    #[error("coordinate space {coord_space_id} has no usable scale configuration: {reason}")]
    ScaleConfiguration { coord_space_id: i32, reason: String },

    /// An object references a coordinate space that is not in the catalog.
    #[error("coordinate space not found: {0}")]
    UnknownCoordSpace(i32),

    /// A text object references a text style that is not in the catalog.
    #[error("text style not found: {0}")]
    UnknownTextStyle(i32),

    /// An object's extent covers more grid cells than one object may index.
    #[error("envelope covers {cells} grid cells in coordinate space {coord_space_id}, limit is {limit}")]
    TooManyCells {
        coord_space_id: i32,
        cells: u64,
        limit: u64,
    },

    /// Lock timeout, connection failure or any other storage fault.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// Computed state disagrees with what the store reports.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Object-scoped errors skip one object; the rest of the batch continues.
    pub fn is_object_scoped(&self) -> bool {
        matches!(
            self,
            Error::DanglingReference { .. }
                | Error::ScaleConfiguration { .. }
                | Error::UnknownCoordSpace(_)
                | Error::UnknownTextStyle(_)
                | Error::TooManyCells { .. }
        )
    }

    /// Invariant violations are logged at a higher severity than other
    /// batch failures.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }

    /// Shorthand for building a [`Error::TransientStore`] from any error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::TransientStore(err.to_string())
    }
}
