// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Diagram Core
//!
//! Data model shared by the diagram compiler crates.
//!
//! - **Objects**: [`GraphicObject`] with an explicit [`ObjectKind`]
//!   (text, polygon, polyline, ellipse, template group, placement pointer…)
//! - **Attributes**: ordered, short-coded attribute bags ([`AttrMap`]) and the
//!   [`LiveLink`]s that overlay live values onto them
//! - **Catalog**: coordinate spaces, grid levels, text styles and display
//!   levels, loaded once per batch
//! - **Index rows**: [`GridIndexEntry`], [`LocationIndexEntry`] and the
//!   [`DownstreamSignal`]s published when buckets change
//! - **Errors**: the compile error taxonomy ([`Error`])

pub mod attrs;
pub mod catalog;
pub mod error;
pub mod index;
pub mod live;
pub mod object;
pub mod queue;

pub use attrs::{field, strip_attrs, AttrMap, AttrValue};
pub use catalog::{
    Catalog, CoordinateSpace, DisplayLevel, GridLevel, ModelNamespace, ModelSetId, TextStyle,
};
pub use error::{Error, Result};
pub use index::{DownstreamSignal, GridIndexEntry, GridKey, LocationIndexEntry, ParseGridKeyError};
pub use live::{LinkTarget, LiveLink, LiveValue};
pub use object::{
    CoordSpaceId, EllipseShape, GraphicObject, LocationDescriptor, ObjectId, ObjectKind,
    PlacementPointer, Point, TemplateGroup, TextShape,
};
pub use queue::{item_ids, unique_object_ids, CompileQueueItem};
