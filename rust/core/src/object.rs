// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Display objects.
//!
//! Every object shares one base record ([`GraphicObject`]) and is
//! discriminated by an explicit [`ObjectKind`]. Template groups and placement
//! pointers never own their children directly: children point back at their
//! owner through `group_id` and are looked up by id, so there are no
//! reference cycles between a pointer, its clones and its target group.

use serde::{Deserialize, Serialize};

use crate::attrs::{field, AttrMap, AttrValue};
use crate::live::LiveLink;

/// Stable, pre-allocated object id.
pub type ObjectId = i64;

/// Coordinate space id.
pub type CoordSpaceId = i32;

/// A 2D point, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Text placement details. The text itself lives in the attribute map under
/// [`field::TEXT`] so live values can rewrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShape {
    pub text_style_id: i32,
    /// -1 left, 0 centre, 1 right of the anchor.
    pub h_align: i8,
    /// -1 above, 0 centred on, 1 below the anchor.
    pub v_align: i8,
    pub rotation: f64,
    /// Explicit text height; overrides the style's font size when set.
    pub text_height: Option<f64>,
    pub h_stretch: f64,
}

impl Default for TextShape {
    fn default() -> Self {
        Self {
            text_style_id: 0,
            h_align: 0,
            v_align: -1,
            rotation: 0.0,
            text_height: None,
            h_stretch: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipseShape {
    pub x_radius: f64,
    pub y_radius: f64,
    pub rotation: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

impl Default for EllipseShape {
    fn default() -> Self {
        Self {
            x_radius: 10.0,
            y_radius: 10.0,
            rotation: 0.0,
            start_angle: 0.0,
            end_angle: 360.0,
        }
    }
}

/// A named, reusable collection of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateGroup {
    pub name: String,
    /// Embed every child inline in the group's own payload.
    pub compile_as_template: bool,
}

/// An instance of a template group positioned at the pointer's first point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlacementPointer {
    pub target_group_id: Option<ObjectId>,
    pub target_group_name: Option<String>,
}

/// The concrete kind of a display object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    Text(TextShape),
    Polygon,
    Polyline,
    Ellipse(EllipseShape),
    /// Marks the removal of a prior object; its geometry is the envelope of
    /// what it replaces.
    Null,
    EdgeTemplate { name: String },
    Group(TemplateGroup),
    GroupPointer(PlacementPointer),
}

impl ObjectKind {
    /// Type code written into compiled payloads.
    pub fn type_code(&self) -> &'static str {
        match self {
            ObjectKind::Text(_) => "DT",
            ObjectKind::Polygon => "DPG",
            ObjectKind::Polyline => "DPL",
            ObjectKind::Ellipse(_) => "DE",
            ObjectKind::Null => "DN",
            ObjectKind::EdgeTemplate { .. } => "DLT",
            ObjectKind::Group(_) => "DG",
            ObjectKind::GroupPointer(_) => "DGP",
        }
    }

    /// Groups and edge templates carry no geometry of their own.
    pub fn has_geometry(&self) -> bool {
        !matches!(self, ObjectKind::Group(_) | ObjectKind::EdgeTemplate { .. })
    }

    /// Objects located by the centroid of their outer ring rather than their
    /// first point.
    pub fn is_area(&self) -> bool {
        matches!(self, ObjectKind::Polygon | ObjectKind::Null)
    }

    /// Template groups flagged for inline compilation and edge templates are
    /// indexed under the coordinate space's synthetic template key.
    pub fn uses_template_key(&self) -> bool {
        match self {
            ObjectKind::Group(g) => g.compile_as_template,
            ObjectKind::EdgeTemplate { .. } => true,
            _ => false,
        }
    }

    pub fn as_group(&self) -> Option<&TemplateGroup> {
        match self {
            ObjectKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PlacementPointer> {
        match self {
            ObjectKind::GroupPointer(p) => Some(p),
            _ => None,
        }
    }
}

/// Where an object sits, written back as `[coordSpaceId, objectId, x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(CoordSpaceId, ObjectId, f64, f64)", into = "(CoordSpaceId, ObjectId, f64, f64)")]
pub struct LocationDescriptor {
    pub coord_space_id: CoordSpaceId,
    pub object_id: ObjectId,
    pub x: f64,
    pub y: f64,
}

impl From<(CoordSpaceId, ObjectId, f64, f64)> for LocationDescriptor {
    fn from((coord_space_id, object_id, x, y): (CoordSpaceId, ObjectId, f64, f64)) -> Self {
        Self {
            coord_space_id,
            object_id,
            x,
            y,
        }
    }
}

impl From<LocationDescriptor> for (CoordSpaceId, ObjectId, f64, f64) {
    fn from(l: LocationDescriptor) -> Self {
        (l.coord_space_id, l.object_id, l.x, l.y)
    }
}

/// The shared base record of every display object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicObject {
    pub id: ObjectId,
    pub coord_space_id: CoordSpaceId,
    /// Business key of the thing this graphic represents.
    pub key: Option<String>,
    /// Owning template group or placement pointer.
    pub group_id: Option<ObjectId>,
    pub layer_id: Option<i32>,
    /// Display level, which bounds the zoom range the object is visible in.
    pub level_id: Option<i32>,
    pub z_order: i32,
    /// Raw, object-local points. Empty for groups and edge templates.
    pub geometry: Vec<Point>,
    pub attrs: AttrMap,
    pub live_links: Vec<LiveLink>,
    pub import_group_hash: Option<String>,
    pub kind: ObjectKind,

    // Written by the compiler.
    pub hash_id: Option<String>,
    pub payload: Option<String>,
    pub location: Option<LocationDescriptor>,
}

impl GraphicObject {
    pub fn new(id: ObjectId, coord_space_id: CoordSpaceId, kind: ObjectKind) -> Self {
        Self {
            id,
            coord_space_id,
            key: None,
            group_id: None,
            layer_id: None,
            level_id: None,
            z_order: 0,
            geometry: Vec::new(),
            attrs: AttrMap::new(),
            live_links: Vec::new(),
            import_group_hash: None,
            kind,
            hash_id: None,
            payload: None,
            location: None,
        }
    }

    pub fn with_geometry(mut self, points: &[[f64; 2]]) -> Self {
        self.geometry = points.iter().map(|&p| Point::from(p)).collect();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_group(mut self, group_id: ObjectId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_level(mut self, level_id: i32) -> Self {
        self.level_id = Some(level_id);
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_link(mut self, link: LiveLink) -> Self {
        self.live_links.push(link);
        self
    }

    pub fn with_import_group_hash(mut self, hash: impl Into<String>) -> Self {
        self.import_group_hash = Some(hash.into());
        self
    }

    /// Builds the compact attribute representation of this object: its
    /// attribute bag plus the base and kind-specific fields, keyed by short
    /// field code. Geometry is not included; callers add the scaled form.
    pub fn compact_attrs(&self) -> AttrMap {
        let mut out = self.attrs.clone();
        let mut put = |name: &str, value: AttrValue| {
            out.insert(name.to_string(), value);
        };

        put(field::TYPE, self.kind.type_code().into());
        put(field::KEY, self.key.clone().into());
        put(field::GROUP_ID, self.group_id.into());
        put(field::LAYER, self.layer_id.into());
        put(field::LEVEL, self.level_id.into());
        put(field::Z_ORDER, self.z_order.into());

        match &self.kind {
            ObjectKind::Text(t) => {
                put(field::TEXT_STYLE, t.text_style_id.into());
                put(field::H_ALIGN, (t.h_align as i64).into());
                put(field::V_ALIGN, (t.v_align as i64).into());
                put(field::ROTATION, t.rotation.into());
                put(field::TEXT_HEIGHT, t.text_height.into());
                put(field::H_STRETCH, t.h_stretch.into());
            }
            ObjectKind::Ellipse(e) => {
                put(field::X_RADIUS, e.x_radius.into());
                put(field::Y_RADIUS, e.y_radius.into());
                put(field::ROTATION, e.rotation.into());
                put(field::START_ANGLE, e.start_angle.into());
                put(field::END_ANGLE, e.end_angle.into());
            }
            ObjectKind::Group(g) => put(field::NAME, g.name.as_str().into()),
            ObjectKind::EdgeTemplate { name } => put(field::NAME, name.as_str().into()),
            ObjectKind::GroupPointer(p) => {
                put(field::TARGET_GROUP_ID, p.target_group_id.into());
                put(field::TARGET_GROUP_NAME, p.target_group_name.clone().into());
            }
            ObjectKind::Polygon | ObjectKind::Polyline | ObjectKind::Null => {}
        }

        out
    }

    /// The text rendered by a label, if any.
    pub fn text(&self) -> Option<&str> {
        self.attrs.get(field::TEXT).and_then(AttrValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_serializes_as_pair() {
        let p = Point::new(1.5, -2.0);
        assert_eq!(serde_json::to_string(&p).unwrap(), "[1.5,-2.0]");
        let back: Point = serde_json::from_str("[3,4]").unwrap();
        assert_eq!(back, Point::new(3.0, 4.0));
    }

    #[test]
    fn location_serializes_as_tuple() {
        let loc = LocationDescriptor {
            coord_space_id: 2,
            object_id: 99,
            x: 10.0,
            y: 20.5,
        };
        assert_eq!(serde_json::to_string(&loc).unwrap(), "[2,99,10.0,20.5]");
    }

    #[test]
    fn compact_attrs_carry_kind_fields() {
        let obj = GraphicObject::new(7, 1, ObjectKind::Ellipse(EllipseShape::default()))
            .with_key("SW-1")
            .with_attr(field::LINE_COLOR, 4i64);

        let attrs = obj.compact_attrs();
        assert_eq!(attrs[field::TYPE].as_str(), Some("DE"));
        assert_eq!(attrs[field::KEY].as_str(), Some("SW-1"));
        assert_eq!(attrs[field::X_RADIUS], AttrValue::Double(10.0));
        assert_eq!(attrs[field::LINE_COLOR], AttrValue::Int(4));
        assert_eq!(attrs[field::GROUP_ID], AttrValue::Null);
        assert!(!attrs.contains_key("id"));
    }

    #[test]
    fn kind_classification() {
        let template = ObjectKind::Group(TemplateGroup {
            name: "switch".into(),
            compile_as_template: true,
        });
        let plain = ObjectKind::Group(TemplateGroup {
            name: "switch".into(),
            compile_as_template: false,
        });

        assert!(template.uses_template_key());
        assert!(!plain.uses_template_key());
        assert!(!template.has_geometry());
        assert!(ObjectKind::EdgeTemplate { name: "e".into() }.uses_template_key());
        assert!(ObjectKind::Polygon.is_area());
        assert!(!ObjectKind::Polyline.is_area());
    }

    #[test]
    fn kind_round_trips_through_json() {
        let kind = ObjectKind::GroupPointer(PlacementPointer {
            target_group_id: Some(5),
            target_group_name: None,
        });
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"group_pointer\""));
        let back: ObjectKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
