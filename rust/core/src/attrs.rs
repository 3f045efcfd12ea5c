// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attribute bags carried by display objects.
//!
//! Attributes are keyed by the short field codes used in compiled payloads
//! (see [`field`]). The map is ordered so that serializing it always yields
//! the same canonical byte sequence regardless of insertion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<AttrValue>),
    Map(AttrMap),
}

/// Ordered attribute map keyed by short field code.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Short field codes used in attribute maps and compiled payloads.
pub mod field {
    pub const TYPE: &str = "_t";
    pub const KEY: &str = "k";
    pub const GROUP_ID: &str = "gi";
    pub const LAYER: &str = "la";
    pub const LEVEL: &str = "le";
    pub const Z_ORDER: &str = "z";
    pub const GEOMETRY: &str = "g";
    pub const CHILDREN: &str = "di";
    pub const HASH: &str = "hid";

    pub const TEXT: &str = "te";
    pub const COLOR: &str = "c";
    pub const FILL_COLOR: &str = "fc";
    pub const LINE_COLOR: &str = "lc";
    pub const LINE_STYLE: &str = "ls";
    pub const LINE_WIDTH: &str = "w";
    pub const FILL_PERCENT: &str = "fp";
    pub const SELECTABLE: &str = "s";
    pub const OVERLAY: &str = "o";

    pub const TEXT_STYLE: &str = "fs";
    pub const H_ALIGN: &str = "ha";
    pub const V_ALIGN: &str = "va";
    pub const ROTATION: &str = "r";
    pub const TEXT_HEIGHT: &str = "th";
    pub const H_STRETCH: &str = "hs";

    pub const X_RADIUS: &str = "xr";
    pub const Y_RADIUS: &str = "yr";
    pub const START_ANGLE: &str = "sa";
    pub const END_ANGLE: &str = "ea";

    pub const NAME: &str = "n";
    pub const TARGET_GROUP_ID: &str = "tg";
    pub const TARGET_GROUP_NAME: &str = "tn";
}

impl AttrValue {
    /// Null and `false` values are dropped from compiled payloads.
    pub fn is_stripped(&self) -> bool {
        matches!(self, AttrValue::Null | AttrValue::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

/// Returns a copy of `attrs` without null or `false` values.
pub fn strip_attrs(attrs: &AttrMap) -> AttrMap {
    attrs
        .iter()
        .filter(|(_, v)| !v.is_stripped())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<AttrMap> for AttrValue {
    fn from(v: AttrMap) -> Self {
        AttrValue::Map(v)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Null)
    }
}
