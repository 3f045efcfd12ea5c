// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live value links.
//!
//! A link binds one attribute of a display object to a key in an external
//! live-value source. The link, not the compiler, decides how a fetched value
//! lands in the attribute map.

use serde::{Deserialize, Serialize};

use crate::attrs::{field, AttrMap, AttrValue};

/// The attribute a live link writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Text,
    Color,
    FillColor,
    LineColor,
    LineWidth,
    FillPercent,
}

impl LinkTarget {
    /// Short field code written by this target.
    pub fn field(&self) -> &'static str {
        match self {
            LinkTarget::Text => field::TEXT,
            LinkTarget::Color => field::COLOR,
            LinkTarget::FillColor => field::FILL_COLOR,
            LinkTarget::LineColor => field::LINE_COLOR,
            LinkTarget::LineWidth => field::LINE_WIDTH,
            LinkTarget::FillPercent => field::FILL_PERCENT,
        }
    }
}

/// A value returned by the live-value source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveValue {
    /// The raw value as stored by the source.
    pub raw: Option<String>,
    /// A human readable rendering of the value.
    pub display: Option<String>,
    /// Colour lookup id, for values that represent a state colour.
    pub color_id: Option<i64>,
}

/// Declares that `target` is driven by the live value at `live_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveLink {
    pub live_key: String,
    pub target: LinkTarget,
    /// Optional template for text targets, `{}` is replaced by the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LiveLink {
    pub fn new(live_key: impl Into<String>, target: LinkTarget) -> Self {
        Self {
            live_key: live_key.into(),
            target,
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Maps `value` onto the target attribute.
    ///
    /// Returns `true` if the attribute map changed. Values that cannot be
    /// mapped (no colour id for a colour target, unparsable number) leave the
    /// attribute as it was.
    pub fn apply(&self, value: &LiveValue, attrs: &mut AttrMap) -> bool {
        let mapped = match self.target {
            LinkTarget::Color | LinkTarget::FillColor | LinkTarget::LineColor => {
                value.color_id.map(AttrValue::Int)
            }
            LinkTarget::Text => value
                .display
                .as_deref()
                .or(value.raw.as_deref())
                .map(|text| match &self.format {
                    Some(format) => AttrValue::String(format.replace("{}", text)),
                    None => AttrValue::String(text.to_string()),
                }),
            LinkTarget::LineWidth => value
                .raw
                .as_deref()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .map(|w| AttrValue::Int(w.round() as i64)),
            LinkTarget::FillPercent => value
                .raw
                .as_deref()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .map(|p| AttrValue::Double(p.clamp(0.0, 100.0))),
        };

        match mapped {
            Some(v) => {
                let previous = attrs.insert(self.target.field().to_string(), v.clone());
                previous.as_ref() != Some(&v)
            }
            None => false,
        }
    }
}
