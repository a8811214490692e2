use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{NativePoint, Rgb, Transform, ViewportPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One text-showing operation as reported by a page decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
    pub transform: Transform,
    pub width: f32,
    pub height: f32,
    pub font_family: Option<String>,
    pub color: Option<Rgb>,
}

impl TextRecord {
    pub fn new(text: impl Into<String>, transform: Transform, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            transform,
            width,
            height,
            font_family: None,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStyle {
    pub font_family: String,
    pub color: Rgb,
    pub font_size: f32,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            font_family: "Helvetica".to_owned(),
            color: Rgb::BLACK,
            font_size: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    id: RunId,
    content: String,
    native_position: NativePoint,
    native_font_size: f32,
    native_transform: Transform,
    native_width: f32,
    native_height: f32,
    font_size_override: Option<f32>,
    pub(crate) viewport_position: ViewportPoint,
    pub(crate) viewport_font_size: f32,
    pub(crate) font_family: String,
    pub(crate) color: Rgb,
    dirty: bool,
    order: u32,
}

impl TextRun {
    pub(crate) fn from_record(record: TextRecord, order: u32, defaults: &RunStyle) -> Self {
        let transform = record.transform;
        Self {
            id: RunId::new(),
            content: record.text,
            native_position: NativePoint::new(transform.e, transform.f),
            native_font_size: transform.d.abs(),
            native_transform: transform,
            native_width: record.width,
            native_height: record.height,
            font_size_override: None,
            viewport_position: ViewportPoint::default(),
            viewport_font_size: 0.0,
            font_family: record
                .font_family
                .unwrap_or_else(|| defaults.font_family.clone()),
            color: record.color.unwrap_or(defaults.color),
            dirty: false,
            order,
        }
    }

    pub(crate) fn added(
        content: String,
        position: NativePoint,
        style: RunStyle,
        order: u32,
    ) -> Self {
        let size = style.font_size.abs();
        Self {
            id: RunId::new(),
            content,
            native_position: position,
            native_font_size: size,
            native_transform: Transform::new(size, 0.0, 0.0, size, position.x, position.y),
            native_width: 0.0,
            native_height: size,
            font_size_override: None,
            viewport_position: ViewportPoint::default(),
            viewport_font_size: 0.0,
            font_family: style.font_family,
            color: style.color,
            dirty: true,
            order,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn native_position(&self) -> NativePoint {
        self.native_position
    }

    pub fn native_font_size(&self) -> f32 {
        self.native_font_size
    }

    /// Size the run is drawn with: the edited size when one was set.
    pub fn effective_font_size(&self) -> f32 {
        self.font_size_override.unwrap_or(self.native_font_size)
    }

    pub fn native_transform(&self) -> Transform {
        self.native_transform
    }

    /// Length of the transform's vertical glyph axis. Unlike `|d|` this stays
    /// correct for rotated and skewed text.
    pub fn glyph_scale(&self) -> f32 {
        self.native_transform.c.hypot(self.native_transform.d)
    }

    /// Size passed to the font operator when the run is redrawn.
    pub fn draw_font_size(&self) -> f32 {
        self.font_size_override.unwrap_or_else(|| self.glyph_scale())
    }

    pub fn native_width(&self) -> f32 {
        self.native_width
    }

    pub fn native_height(&self) -> f32 {
        self.native_height
    }

    pub fn viewport_position(&self) -> ViewportPoint {
        self.viewport_position
    }

    pub fn viewport_font_size(&self) -> f32 {
        self.viewport_font_size
    }

    pub fn font_family(&self) -> &str {
        &self.font_family
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub(crate) fn set_content(&mut self, text: String) {
        self.content = text;
        self.dirty = true;
    }

    pub(crate) fn set_font_family(&mut self, family: String) {
        self.font_family = family;
        self.dirty = true;
    }

    pub(crate) fn set_color(&mut self, color: Rgb) {
        self.color = color;
        self.dirty = true;
    }

    pub(crate) fn set_font_size(&mut self, size: f32) {
        self.font_size_override = Some(size.abs());
        self.dirty = true;
    }

    pub(crate) fn translate(&mut self, delta: crate::geometry::NativeDelta) {
        self.native_position = self.native_position.offset(delta);
        self.dirty = true;
    }
}
