use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EditorError;

/// Point in the document's own space: origin bottom-left, unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NativePoint {
    pub x: f32,
    pub y: f32,
}

impl NativePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, delta: NativeDelta) -> Self {
        Self {
            x: self.x + delta.dx,
            y: self.y + delta.dy,
        }
    }
}

/// Point in overlay pixel space: origin top-left, scaled by zoom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportPoint {
    pub x: f32,
    pub y: f32,
}

impl ViewportPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NativeDelta {
    pub dx: f32,
    pub dy: f32,
}

impl NativeDelta {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportDelta {
    pub dx: f32,
    pub dy: f32,
}

impl ViewportDelta {
    /// Converts a screen-space drag into native units. The y axis flips: moving
    /// down on screen lowers the native y.
    pub fn to_native(self, scale: f32) -> NativeDelta {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        NativeDelta {
            dx: self.dx / scale,
            dy: -self.dy / scale,
        }
    }
}

/// Affine text transform `[a b c d e f]` as found in content streams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn from_array(values: [f32; 6]) -> Self {
        let [a, b, c, d, e, f] = values;
        Self { a, b, c, d, e, f }
    }

    pub fn to_array(self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub fn translation(e: f32, f: f32) -> Self {
        Self {
            e,
            f,
            ..Self::IDENTITY
        }
    }

    /// Returns `self x other` using the row-vector convention of PDF matrices.
    pub fn then(self, other: Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Scale/rotation part divided by `size`, i.e. the matrix a run should be
    /// drawn with when `size` is passed to the font operator.
    pub fn unit_basis(self, size: f32) -> [f32; 4] {
        if !size.is_finite() || size.abs() <= f32::EPSILON {
            return [1.0, 0.0, 0.0, 1.0];
        }
        let size = size.abs();
        [self.a / size, self.b / size, self.c / size, self.d / size]
    }
}

/// Per-page geometry consumed by the viewport mapper. `top_inset` is the
/// native distance between the page top and the highest glyph box, frozen at
/// extraction so that the topmost run lands on overlay y = 0. `origin` is the
/// lower-left corner of the page box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub native_width: f32,
    pub native_height: f32,
    pub scale: f32,
    pub top_inset: f32,
    #[serde(default)]
    pub origin: NativePoint,
}

impl PageGeometry {
    pub fn new(native_width: f32, native_height: f32, scale: f32) -> Self {
        Self {
            native_width,
            native_height,
            scale,
            top_inset: 0.0,
            origin: NativePoint::default(),
        }
    }

    pub fn with_scale(self, scale: f32) -> Self {
        Self { scale, ..self }
    }

    pub fn with_origin(self, origin: NativePoint) -> Self {
        Self { origin, ..self }
    }

    /// Native y of the page box's top edge.
    pub fn page_top(&self) -> f32 {
        self.origin.y + self.native_height
    }

    pub fn viewport_size(&self) -> (f32, f32) {
        (
            self.native_width * self.scale,
            self.native_height * self.scale,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_unit(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: unit_to_byte(r),
            g: unit_to_byte(g),
            b: unit_to_byte(b),
        }
    }

    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

fn unit_to_byte(value: f32) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(EditorError::Config(format!("invalid colour {s:?}")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| EditorError::Config(format!("invalid colour {s:?}")))
        };
        Ok(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}
