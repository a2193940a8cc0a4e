//! Fill/stroke paint properties shared by all drawable elements.
//!
//! Colors are stored as straight (non-premultiplied) RGBA in 0..1.
//! The canvas premultiplies on write.

use serde::{Deserialize, Serialize};

/// Straight RGBA color, each channel in 0..1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Build from 8-bit channels (e.g. `#ff8800` with alpha 255)
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Same color with alpha multiplied by `opacity`
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            a: (self.a * opacity).clamp(0.0, 1.0),
            ..self
        }
    }

    /// Premultiplied [r, g, b, a]
    pub fn premultiplied(&self) -> [f32; 4] {
        let a = self.a.clamp(0.0, 1.0);
        [
            self.r.clamp(0.0, 1.0) * a,
            self.g.clamp(0.0, 1.0) * a,
            self.b.clamp(0.0, 1.0) * a,
            a,
        ]
    }

    /// True if drawing this color cannot change any pixel
    pub fn is_invisible(&self) -> bool {
        self.a <= 0.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Fill and stroke of an element. Either may be absent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paint {
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f32,
}

impl Paint {
    /// Stroke only (freehand ink, lines)
    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            fill: None,
            stroke: Some(color),
            stroke_width: width,
        }
    }

    /// Fill only
    pub fn fill(color: Color) -> Self {
        Self {
            fill: Some(color),
            stroke: None,
            stroke_width: 0.0,
        }
    }

    pub fn with_stroke(mut self, color: Color, width: f32) -> Self {
        self.stroke = Some(color);
        self.stroke_width = width;
        self
    }

    /// Stroke color if the stroke would actually produce pixels
    pub fn effective_stroke(&self) -> Option<Color> {
        self.stroke
            .filter(|c| !c.is_invisible() && self.stroke_width > 0.0)
    }

    /// Fill color if it would actually produce pixels
    pub fn effective_fill(&self) -> Option<Color> {
        self.fill.filter(|c| !c.is_invisible())
    }

    /// Half the stroke width, or 0 with no stroke
    pub fn half_stroke(&self) -> f32 {
        if self.effective_stroke().is_some() {
            self.stroke_width * 0.5
        } else {
            0.0
        }
    }
}

impl Default for Paint {
    fn default() -> Self {
        Paint::stroke(Color::BLACK, 2.0)
    }
}
