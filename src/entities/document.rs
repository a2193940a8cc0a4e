//! Drawing document - layer stack plus canvas size, stored as JSON.
//!
//! The editing application owns the real file format; this is the plain
//! serde mirror the CLI reads and writes. Creation stamps round-trip exactly
//! (integer microseconds).

use std::path::Path;

use anyhow::{Context, Result, bail};
use glam::Vec2;
use log::info;
use serde::{Deserialize, Serialize};

use super::element::{CreatedAt, Element, ElementMeta, EllipseShape, FreehandPath, Group, LineShape, RectShape};
use super::layer::{Layer, MaskMode};
use super::paint::{Color, Paint};

/// Largest accepted canvas side in pixels
pub const MAX_SIDE: usize = 16_384;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Document {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    /// Load document from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let doc: Document = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse document: {}", path.display()))?;
        if doc.width > MAX_SIDE || doc.height > MAX_SIDE {
            bail!(
                "Document {} is {}x{}, larger than the {}x{} limit",
                path.display(),
                doc.width,
                doc.height,
                MAX_SIDE,
                MAX_SIDE
            );
        }
        info!(
            "Loaded {} ({}x{}, {} layers)",
            path.display(),
            doc.width,
            doc.height,
            doc.layers.len()
        );
        Ok(doc)
    }

    /// Save document as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize document")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write document: {}", path.display()))?;
        info!("Saved {}", path.display());
        Ok(())
    }

    /// Canvas size for rendering: own size, or `fallback` when either side is 0
    pub fn frame_size(&self, fallback: (usize, usize)) -> (usize, usize) {
        if self.width == 0 || self.height == 0 {
            fallback
        } else {
            (self.width, self.height)
        }
    }

    /// Total leaf elements over all layers
    pub fn leaf_count(&self) -> usize {
        self.layers.iter().map(Layer::leaf_count).sum()
    }

    /// Sample drawing: a paper layer, a filled blob with a clipped hatch
    /// layer on top, and an ink layer whose strokes were "drawn" out of
    /// stacking order.
    pub fn demo() -> Self {
        let t0 = CreatedAt::now();
        let at = |secs: i64| t0.offset(secs * 1_000_000);
        let meta = |paint: Paint, secs: i64| ElementMeta::with_created(paint, at(secs));

        let ink = Color::from_rgba8(0x22, 0x22, 0x2a, 0xff);
        let blob = Color::from_rgba8(0xf2, 0x9e, 0x4c, 0xff);
        let hatch = Color::from_rgba8(0x3b, 0x5b, 0xa5, 0xcc);

        let paper = Layer::new("Paper").with_elements([Element::Rect(RectShape {
            meta: meta(Paint::fill(Color::from_rgba8(0xfb, 0xf8, 0xf0, 0xff)), 0),
            origin: Vec2::ZERO,
            size: Vec2::new(320.0, 200.0),
        })]);

        let shape = Layer::new("Shape").with_elements([Element::Ellipse(EllipseShape {
            meta: meta(Paint::fill(blob), 1),
            center: Vec2::new(160.0, 100.0),
            radii: Vec2::new(90.0, 60.0),
        })]);

        let hatching = Layer::new("Hatching")
            .with_mask(MaskMode::Clip)
            .with_elements((0..12).map(|i| {
                let x = 40.0 + i as f32 * 22.0;
                Element::Line(LineShape {
                    meta: meta(Paint::stroke(hatch, 4.0), 10 + i),
                    start: Vec2::new(x, 20.0),
                    end: Vec2::new(x + 60.0, 180.0),
                })
            }));

        // Face strokes: eyes grouped, mouth drawn before the eyes
        let eyes = Element::Group(Group {
            meta: meta(Paint::default(), 3),
            children: vec![
                Element::Ellipse(EllipseShape {
                    meta: meta(Paint::fill(ink), 4),
                    center: Vec2::new(130.0, 85.0),
                    radii: Vec2::new(8.0, 10.0),
                }),
                Element::Ellipse(EllipseShape {
                    meta: meta(Paint::fill(ink), 5),
                    center: Vec2::new(190.0, 85.0),
                    radii: Vec2::new(8.0, 10.0),
                }),
            ],
        });
        let mouth = Element::Path(FreehandPath {
            meta: meta(Paint::stroke(ink, 5.0), 2),
            points: (0..=16)
                .map(|i| {
                    let t = i as f32 / 16.0;
                    Vec2::new(120.0 + t * 80.0, 120.0 + (t * std::f32::consts::PI).sin() * 20.0)
                })
                .collect(),
        });
        let ink_layer = Layer::new("Ink").with_elements([eyes, mouth]);

        let mut doc = Document::new(320, 200);
        doc.layers = vec![paper, shape, hatching, ink_layer];
        doc
    }
}
