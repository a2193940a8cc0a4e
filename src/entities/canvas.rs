//! Paint surface contract and the CPU raster surface.
//!
//! `Surface` is the only thing the compositor and the elements draw through.
//! A host can back it with a GPU device context; `Canvas` is the built-in
//! software implementation used by the CLI, the render driver and tests.
//!
//! # Pixel format
//!
//! `Canvas` stores premultiplied RGBA as `f32` (4 floats per pixel), the same
//! layout as an F32 frame buffer. Coverage is sampled at pixel centers, so
//! output is deterministic and free of anti-aliasing noise.
//!
//! # Accumulation groups
//!
//! `push_group()` opens a transparent offscreen buffer that receives all
//! subsequent draws. `pop_group()` merges it into the buffer below using the
//! group's `CompositeRule` and opacity. The number of simultaneously open
//! groups is bounded by `max_groups`; exceeding it (or failing to allocate the
//! buffer) returns `SurfaceError` instead of aborting.

use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec2;
use log::trace;
use thiserror::Error;

use super::geometry::{Bounds, distance_to_polyline, ellipse_outline, polygon_contains};
use super::paint::Color;

/// Default limit on simultaneously open offscreen groups
pub const DEFAULT_MAX_GROUPS: usize = 8;

/// How a finished accumulation group is merged into the buffer below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeRule {
    /// Plain painter's algorithm
    SourceOver,
    /// Group pixels land only where the backdrop already has alpha; the
    /// backdrop alpha is kept. Used for clip layers over their base.
    SourceAtop,
}

/// Failures a surface may report while compositing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("offscreen group budget exceeded (depth {depth}, limit {limit})")]
    GroupBudgetExceeded { depth: usize, limit: usize },
    #[error("failed to allocate offscreen group of {bytes} bytes")]
    Allocation { bytes: usize },
    #[error("canvas of {width}x{height} pixels is too large")]
    TooLarge { width: usize, height: usize },
    #[error("pop_group called without an open group")]
    Unbalanced,
}

/// Paint-surface contract consumed by elements and the compositor.
pub trait Surface {
    /// Surface size in pixels (width, height)
    fn size(&self) -> (usize, usize);

    /// Fill a closed polygon (non-zero winding)
    fn fill_polygon(&mut self, points: &[Vec2], color: Color);

    /// Stroke a polyline with round joins/caps of the given width
    fn stroke_polyline(&mut self, points: &[Vec2], closed: bool, width: f32, color: Color);

    /// Fill an axis-aligned ellipse
    fn fill_ellipse(&mut self, center: Vec2, radii: Vec2, color: Color);

    /// Open an offscreen accumulation group
    fn push_group(&mut self, rule: CompositeRule, opacity: f32) -> Result<(), SurfaceError>;

    /// Merge the innermost open group into its parent
    fn pop_group(&mut self) -> Result<(), SurfaceError>;

    /// Number of currently open groups
    fn group_depth(&self) -> usize;
}

/// One pixel buffer of the group stack
#[derive(Clone, Debug)]
struct GroupBuffer {
    pixels: Vec<f32>,
    rule: CompositeRule,
    opacity: f32,
}

/// Software raster surface (premultiplied RGBA f32).
#[derive(Clone, Debug)]
pub struct Canvas {
    width: usize,
    height: usize,
    background: Color,
    /// `stack[0]` is the target; every further entry is an open group
    stack: Vec<GroupBuffer>,
    max_groups: usize,
    /// Groups opened since the last `clear()`
    groups_opened: usize,
}

impl Canvas {
    /// New canvas cleared to `background`. Fails instead of aborting when
    /// the pixel buffer size overflows or cannot be allocated.
    pub fn new(width: usize, height: usize, background: Color) -> Result<Self, SurfaceError> {
        let pixels = alloc_buffer(width, height, background.premultiplied())?;
        Ok(Self {
            width,
            height,
            background,
            stack: vec![GroupBuffer {
                pixels,
                rule: CompositeRule::SourceOver,
                opacity: 1.0,
            }],
            max_groups: DEFAULT_MAX_GROUPS,
            groups_opened: 0,
        })
    }

    /// Limit simultaneously open groups (0 disables offscreen compositing)
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn background(&self) -> Color {
        self.background
    }

    /// Drop any open groups and reset the target to the background color
    pub fn clear(&mut self) {
        let bg = self.background.premultiplied();
        self.stack.truncate(1);
        if let Some(target) = self.stack.first_mut() {
            for px in target.pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&bg);
            }
        }
        self.groups_opened = 0;
    }

    /// Groups opened since the last `clear()`
    pub fn groups_opened(&self) -> usize {
        self.groups_opened
    }

    /// Premultiplied RGBA of the target buffer at (x, y)
    pub fn pixel(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        let px = &self.stack[0].pixels[i..i + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Raw premultiplied target pixels
    pub fn pixels(&self) -> &[f32] {
        &self.stack[0].pixels
    }

    /// Un-premultiplied 8-bit RGBA of the target buffer
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 4);
        for px in self.stack[0].pixels.chunks_exact(4) {
            let a = px[3].clamp(0.0, 1.0);
            let unpremul = |c: f32| if a > 0.0 { (c / a).clamp(0.0, 1.0) } else { 0.0 };
            out.push((unpremul(px[0]) * 255.0).round() as u8);
            out.push((unpremul(px[1]) * 255.0).round() as u8);
            out.push((unpremul(px[2]) * 255.0).round() as u8);
            out.push((a * 255.0).round() as u8);
        }
        out
    }

    /// Write the target buffer as PNG
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = image::RgbaImage::from_raw(self.width as u32, self.height as u32, self.to_rgba8())
            .context("Canvas buffer size does not match its dimensions")?;
        image
            .save(path)
            .with_context(|| format!("Failed to write PNG: {}", path.display()))?;
        trace!("Canvas saved to {}", path.display());
        Ok(())
    }

    /// Integer pixel range covered by `bounds`, clamped to the canvas
    fn pixel_range(&self, bounds: &Bounds) -> Option<(usize, usize, usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let x0 = bounds.min.x.floor().max(0.0);
        let y0 = bounds.min.y.floor().max(0.0);
        let x1 = bounds.max.x.ceil().min(self.width as f32);
        let y1 = bounds.max.y.ceil().min(self.height as f32);
        if !(x0 < x1 && y0 < y1) {
            return None;
        }
        Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
    }

    /// Source-over every pixel center in `bounds` for which `covered` holds
    fn rasterize(&mut self, bounds: &Bounds, color: Color, covered: impl Fn(Vec2) -> bool) {
        if color.is_invisible() {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.pixel_range(bounds) else {
            return;
        };
        let src = color.premultiplied();
        let inv = 1.0 - src[3];
        let width = self.width;
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if !covered(center) {
                    continue;
                }
                let i = (y * width + x) * 4;
                let dst = &mut top.pixels[i..i + 4];
                for c in 0..4 {
                    dst[c] = src[c] + dst[c] * inv;
                }
            }
        }
    }
}

/// Pixel buffer of `width` x `height` premultiplied RGBA, filled with `fill`
fn alloc_buffer(width: usize, height: usize, fill: [f32; 4]) -> Result<Vec<f32>, SurfaceError> {
    let len = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(4))
        .ok_or(SurfaceError::TooLarge { width, height })?;
    let mut pixels: Vec<f32> = Vec::new();
    pixels.try_reserve_exact(len).map_err(|_| SurfaceError::Allocation {
        bytes: len.saturating_mul(std::mem::size_of::<f32>()),
    })?;
    for _ in 0..len / 4 {
        pixels.extend_from_slice(&fill);
    }
    Ok(pixels)
}

impl Surface for Canvas {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn fill_polygon(&mut self, points: &[Vec2], color: Color) {
        if points.len() < 3 {
            return;
        }
        let Some(bounds) = Bounds::from_points(points) else {
            return;
        };
        if bounds.is_degenerate() {
            return;
        }
        self.rasterize(&bounds, color, |p| polygon_contains(p, points));
    }

    fn stroke_polyline(&mut self, points: &[Vec2], closed: bool, width: f32, color: Color) {
        if points.len() < 2 || width <= 0.0 {
            return;
        }
        let Some(bounds) = Bounds::from_points(points) else {
            return;
        };
        let half = width * 0.5;
        self.rasterize(&bounds.inflate(half), color, |p| {
            distance_to_polyline(p, points, closed).is_some_and(|d| d <= half)
        });
    }

    fn fill_ellipse(&mut self, center: Vec2, radii: Vec2, color: Color) {
        if radii.x <= 0.0 || radii.y <= 0.0 {
            return;
        }
        let bounds = Bounds::new(center - radii, center + radii);
        self.rasterize(&bounds, color, |p| {
            let d = (p - center) / radii;
            d.length_squared() <= 1.0
        });
    }

    fn push_group(&mut self, rule: CompositeRule, opacity: f32) -> Result<(), SurfaceError> {
        let depth = self.group_depth();
        if depth >= self.max_groups {
            return Err(SurfaceError::GroupBudgetExceeded {
                depth,
                limit: self.max_groups,
            });
        }

        let pixels = alloc_buffer(self.width, self.height, [0.0; 4])?;

        self.stack.push(GroupBuffer {
            pixels,
            rule,
            opacity: opacity.clamp(0.0, 1.0),
        });
        self.groups_opened += 1;
        trace!("Canvas: push_group {:?} (depth {})", rule, depth + 1);
        Ok(())
    }

    fn pop_group(&mut self) -> Result<(), SurfaceError> {
        if self.stack.len() < 2 {
            return Err(SurfaceError::Unbalanced);
        }
        let group = self.stack.pop().ok_or(SurfaceError::Unbalanced)?;
        let dst = self.stack.last_mut().ok_or(SurfaceError::Unbalanced)?;
        let opacity = group.opacity;

        for (d, s) in dst.pixels.chunks_exact_mut(4).zip(group.pixels.chunks_exact(4)) {
            let sa = s[3] * opacity;
            if sa <= 0.0 {
                continue;
            }
            let inv = 1.0 - sa;
            match group.rule {
                CompositeRule::SourceOver => {
                    for c in 0..4 {
                        d[c] = s[c] * opacity + d[c] * inv;
                    }
                }
                CompositeRule::SourceAtop => {
                    let da = d[3];
                    for c in 0..3 {
                        d[c] = s[c] * opacity * da + d[c] * inv;
                    }
                }
            }
        }
        trace!("Canvas: pop_group {:?} (depth {})", group.rule, self.stack.len() - 1);
        Ok(())
    }

    fn group_depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 4], b: [f32; 4]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    fn square(x: f32, y: f32, size: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(x, y),
            Vec2::new(x + size, y),
            Vec2::new(x + size, y + size),
            Vec2::new(x, y + size),
        ]
    }

    #[test]
    fn test_clear_to_background() {
        let canvas = Canvas::new(4, 4, Color::WHITE).unwrap();
        assert_eq!(canvas.pixel(3, 3), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn test_fill_polygon_covers_inside_only() {
        let mut canvas = Canvas::new(10, 10, Color::TRANSPARENT).unwrap();
        canvas.fill_polygon(&square(2.0, 2.0, 4.0), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(canvas.pixel(3, 3), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(canvas.pixel(8, 8), Some([0.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_degenerate_shapes_draw_nothing() {
        let mut canvas = Canvas::new(8, 8, Color::TRANSPARENT).unwrap();
        canvas.fill_polygon(&[Vec2::ZERO, Vec2::new(4.0, 0.0), Vec2::new(8.0, 0.0)], Color::BLACK);
        canvas.fill_ellipse(Vec2::new(4.0, 4.0), Vec2::new(0.0, 3.0), Color::BLACK);
        canvas.stroke_polyline(&[Vec2::new(1.0, 1.0)], false, 3.0, Color::BLACK);
        canvas.stroke_polyline(&[Vec2::ZERO, Vec2::new(8.0, 8.0)], false, 0.0, Color::BLACK);
        assert!(canvas.pixels().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_group_source_over_matches_direct() {
        let red = Color::rgba(1.0, 0.0, 0.0, 0.5);
        let blue = Color::rgba(0.0, 0.0, 1.0, 0.5);

        let mut direct = Canvas::new(6, 6, Color::WHITE).unwrap();
        direct.fill_polygon(&square(0.0, 0.0, 4.0), red);
        direct.fill_polygon(&square(2.0, 2.0, 4.0), blue);

        let mut grouped = Canvas::new(6, 6, Color::WHITE).unwrap();
        grouped.push_group(CompositeRule::SourceOver, 1.0).unwrap();
        grouped.fill_polygon(&square(0.0, 0.0, 4.0), red);
        grouped.fill_polygon(&square(2.0, 2.0, 4.0), blue);
        grouped.pop_group().unwrap();

        for y in 0..6 {
            for x in 0..6 {
                assert!(approx(direct.pixel(x, y).unwrap(), grouped.pixel(x, y).unwrap()));
            }
        }
    }

    #[test]
    fn test_source_atop_keeps_backdrop_alpha() {
        let mut canvas = Canvas::new(10, 10, Color::TRANSPARENT).unwrap();
        canvas.push_group(CompositeRule::SourceOver, 1.0).unwrap();
        // Base: left half
        canvas.fill_polygon(&square(0.0, 0.0, 5.0), Color::rgb(1.0, 0.0, 0.0));
        canvas.push_group(CompositeRule::SourceAtop, 1.0).unwrap();
        // Clip: overlaps base and spills outside it
        canvas.fill_polygon(&square(3.0, 0.0, 5.0), Color::rgb(0.0, 1.0, 0.0));
        canvas.pop_group().unwrap();
        canvas.pop_group().unwrap();

        // Inside base and clip: green
        assert!(approx(canvas.pixel(4, 2).unwrap(), [0.0, 1.0, 0.0, 1.0]));
        // Inside base only: red
        assert!(approx(canvas.pixel(1, 2).unwrap(), [1.0, 0.0, 0.0, 1.0]));
        // Clip outside base: nothing
        assert!(approx(canvas.pixel(7, 2).unwrap(), [0.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_group_budget() {
        let mut canvas = Canvas::new(2, 2, Color::TRANSPARENT).unwrap().with_max_groups(1);
        assert!(canvas.push_group(CompositeRule::SourceOver, 1.0).is_ok());
        assert_eq!(
            canvas.push_group(CompositeRule::SourceOver, 1.0),
            Err(SurfaceError::GroupBudgetExceeded { depth: 1, limit: 1 })
        );
        assert!(canvas.pop_group().is_ok());
        assert_eq!(canvas.pop_group(), Err(SurfaceError::Unbalanced));
        assert_eq!(canvas.groups_opened(), 1);
    }

    #[test]
    fn test_to_rgba8_unpremultiplies() {
        let mut canvas = Canvas::new(1, 1, Color::TRANSPARENT).unwrap();
        canvas.fill_polygon(&square(0.0, 0.0, 1.0), Color::rgba(1.0, 0.0, 0.0, 0.5));
        assert_eq!(canvas.to_rgba8(), vec![255, 0, 0, 128]);
    }

    #[test]
    fn test_oversized_canvas_is_an_error() {
        assert_eq!(
            Canvas::new(usize::MAX / 2, 3, Color::WHITE).err(),
            Some(SurfaceError::TooLarge {
                width: usize::MAX / 2,
                height: 3
            })
        );
        // Fits in usize but not in memory
        assert!(matches!(
            Canvas::new(1 << 30, 1 << 20, Color::WHITE).err(),
            Some(SurfaceError::Allocation { .. })
        ));
    }

    #[test]
    fn test_clear_reuses_target_and_drops_groups() {
        let mut canvas = Canvas::new(3, 3, Color::WHITE).unwrap();
        canvas.fill_polygon(&square(0.0, 0.0, 3.0), Color::BLACK);
        canvas.push_group(CompositeRule::SourceOver, 1.0).unwrap();
        canvas.clear();
        assert_eq!(canvas.group_depth(), 0);
        assert_eq!(canvas.groups_opened(), 0);
        assert!(canvas.pixels().iter().all(|v| *v == 1.0));
    }
}
