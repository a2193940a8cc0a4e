//! Render driver - glue between player, compositor and canvas.
//!
//! Live mode draws the full stack. Playback mode asks the player which
//! elements are revealed and hides the rest for that frame.

use std::path::Path;

use anyhow::{Context, Result};
use log::trace;

use super::player::Player;
use crate::config::Settings;
use crate::entities::canvas::{Canvas, SurfaceError};
use crate::entities::compositor::{Compositor, DrawStats, GroupPolicy, RevealSet};
use crate::entities::document::Document;
use crate::entities::layer::Layer;

#[derive(Debug)]
pub struct RenderDriver {
    compositor: Compositor,
    canvas: Canvas,
}

impl RenderDriver {
    pub fn new(compositor: Compositor, canvas: Canvas) -> Self {
        Self { compositor, canvas }
    }

    /// Driver for a `width` x `height` frame using `settings` for background
    /// and offscreen budget
    pub fn from_settings(settings: &Settings, width: usize, height: usize) -> Result<Self, SurfaceError> {
        let canvas = Canvas::new(width, height, settings.background)?.with_max_groups(settings.max_offscreen_groups);
        Ok(Self::new(Compositor::new(GroupPolicy::Auto), canvas))
    }

    /// Driver sized for `doc`, or for the settings canvas when the document
    /// has no size of its own
    pub fn for_document(settings: &Settings, doc: &Document) -> Result<Self> {
        let (width, height) = doc.frame_size((settings.canvas_width, settings.canvas_height));
        Self::from_settings(settings, width, height)
            .with_context(|| format!("Cannot create {}x{} render canvas", width, height))
    }

    /// Clear and draw every visible element
    pub fn render_live(&mut self, layers: &[Layer]) -> DrawStats {
        self.canvas.clear();
        self.compositor.draw(layers, &mut self.canvas)
    }

    /// Clear and draw the elements `player` has revealed so far
    pub fn render_playback(&mut self, layers: &[Layer], player: &Player) -> DrawStats {
        self.render_reveal(layers, &player.visible_set())
    }

    /// Clear and draw only the elements in `reveal`
    pub fn render_reveal(&mut self, layers: &[Layer], reveal: &RevealSet) -> DrawStats {
        self.canvas.clear();
        let stats = self.compositor.draw_filtered(layers, &mut self.canvas, Some(reveal));
        trace!("Playback frame: {} revealed, {} drawn", reveal.len(), stats.elements_drawn);
        stats
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Current frame as straight 8-bit RGBA
    pub fn frame_rgba8(&self) -> Vec<u8> {
        self.canvas.to_rgba8()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.canvas.save_png(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackSpeed;
    use crate::core::timer::ManualScheduler;
    use crate::entities::element::{CreatedAt, Element, ElementMeta, RectShape};
    use crate::entities::paint::{Color, Paint};
    use glam::Vec2;
    use std::sync::Arc;

    /// Two 5x10 rects side by side, the right one created first
    fn stack() -> Vec<Layer> {
        let rect = |x: f32, micros: i64| {
            Element::Rect(RectShape {
                meta: ElementMeta::with_created(Paint::fill(Color::BLACK), CreatedAt::from_micros(micros)),
                origin: Vec2::new(x, 0.0),
                size: Vec2::new(5.0, 10.0),
            })
        };
        vec![Layer::new("ink").with_elements([rect(0.0, 20), rect(5.0, 10)])]
    }

    fn driver() -> RenderDriver {
        RenderDriver::from_settings(&Settings::default(), 10, 10).unwrap()
    }

    fn is_black(driver: &RenderDriver, x: usize) -> bool {
        driver.canvas().pixel(x, 5) == Some([0.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_render_live_draws_everything() {
        let mut d = driver();
        let stats = d.render_live(&stack());
        assert_eq!(stats.elements_drawn, 2);
        assert!(is_black(&d, 2) && is_black(&d, 7));
    }

    #[test]
    fn test_render_playback_follows_cursor() {
        let layers = stack();
        let scheduler = ManualScheduler::new();
        let player = Player::new(&Settings::default(), Arc::new(scheduler.clone()));
        player.load(&layers);
        let mut d = driver();

        assert_eq!(d.render_playback(&layers, &player).elements_drawn, 0);
        assert!(!is_black(&d, 2) && !is_black(&d, 7));

        player.play(PlaybackSpeed::Normal);
        scheduler.fire();
        d.render_playback(&layers, &player);
        // Earliest stroke is the right-hand rect
        assert!(!is_black(&d, 2) && is_black(&d, 7));

        scheduler.fire();
        assert_eq!(d.render_playback(&layers, &player).elements_drawn, 2);
        assert!(is_black(&d, 2));
    }

    #[test]
    fn test_frame_rgba8_and_png() {
        let mut d = driver();
        d.render_live(&stack());
        let rgba = d.frame_rgba8();
        assert_eq!(rgba.len(), 10 * 10 * 4);
        assert_eq!(&rgba[..4], &[0, 0, 0, 255]);

        let path = std::env::temp_dir().join(format!("inkplay_frame_{}.png", uuid::Uuid::new_v4()));
        d.save_png(&path).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_huge_frame_is_an_error_not_a_crash() {
        let err = RenderDriver::from_settings(&Settings::default(), usize::MAX / 2, 3).unwrap_err();
        assert!(matches!(err, SurfaceError::TooLarge { height: 3, .. }));

        let mut doc = Document::new(usize::MAX / 2, 3);
        doc.layers = stack();
        let err = RenderDriver::for_document(&Settings::default(), &doc).unwrap_err();
        assert!(err.to_string().contains("Cannot create"));
    }

    #[test]
    fn test_sizeless_document_uses_settings_canvas() {
        let mut settings = Settings::default();
        settings.canvas_width = 12;
        settings.canvas_height = 7;
        let d = RenderDriver::for_document(&settings, &Document::new(0, 0)).unwrap();
        assert_eq!((d.canvas().width(), d.canvas().height()), (12, 7));

        let d = RenderDriver::for_document(&settings, &Document::new(30, 20)).unwrap();
        assert_eq!((d.canvas().width(), d.canvas().height()), (30, 20));
    }
}
