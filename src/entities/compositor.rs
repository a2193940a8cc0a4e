//! Layer compositor - draws a layer stack onto a surface.
//!
//! Painter's algorithm, bottom (index 0) to top, with lookahead masking:
//!
//! - A `Normal` layer followed by a contiguous run of `Clip` layers is a
//!   clip group. The base is drawn into an offscreen group, each visible clip
//!   layer is drawn into a nested group merged with `SourceAtop` (kept only
//!   where the base has alpha), then the whole group is flushed.
//! - If no clip layer of the run is visible the base is drawn directly, with
//!   no offscreen group.
//! - A hidden clip layer is skipped but does not end the run.
//! - A hidden or empty base hides its whole run.
//! - A `Clip` layer with no `Normal` base below it (bottom of the stack) is
//!   drawn as a standalone layer.
//!
//! Layers are never mutated. During playback a `RevealSet` limits drawing to
//! elements revealed so far; everything else counts as invisible for the frame.
//!
//! Surface failures (offscreen allocation refused) never abort a frame: the
//! base layer is drawn directly without its clip layers and the fallback is
//! counted in `DrawStats`.

use std::collections::HashSet;

use log::{trace, warn};
use uuid::Uuid;

use super::canvas::{CompositeRule, Surface};
use super::element::{Drawable, Element};
use super::layer::Layer;

/// Set of element ids revealed by playback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealSet {
    ids: HashSet<Uuid>,
}

impl RevealSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: Uuid) {
        self.ids.insert(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<Uuid> for RevealSet {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// When the compositor uses offscreen groups for unmasked layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GroupPolicy {
    /// Groups only where a visible clip run needs them
    #[default]
    Auto,
    /// Route every visible base layer through an offscreen group
    Always,
}

/// Per-frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub layers_drawn: usize,
    pub layers_skipped: usize,
    pub elements_drawn: usize,
    pub groups_opened: usize,
    pub fallbacks: usize,
}

/// Stateless layer-stack renderer.
#[derive(Clone, Debug, Default)]
pub struct Compositor {
    pub policy: GroupPolicy,
}

impl Compositor {
    pub fn new(policy: GroupPolicy) -> Self {
        Self { policy }
    }

    /// Draw every visible element of `layers` onto `surface`
    pub fn draw(&self, layers: &[Layer], surface: &mut dyn Surface) -> DrawStats {
        self.draw_filtered(layers, surface, None)
    }

    /// Draw `layers`, limited to `reveal` when given
    pub fn draw_filtered(
        &self,
        layers: &[Layer],
        surface: &mut dyn Surface,
        reveal: Option<&RevealSet>,
    ) -> DrawStats {
        let mut pass = Pass {
            surface,
            reveal,
            stats: DrawStats::default(),
        };

        let mut i = 0;
        while i < layers.len() {
            let layer = &layers[i];

            if layer.is_clip() {
                // No Normal base below: nothing to clip against
                trace!("Compositor: orphan clip layer '{}' drawn standalone", layer.name);
                pass.draw_layer(layer);
                i += 1;
                continue;
            }

            let run_end = clip_run_end(layers, i);
            let run = &layers[i + 1..run_end];

            if !layer.visible || layer.is_empty() {
                pass.stats.layers_skipped += 1 + run.len();
                i = run_end;
                continue;
            }

            let any_visible_clip = run.iter().any(|l| l.visible);
            if !any_visible_clip && self.policy == GroupPolicy::Auto {
                pass.draw_layer(layer);
                pass.stats.layers_skipped += run.len();
            } else {
                pass.draw_clip_group(layer, run);
            }
            i = run_end;
        }

        trace!("Compositor: {:?}", pass.stats);
        pass.stats
    }
}

/// Index one past the contiguous `Clip` run above `base`
fn clip_run_end(layers: &[Layer], base: usize) -> usize {
    let mut end = base + 1;
    while end < layers.len() && layers[end].is_clip() {
        end += 1;
    }
    end
}

/// State of a single `draw_filtered()` call
struct Pass<'s, 'r> {
    surface: &'s mut dyn Surface,
    reveal: Option<&'r RevealSet>,
    stats: DrawStats,
}

impl Pass<'_, '_> {
    /// Base layer plus its clip run through offscreen groups
    fn draw_clip_group(&mut self, base: &Layer, run: &[Layer]) {
        if let Err(e) = self.surface.push_group(CompositeRule::SourceOver, 1.0) {
            warn!("Compositor: clip group for '{}' unavailable ({}), drawing base flat", base.name, e);
            self.stats.fallbacks += 1;
            self.stats.layers_skipped += run.len();
            self.draw_layer(base);
            return;
        }
        self.stats.groups_opened += 1;
        self.draw_layer(base);

        for clip in run {
            if !clip.visible || clip.opacity <= 0.0 {
                self.stats.layers_skipped += 1;
                continue;
            }
            if let Err(e) = self.surface.push_group(CompositeRule::SourceAtop, clip.opacity) {
                warn!("Compositor: clip layer '{}' dropped ({})", clip.name, e);
                self.stats.fallbacks += 1;
                self.stats.layers_skipped += 1;
                continue;
            }
            self.stats.groups_opened += 1;
            self.draw_elements(clip);
            self.stats.layers_drawn += 1;
            self.pop();
        }

        self.pop();
    }

    /// One layer on its own, honoring visibility and opacity
    fn draw_layer(&mut self, layer: &Layer) {
        if !layer.visible || layer.opacity <= 0.0 || layer.is_empty() {
            self.stats.layers_skipped += 1;
            return;
        }

        if layer.opacity < 1.0 {
            match self.surface.push_group(CompositeRule::SourceOver, layer.opacity) {
                Ok(()) => {
                    self.stats.groups_opened += 1;
                    self.draw_elements(layer);
                    self.pop();
                }
                Err(e) => {
                    warn!("Compositor: opacity group for '{}' unavailable ({}), drawing opaque", layer.name, e);
                    self.stats.fallbacks += 1;
                    self.draw_elements(layer);
                }
            }
        } else {
            self.draw_elements(layer);
        }
        self.stats.layers_drawn += 1;
    }

    fn draw_elements(&mut self, layer: &Layer) {
        for element in layer.ordered_elements() {
            self.draw_element(element);
        }
    }

    fn draw_element(&mut self, element: &Element) {
        if !element.is_visible() {
            return;
        }
        if let Element::Group(group) = element {
            for child in group.ordered_children() {
                self.draw_element(child);
            }
            return;
        }
        if self.reveal.is_some_and(|r| !r.contains(element.id())) {
            return;
        }
        element.draw(&mut *self.surface);
        self.stats.elements_drawn += 1;
    }

    fn pop(&mut self) {
        if let Err(e) = self.surface.pop_group() {
            warn!("Compositor: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::canvas::Canvas;
    use crate::entities::element::{Group, RectShape};
    use crate::entities::layer::MaskMode;
    use crate::entities::paint::{Color, Paint};
    use glam::Vec2;

    const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);

    fn rect(x: f32, y: f32, w: f32, h: f32, color: Color) -> Element {
        Element::Rect(RectShape::new(Vec2::new(x, y), Vec2::new(w, h), Paint::fill(color)))
    }

    fn canvas() -> Canvas {
        Canvas::new(20, 10, Color::TRANSPARENT).unwrap()
    }

    fn px(canvas: &Canvas, x: usize, y: usize) -> [f32; 4] {
        canvas.pixel(x, y).unwrap()
    }

    fn approx_eq(a: &Canvas, b: &Canvas) -> bool {
        a.pixels()
            .iter()
            .zip(b.pixels().iter())
            .all(|(x, y)| (x - y).abs() < 1e-5)
    }

    /// Base covers x 0..10; clip covers x 5..15
    fn masked_stack(clip_visible: bool) -> Vec<Layer> {
        vec![
            Layer::new("base").with_elements([rect(0.0, 0.0, 10.0, 10.0, RED)]),
            Layer::new("clip")
                .with_mask(MaskMode::Clip)
                .with_visible(clip_visible)
                .with_elements([rect(5.0, 0.0, 10.0, 10.0, GREEN)]),
        ]
    }

    #[test]
    fn test_empty_stack_and_empty_layers() {
        let mut c = canvas();
        let stats = Compositor::default().draw(&[], &mut c);
        assert_eq!(stats, DrawStats::default());

        let layers = vec![Layer::new("empty"), Layer::new("clip").with_mask(MaskMode::Clip)];
        let stats = Compositor::default().draw(&layers, &mut c);
        assert_eq!(stats.elements_drawn, 0);
        assert_eq!(stats.groups_opened, 0);
        assert!(c.pixels().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_clip_layer_constrained_to_base_alpha() {
        let mut c = canvas();
        let stats = Compositor::default().draw(&masked_stack(true), &mut c);

        assert_eq!(px(&c, 2, 5), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(px(&c, 7, 5), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(stats.groups_opened, 2);
        assert_eq!(stats.layers_drawn, 2);
    }

    #[test]
    fn test_hidden_clip_run_draws_base_directly() {
        let mut c = canvas();
        let stats = Compositor::default().draw(&masked_stack(false), &mut c);
        assert_eq!(stats.groups_opened, 0);
        assert_eq!(c.groups_opened(), 0);
        assert_eq!(px(&c, 7, 5), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hidden_clip_does_not_split_run() {
        // base, clip(hidden), clip(visible): last layer is still clipped to base
        let layers = vec![
            Layer::new("base").with_elements([rect(0.0, 0.0, 10.0, 10.0, RED)]),
            Layer::new("hidden")
                .with_mask(MaskMode::Clip)
                .with_visible(false)
                .with_elements([rect(0.0, 0.0, 20.0, 10.0, BLUE)]),
            Layer::new("clip")
                .with_mask(MaskMode::Clip)
                .with_elements([rect(5.0, 0.0, 10.0, 10.0, GREEN)]),
        ];
        let mut c = canvas();
        let stats = Compositor::default().draw(&layers, &mut c);
        assert_eq!(px(&c, 7, 5), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(stats.layers_skipped, 1);
    }

    #[test]
    fn test_invisible_base_hides_run_without_groups() {
        let mut layers = masked_stack(true);
        layers[0].visible = false;
        let mut c = canvas();
        let stats = Compositor::default().draw(&layers, &mut c);
        assert_eq!(stats.groups_opened, 0);
        assert_eq!(stats.layers_skipped, 2);
        assert!(c.pixels().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normal_layer_after_run_is_not_clipped() {
        let mut layers = masked_stack(true);
        layers.push(Layer::new("top").with_elements([rect(15.0, 0.0, 5.0, 10.0, BLUE)]));
        let mut c = canvas();
        Compositor::default().draw(&layers, &mut c);
        assert_eq!(px(&c, 17, 5), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_orphan_clip_layer_drawn_standalone() {
        let layers = vec![
            Layer::new("orphan")
                .with_mask(MaskMode::Clip)
                .with_elements([rect(0.0, 0.0, 5.0, 10.0, BLUE)]),
        ];
        let mut c = canvas();
        let stats = Compositor::default().draw(&layers, &mut c);
        assert_eq!(px(&c, 2, 5), [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(stats.layers_drawn, 1);
    }

    #[test]
    fn test_group_policy_equivalence_without_clip_layers() {
        let layers = vec![
            Layer::new("a").with_elements([
                rect(0.0, 0.0, 12.0, 8.0, Color::rgba(1.0, 0.0, 0.0, 0.6)),
                rect(4.0, 2.0, 12.0, 8.0, Color::rgba(0.0, 0.0, 1.0, 0.5)),
            ]),
            Layer::new("b")
                .with_opacity(0.5)
                .with_elements([rect(8.0, 0.0, 12.0, 10.0, GREEN)]),
        ];

        let mut direct = Canvas::new(20, 10, Color::WHITE).unwrap();
        let direct_stats = Compositor::new(GroupPolicy::Auto).draw(&layers, &mut direct);
        let mut grouped = Canvas::new(20, 10, Color::WHITE).unwrap();
        let grouped_stats = Compositor::new(GroupPolicy::Always).draw(&layers, &mut grouped);

        assert!(grouped_stats.groups_opened > direct_stats.groups_opened);
        assert!(approx_eq(&direct, &grouped));
    }

    #[test]
    fn test_group_budget_falls_back_to_flat_base() {
        let mut c = canvas().with_max_groups(0);
        let stats = Compositor::default().draw(&masked_stack(true), &mut c);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(c.group_depth(), 0);
        // Base drawn, clip dropped
        assert_eq!(px(&c, 7, 5), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_reveal_set_limits_drawing() {
        let first = rect(0.0, 0.0, 5.0, 10.0, RED);
        let second = rect(10.0, 0.0, 5.0, 10.0, BLUE);
        let reveal: RevealSet = [first.id()].into_iter().collect();
        let layers = vec![Layer::new("L").with_elements([first, second])];

        let mut c = canvas();
        let stats = Compositor::default().draw_filtered(&layers, &mut c, Some(&reveal));
        assert_eq!(stats.elements_drawn, 1);
        assert_eq!(px(&c, 2, 5), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reveal_set_reaches_into_groups() {
        let a = rect(0.0, 0.0, 5.0, 10.0, RED);
        let b = rect(10.0, 0.0, 5.0, 10.0, BLUE);
        let reveal: RevealSet = [b.id()].into_iter().collect();
        let layers = vec![Layer::new("L").with_elements([Element::Group(Group::new(vec![a, b]))])];

        let mut c = canvas();
        Compositor::default().draw_filtered(&layers, &mut c, Some(&reveal));
        assert_eq!(px(&c, 2, 5), [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_z_index_controls_overlap() {
        let mut below = RectShape::new(Vec2::ZERO, Vec2::new(10.0, 10.0), Paint::fill(RED));
        below.meta.z_index = 5;
        let mut above = RectShape::new(Vec2::ZERO, Vec2::new(10.0, 10.0), Paint::fill(BLUE));
        above.meta.z_index = 9;
        // Inserted top-first; z-index wins
        let layers = vec![Layer::new("L").with_elements([Element::Rect(above), Element::Rect(below)])];
        let mut c = canvas();
        Compositor::default().draw(&layers, &mut c);
        assert_eq!(px(&c, 5, 5), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_layer_opacity_does_not_double_blend() {
        // Two opaque rects overlapping on x 5..10
        let layers = vec![
            Layer::new("ink")
                .with_opacity(0.5)
                .with_elements([rect(0.0, 0.0, 10.0, 10.0, RED), rect(5.0, 0.0, 10.0, 10.0, RED)]),
        ];
        let mut c = canvas();
        let stats = Compositor::default().draw(&layers, &mut c);

        assert_eq!(stats.groups_opened, 1);
        assert_eq!(px(&c, 2, 5), [0.5, 0.0, 0.0, 0.5]);
        // Overlap gets the same coverage as a single rect
        assert_eq!(px(&c, 7, 5), px(&c, 2, 5));
        assert_eq!(px(&c, 12, 5), [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_clip_layer_opacity_blends_over_base() {
        let mut layers = masked_stack(true);
        layers[1].opacity = 0.5;
        let mut c = canvas();
        Compositor::default().draw(&layers, &mut c);

        assert_eq!(px(&c, 2, 5), [1.0, 0.0, 0.0, 1.0]);
        // Half green over red, base alpha kept
        assert_eq!(px(&c, 7, 5), [0.5, 0.5, 0.0, 1.0]);
        assert_eq!(px(&c, 12, 5), [0.0, 0.0, 0.0, 0.0]);
    }
}
