//! Drawable elements - the closed set of vector primitives on a layer.
//!
//! Every variant implements [`Drawable`] (draw, bounds, hit-test, translate,
//! duplicate). Dispatch over the variants goes through `enum_dispatch`, so
//! `Element` is a plain tagged enum with no boxing.
//!
//! ## Creation timestamp
//!
//! `ElementMeta::created` is stamped once, when the element is built, and has
//! no setter. `CreatedAt::now()` never goes backwards within a process even if
//! the wall clock does, so stamps follow real creation order. Stamps are NOT
//! unique: batch-created elements can share one (see `timed_index`).
//!
//! ## Groups
//!
//! A [`Group`] owns its children exclusively (a plain ownership tree, no back
//! references). `Layer::ungroup()` hands them back to the layer.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use enum_dispatch::enum_dispatch;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::canvas::Surface;
use super::geometry::{Bounds, distance_to_polyline, distance_to_segment, ellipse_outline, polygon_contains};
use super::paint::Paint;

/// Segments used when an ellipse outline is stroked or hit-tested
const ELLIPSE_SEGMENTS: usize = 64;

/// Last stamp handed out, keeps `CreatedAt::now()` monotonic
static LAST_STAMP: AtomicI64 = AtomicI64::new(i64::MIN);

/// Creation time in microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatedAt(i64);

impl CreatedAt {
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Current time, never earlier than any stamp handed out before
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        let prev = LAST_STAMP.fetch_max(wall, Ordering::SeqCst);
        Self(prev.max(wall))
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// Stamp shifted by `micros` (tests and importers)
    pub fn offset(&self, micros: i64) -> Self {
        Self(self.0.saturating_add(micros))
    }
}

/// Attributes shared by every element variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementMeta {
    pub id: Uuid,
    pub z_index: i32,
    pub visible: bool,
    pub selected: bool,
    pub paint: Paint,
    created: CreatedAt,
}

impl ElementMeta {
    /// New meta stamped with the current time
    pub fn new(paint: Paint) -> Self {
        Self::with_created(paint, CreatedAt::now())
    }

    /// New meta with an explicit stamp (importers, batch creation)
    pub fn with_created(paint: Paint, created: CreatedAt) -> Self {
        Self {
            id: Uuid::new_v4(),
            z_index: 0,
            visible: true,
            selected: false,
            paint,
            created,
        }
    }

    pub fn with_z(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn created(&self) -> CreatedAt {
        self.created
    }

    /// Same attributes under a fresh id and stamp
    fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            created: CreatedAt::now(),
            ..self.clone()
        }
    }
}

/// Capability set of every element variant.
#[enum_dispatch]
pub trait Drawable {
    fn meta(&self) -> &ElementMeta;

    fn meta_mut(&mut self) -> &mut ElementMeta;

    /// Draw onto `surface`. Invisible or degenerate elements draw nothing.
    fn draw(&self, surface: &mut dyn Surface);

    /// Axis-aligned bounds including stroke width, None if empty
    fn bounds(&self) -> Option<Bounds>;

    /// True if `point` is within `tolerance` of the painted shape
    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool;

    fn translate(&mut self, offset: Vec2);

    /// Deep copy with fresh ids and creation stamps
    fn duplicate(&self) -> Element;

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn created(&self) -> CreatedAt {
        self.meta().created()
    }

    fn z_index(&self) -> i32 {
        self.meta().z_index
    }

    fn is_visible(&self) -> bool {
        self.meta().visible
    }
}

/// Freehand ink stroke through a list of points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FreehandPath {
    pub meta: ElementMeta,
    pub points: Vec<Vec2>,
}

/// Axis-aligned rectangle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectShape {
    pub meta: ElementMeta,
    pub origin: Vec2,
    pub size: Vec2,
}

/// Axis-aligned ellipse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipseShape {
    pub meta: ElementMeta,
    pub center: Vec2,
    pub radii: Vec2,
}

/// Straight line segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    pub meta: ElementMeta,
    pub start: Vec2,
    pub end: Vec2,
}

/// Group of child elements. The group's own paint is unused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub meta: ElementMeta,
    pub children: Vec<Element>,
}

/// Closed set of element variants.
#[enum_dispatch(Drawable)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Path(FreehandPath),
    Rect(RectShape),
    Ellipse(EllipseShape),
    Line(LineShape),
    Group(Group),
}

impl FreehandPath {
    pub fn new(points: Vec<Vec2>, paint: Paint) -> Self {
        Self {
            meta: ElementMeta::new(paint),
            points,
        }
    }
}

impl RectShape {
    pub fn new(origin: Vec2, size: Vec2, paint: Paint) -> Self {
        Self {
            meta: ElementMeta::new(paint),
            origin,
            size,
        }
    }

    fn corners(&self) -> [Vec2; 4] {
        let b = Bounds::new(self.origin, self.origin + self.size);
        [
            b.min,
            Vec2::new(b.max.x, b.min.y),
            b.max,
            Vec2::new(b.min.x, b.max.y),
        ]
    }
}

impl EllipseShape {
    pub fn new(center: Vec2, radii: Vec2, paint: Paint) -> Self {
        Self {
            meta: ElementMeta::new(paint),
            center,
            radii: radii.abs(),
        }
    }
}

impl LineShape {
    pub fn new(start: Vec2, end: Vec2, paint: Paint) -> Self {
        Self {
            meta: ElementMeta::new(paint),
            start,
            end,
        }
    }
}

impl Group {
    pub fn new(children: Vec<Element>) -> Self {
        Self {
            meta: ElementMeta::new(Paint::default()),
            children,
        }
    }

    /// Children in drawing order (z-index ascending, stable)
    pub fn ordered_children(&self) -> Vec<&Element> {
        let mut children: Vec<&Element> = self.children.iter().collect();
        children.sort_by_key(|e| e.z_index());
        children
    }
}

impl Drawable for FreehandPath {
    fn meta(&self) -> &ElementMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ElementMeta {
        &mut self.meta
    }

    fn draw(&self, surface: &mut dyn Surface) {
        // All points coinciding (or none at all) is a zero-size stroke
        let extent = Bounds::from_points(&self.points);
        if !self.meta.visible || extent.is_none_or(|b| b.width() <= 0.0 && b.height() <= 0.0) {
            return;
        }
        let paint = &self.meta.paint;
        if let Some(fill) = paint.effective_fill() {
            surface.fill_polygon(&self.points, fill);
        }
        if let Some(stroke) = paint.effective_stroke() {
            surface.stroke_polyline(&self.points, false, paint.stroke_width, stroke);
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points).map(|b| b.inflate(self.meta.paint.half_stroke()))
    }

    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool {
        if !self.meta.visible {
            return false;
        }
        if self.meta.paint.effective_fill().is_some() && polygon_contains(point, &self.points) {
            return true;
        }
        distance_to_polyline(point, &self.points, false)
            .is_some_and(|d| d <= self.meta.paint.half_stroke() + tolerance)
    }

    fn translate(&mut self, offset: Vec2) {
        for p in &mut self.points {
            *p += offset;
        }
    }

    fn duplicate(&self) -> Element {
        Element::Path(Self {
            meta: self.meta.duplicate(),
            points: self.points.clone(),
        })
    }
}

impl Drawable for RectShape {
    fn meta(&self) -> &ElementMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ElementMeta {
        &mut self.meta
    }

    fn draw(&self, surface: &mut dyn Surface) {
        if !self.meta.visible || self.size.x == 0.0 || self.size.y == 0.0 {
            return;
        }
        let corners = self.corners();
        let paint = &self.meta.paint;
        if let Some(fill) = paint.effective_fill() {
            surface.fill_polygon(&corners, fill);
        }
        if let Some(stroke) = paint.effective_stroke() {
            surface.stroke_polyline(&corners, true, paint.stroke_width, stroke);
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(Bounds::new(self.origin, self.origin + self.size).inflate(self.meta.paint.half_stroke()))
    }

    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool {
        if !self.meta.visible {
            return false;
        }
        let corners = self.corners();
        if self.meta.paint.effective_fill().is_some() && polygon_contains(point, &corners) {
            return true;
        }
        distance_to_polyline(point, &corners, true)
            .is_some_and(|d| d <= self.meta.paint.half_stroke() + tolerance)
    }

    fn translate(&mut self, offset: Vec2) {
        self.origin += offset;
    }

    fn duplicate(&self) -> Element {
        Element::Rect(Self {
            meta: self.meta.duplicate(),
            ..self.clone()
        })
    }
}

impl Drawable for EllipseShape {
    fn meta(&self) -> &ElementMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ElementMeta {
        &mut self.meta
    }

    fn draw(&self, surface: &mut dyn Surface) {
        if !self.meta.visible || self.radii.x <= 0.0 || self.radii.y <= 0.0 {
            return;
        }
        let paint = &self.meta.paint;
        if let Some(fill) = paint.effective_fill() {
            surface.fill_ellipse(self.center, self.radii, fill);
        }
        if let Some(stroke) = paint.effective_stroke() {
            let outline = ellipse_outline(self.center, self.radii, ELLIPSE_SEGMENTS);
            surface.stroke_polyline(&outline, true, paint.stroke_width, stroke);
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(Bounds::new(self.center - self.radii, self.center + self.radii).inflate(self.meta.paint.half_stroke()))
    }

    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool {
        if !self.meta.visible || self.radii.x <= 0.0 || self.radii.y <= 0.0 {
            return false;
        }
        if self.meta.paint.effective_fill().is_some() {
            let d = (point - self.center) / self.radii;
            if d.length_squared() <= 1.0 {
                return true;
            }
        }
        let outline = ellipse_outline(self.center, self.radii, ELLIPSE_SEGMENTS);
        distance_to_polyline(point, &outline, true)
            .is_some_and(|d| d <= self.meta.paint.half_stroke() + tolerance)
    }

    fn translate(&mut self, offset: Vec2) {
        self.center += offset;
    }

    fn duplicate(&self) -> Element {
        Element::Ellipse(Self {
            meta: self.meta.duplicate(),
            ..self.clone()
        })
    }
}

impl Drawable for LineShape {
    fn meta(&self) -> &ElementMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ElementMeta {
        &mut self.meta
    }

    fn draw(&self, surface: &mut dyn Surface) {
        if !self.meta.visible || self.start == self.end {
            return;
        }
        let paint = &self.meta.paint;
        if let Some(stroke) = paint.effective_stroke() {
            surface.stroke_polyline(&[self.start, self.end], false, paint.stroke_width, stroke);
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(Bounds::new(self.start, self.end).inflate(self.meta.paint.half_stroke()))
    }

    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool {
        self.meta.visible
            && distance_to_segment(point, self.start, self.end) <= self.meta.paint.half_stroke() + tolerance
    }

    fn translate(&mut self, offset: Vec2) {
        self.start += offset;
        self.end += offset;
    }

    fn duplicate(&self) -> Element {
        Element::Line(Self {
            meta: self.meta.duplicate(),
            ..self.clone()
        })
    }
}

impl Drawable for Group {
    fn meta(&self) -> &ElementMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ElementMeta {
        &mut self.meta
    }

    fn draw(&self, surface: &mut dyn Surface) {
        if !self.meta.visible {
            return;
        }
        for child in self.ordered_children() {
            child.draw(surface);
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        self.children
            .iter()
            .filter_map(Drawable::bounds)
            .reduce(|a, b| a.union(&b))
    }

    fn hit_test(&self, point: Vec2, tolerance: f32) -> bool {
        self.meta.visible && self.children.iter().any(|c| c.hit_test(point, tolerance))
    }

    fn translate(&mut self, offset: Vec2) {
        for child in &mut self.children {
            child.translate(offset);
        }
    }

    fn duplicate(&self) -> Element {
        Element::Group(Self {
            meta: self.meta.duplicate(),
            children: self.children.iter().map(Drawable::duplicate).collect(),
        })
    }
}

impl Element {
    pub fn is_group(&self) -> bool {
        matches!(self, Element::Group(_))
    }

    /// Variant name for logs and CLI listings
    pub fn kind_name(&self) -> &'static str {
        match self {
            Element::Path(_) => "path",
            Element::Rect(_) => "rect",
            Element::Ellipse(_) => "ellipse",
            Element::Line(_) => "line",
            Element::Group(_) => "group",
        }
    }

    /// Child elements (empty for non-groups)
    pub fn children(&self) -> &[Element] {
        match self {
            Element::Group(g) => &g.children,
            _ => &[],
        }
    }
}
