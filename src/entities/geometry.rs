//! Small 2D helpers on top of `glam::Vec2`.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box (min inclusive, max inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Bounds of a point cloud, None for an empty slice
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut b = Bounds::new(*first, *first);
        for p in rest {
            b.min = b.min.min(*p);
            b.max = b.max.max(*p);
        }
        Some(b)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Zero area (a point or a degenerate line)
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Grow on every side by `amount`
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    pub fn union(&self, other: &Bounds) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn translate(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }
}

/// Distance from `p` to segment `a..b`
pub fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Distance from `p` to an open polyline (or closed, when `closed`).
/// Returns None for an empty polyline.
pub fn distance_to_polyline(p: Vec2, points: &[Vec2], closed: bool) -> Option<f32> {
    match points {
        [] => None,
        [single] => Some(p.distance(*single)),
        _ => {
            let mut best = f32::INFINITY;
            for w in points.windows(2) {
                best = best.min(distance_to_segment(p, w[0], w[1]));
            }
            if closed {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    best = best.min(distance_to_segment(p, *last, *first));
                }
            }
            Some(best)
        }
    }
}

/// Non-zero winding test for a closed polygon
pub fn polygon_contains(p: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut winding = 0i32;
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let cross = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
        if a.y <= p.y {
            if b.y > p.y && cross > 0.0 {
                winding += 1;
            }
        } else if b.y <= p.y && cross < 0.0 {
            winding -= 1;
        }
    }
    winding != 0
}

/// Sample an ellipse outline as a closed polygon
pub fn ellipse_outline(center: Vec2, radii: Vec2, segments: usize) -> Vec<Vec2> {
    let segments = segments.max(8);
    (0..segments)
        .map(|i| {
            let t = i as f32 / segments as f32 * std::f32::consts::TAU;
            center + Vec2::new(radii.x * t.cos(), radii.y * t.sin())
        })
        .collect()
}
