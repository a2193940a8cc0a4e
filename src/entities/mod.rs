//! Entities module - drawing model and CPU rendering
//!
//! Elements live in layers, layers form a document. The compositor draws a
//! layer stack onto any `Surface`; `Canvas` is the software one.

pub mod canvas;
pub mod compositor;
pub mod document;
pub mod element;
pub mod geometry;
pub mod layer;
pub mod paint;

pub use canvas::{Canvas, CompositeRule, Surface, SurfaceError};
pub use compositor::{Compositor, DrawStats, GroupPolicy, RevealSet};
pub use document::Document;
pub use element::{CreatedAt, Drawable, Element, ElementMeta};
pub use layer::{Layer, MaskMode};
pub use paint::{Color, Paint};
