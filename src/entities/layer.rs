//! Layer - ordered container of drawable elements.
//!
//! # Stack order
//!
//! A drawing is a `Vec<Layer>`; index 0 is the bottom. Elements inside a layer
//! are drawn in z-index order (ascending, stable over insertion order).
//!
//! # Masking
//!
//! A layer with `MaskMode::Clip` is clipped to the alpha shape of the nearest
//! `Normal` layer below it. Only a contiguous run of `Clip` layers directly
//! above a `Normal` base forms a clip group; see `compositor` for the rules.
//!
//! # Ownership
//!
//! The editing side creates, edits and removes layers. Playback and the
//! compositor only ever borrow them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::element::{Drawable, Element};

/// Masking relationship of a layer to the layer stack below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskMode {
    /// Drawn on its own
    #[default]
    Normal,
    /// Clipped to the alpha of the base layer below the run
    Clip,
}

/// Single layer of a drawing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub mask: MaskMode,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub elements: Vec<Element>,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            locked: false,
            mask: MaskMode::Normal,
            opacity: 1.0,
            elements: Vec::new(),
        }
    }

    /// Builder: set masking mode
    pub fn with_mask(mut self, mask: MaskMode) -> Self {
        self.mask = mask;
        self
    }

    /// Builder: set visibility
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Builder: set opacity (clamped to 0..1)
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Builder: append elements
    pub fn with_elements(mut self, elements: impl IntoIterator<Item = Element>) -> Self {
        self.elements.extend(elements);
        self
    }

    pub fn is_clip(&self) -> bool {
        self.mask == MaskMode::Clip
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in drawing order (z-index ascending, stable)
    pub fn ordered_elements(&self) -> Vec<&Element> {
        let mut elements: Vec<&Element> = self.elements.iter().collect();
        elements.sort_by_key(|e| e.z_index());
        elements
    }

    /// Append an element (editing side). Ignored on locked layers.
    pub fn push(&mut self, element: Element) -> bool {
        if self.locked {
            log::debug!("Layer '{}' is locked, element not added", self.name);
            return false;
        }
        self.elements.push(element);
        true
    }

    /// Find an element by id (top level only)
    pub fn element(&self, id: Uuid) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    /// Find an element by id anywhere in the layer, including group children
    pub fn find(&self, id: Uuid) -> Option<&Element> {
        fn walk(elements: &[Element], id: Uuid) -> Option<&Element> {
            elements.iter().find_map(|e| {
                if e.id() == id {
                    Some(e)
                } else {
                    walk(e.children(), id)
                }
            })
        }
        walk(&self.elements, id)
    }

    /// Dissolve a top-level group, moving its children back into the layer
    /// at the group's position. Returns the number of children released, or
    /// None if `group_id` is not a top-level group of this layer.
    pub fn ungroup(&mut self, group_id: Uuid) -> Option<usize> {
        if self.locked {
            return None;
        }
        let pos = self
            .elements
            .iter()
            .position(|e| e.is_group() && e.id() == group_id)?;
        let Element::Group(group) = self.elements.remove(pos) else {
            return None;
        };
        let count = group.children.len();
        self.elements.splice(pos..pos, group.children);
        Some(count)
    }

    /// Count of leaf elements (group children counted individually)
    pub fn leaf_count(&self) -> usize {
        fn count(e: &Element) -> usize {
            if e.is_group() {
                e.children().iter().map(count).sum()
            } else {
                1
            }
        }
        self.elements.iter().map(count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::element::{Group, LineShape, RectShape};
    use crate::entities::paint::Paint;
    use glam::Vec2;

    fn line() -> Element {
        Element::Line(LineShape::new(Vec2::ZERO, Vec2::ONE, Paint::default()))
    }

    #[test]
    fn test_ordered_elements_by_z_then_insertion() {
        let mut a = LineShape::new(Vec2::ZERO, Vec2::ONE, Paint::default());
        a.meta.z_index = 2;
        let mut b = LineShape::new(Vec2::ZERO, Vec2::ONE, Paint::default());
        b.meta.z_index = 1;
        let mut c = LineShape::new(Vec2::ZERO, Vec2::ONE, Paint::default());
        c.meta.z_index = 1;
        let (ida, idb, idc) = (a.meta.id, b.meta.id, c.meta.id);

        let layer = Layer::new("L").with_elements([Element::Line(a), Element::Line(b), Element::Line(c)]);
        let order: Vec<Uuid> = layer.ordered_elements().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec![idb, idc, ida]);
    }

    #[test]
    fn test_ungroup_transfers_children_in_place() {
        let first = line();
        let last = line();
        let group = Group::new(vec![line(), line(), line()]);
        let group_id = group.meta.id;
        let child_ids: Vec<Uuid> = group.children.iter().map(|c| c.id()).collect();

        let mut layer = Layer::new("L").with_elements([first.clone(), Element::Group(group), last.clone()]);
        assert_eq!(layer.leaf_count(), 5);
        assert_eq!(layer.find(child_ids[1]).map(|e| e.id()), Some(child_ids[1]));
        assert!(layer.element(child_ids[1]).is_none());
        assert_eq!(layer.ungroup(group_id), Some(3));

        let ids: Vec<Uuid> = layer.elements.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![first.id(), child_ids[0], child_ids[1], child_ids[2], last.id()]);
        assert_eq!(layer.ungroup(group_id), None);
    }

    #[test]
    fn test_locked_layer_rejects_edits() {
        let mut layer = Layer::new("L");
        layer.locked = true;
        assert!(!layer.push(Element::Rect(RectShape::new(Vec2::ZERO, Vec2::ONE, Paint::default()))));
        assert!(layer.is_empty());
    }

    #[test]
    fn test_serde_defaults() {
        let layer: Layer = serde_json::from_str(
            r#"{"id":"67e55044-10b1-426f-9247-bb680e5fe0c8","name":"Ink"}"#,
        )
        .unwrap();
        assert!(layer.visible);
        assert_eq!(layer.mask, MaskMode::Normal);
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.elements.is_empty());
    }
}
