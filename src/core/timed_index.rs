//! Timed-element index - every drawable leaf of a layer stack in creation order.
//!
//! # Ordering
//!
//! 1. Flatten: layers bottom to top, inside a layer by z-index ascending
//!    (insertion order on ties), recursing into groups. Groups themselves
//!    are not entries, their children are.
//! 2. Stable sort by creation stamp ascending.
//!
//! Equal stamps therefore keep flattening order, and building twice from the
//! same input yields the same index.
//!
//! Hidden layers, groups and elements are indexed like visible ones: the
//! index mirrors the document, visibility is a drawing concern.
//!
//! Large inputs are sorted on the rayon pool (`par_sort_by_key` is stable too).
//! Building never touches the layers beyond reading them.

use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use uuid::Uuid;

use crate::entities::compositor::RevealSet;
use crate::entities::element::{CreatedAt, Drawable, Element};
use crate::entities::layer::Layer;

/// Default element count from which sorting runs on the rayon pool
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 8192;

/// One entry of the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementRef {
    /// Position of the owning layer in the stack
    pub layer_index: usize,
    /// Owning layer id (back-reference for redraw)
    pub layer_id: Uuid,
    pub element_id: Uuid,
    pub created: CreatedAt,
}

/// Ordered, immutable list of `ElementRef`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimedIndex {
    entries: Vec<ElementRef>,
}

impl TimedIndex {
    /// Build with the default parallel threshold
    pub fn build(layers: &[Layer]) -> Self {
        Self::build_with_threshold(layers, DEFAULT_PARALLEL_THRESHOLD)
    }

    /// Build, sorting on rayon when there are at least `parallel_threshold` entries
    pub fn build_with_threshold(layers: &[Layer], parallel_threshold: usize) -> Self {
        let started = Instant::now();
        let mut entries = Vec::with_capacity(layers.iter().map(Layer::leaf_count).sum());

        for (layer_index, layer) in layers.iter().enumerate() {
            for element in layer.ordered_elements() {
                flatten(element, layer_index, layer.id, &mut entries);
            }
        }

        let parallel = entries.len() >= parallel_threshold;
        if parallel {
            entries.par_sort_by_key(|e| e.created);
        } else {
            entries.sort_by_key(|e| e.created);
        }

        debug!(
            "TimedIndex: {} elements from {} layers in {:.2}ms{}",
            entries.len(),
            layers.len(),
            started.elapsed().as_secs_f64() * 1000.0,
            if parallel { " (parallel sort)" } else { "" }
        );
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ElementRef] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&ElementRef> {
        self.entries.get(position)
    }

    /// Ids of the first `cursor` entries (clamped to the index length)
    pub fn reveal_set(&self, cursor: usize) -> RevealSet {
        self.entries[..cursor.min(self.entries.len())]
            .iter()
            .map(|e| e.element_id)
            .collect()
    }
}

fn flatten(element: &Element, layer_index: usize, layer_id: Uuid, out: &mut Vec<ElementRef>) {
    if let Element::Group(group) = element {
        for child in group.ordered_children() {
            flatten(child, layer_index, layer_id, out);
        }
        return;
    }
    out.push(ElementRef {
        layer_index,
        layer_id,
        element_id: element.id(),
        created: element.created(),
    });
}
