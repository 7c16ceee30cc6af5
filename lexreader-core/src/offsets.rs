//! Conversion of live selections into page-local character ranges.

use serde::{Deserialize, Serialize};

use crate::text_layer::{DomPosition, Node, PageNumber, TextLayer, TextRange};

/// Shortest selection accepted as a highlight; shorter ones are usually
/// stray double-clicks.
pub const MIN_SELECTION_CHARS: usize = 3;

/// Viewport-relative box of one selection fragment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A live selection confined to one page's text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub page: PageNumber,
    pub anchor: DomPosition,
    pub focus: DomPosition,
    pub rects: Vec<SelectionRect>,
}

impl Selection {
    /// Selection between two plain-text offsets of `layer`.
    pub fn between(layer: &TextLayer, anchor: usize, focus: usize) -> Option<Self> {
        Some(Self {
            page: layer.page(),
            anchor: layer.position_at(anchor)?,
            focus: layer.position_at(focus)?,
            rects: Vec::new(),
        })
    }

    pub fn with_rects(mut self, rects: Vec<SelectionRect>) -> Self {
        self.rects = rects;
        self
    }
}

/// Plain-text offset of a DOM boundary, or `None` if it does not exist in
/// the layer.
pub fn offset_of(layer: &TextLayer, position: &DomPosition) -> Option<usize> {
    match layer.node(&position.path) {
        Some(Node::Text(text)) => {
            if position.offset > text.chars().count() {
                return None;
            }
            let leaf = layer
                .text_leaves()
                .into_iter()
                .find(|leaf| leaf.path == position.path)?;
            Some(leaf.start + position.offset)
        }
        Some(Node::Element(_)) | None => {
            let children = layer.children_at(&position.path)?;
            if position.offset > children.len() {
                return None;
            }
            // Everything strictly before the boundary child in document order.
            let boundary = position.path.child(position.offset);
            Some(
                layer
                    .text_leaves()
                    .into_iter()
                    .take_while(|leaf| leaf.path < boundary)
                    .map(|leaf| leaf.len)
                    .sum(),
            )
        }
    }
}

/// Maps `selection` to a page-local `[start, end)` range.
///
/// Returns `None` for selections on another page, boundaries that do not
/// resolve, and ranges shorter than `min_chars`.
pub fn map_selection(layer: &TextLayer, selection: &Selection, min_chars: usize) -> Option<TextRange> {
    if selection.page != layer.page() {
        return None;
    }
    let anchor = offset_of(layer, &selection.anchor)?;
    let focus = offset_of(layer, &selection.focus)?;
    let range = TextRange::normalized(anchor, focus);
    (range.len() >= min_chars.max(1)).then_some(range)
}
