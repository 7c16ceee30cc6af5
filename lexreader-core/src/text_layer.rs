//! Owned model of a page's selectable text layer.
//!
//! A text layer is an ordered tree: spans emitted by the PDF text source,
//! text leaves inside them, and highlight markers injected around parts of
//! those leaves. The page's plain-text offset space is the concatenation of
//! every text leaf in document order, counted in `char`s.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::note::{HighlightColor, NoteId};

/// 1-based page number.
pub type PageNumber = u32;

/// Half-open `[start, end)` range in a page's plain-text offset space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    /// Builds a range from two boundaries captured in either order.
    pub fn normalized(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub(crate) fn intersect(&self, start: usize, end: usize) -> Option<TextRange> {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        (lo < hi).then_some(TextRange { start: lo, end: hi })
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Identity and colour carried by an injected highlight marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTag {
    pub note_id: NoteId,
    pub color: HighlightColor,
}

impl MarkerTag {
    pub fn class_name(&self) -> String {
        format!("highlight-{}", self.color)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// A run of text emitted by the PDF text source.
    Span,
    Marker(MarkerTag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub children: Vec<Node>,
}

impl Element {
    pub fn span(text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Span,
            children: vec![Node::Text(text.into())],
        }
    }

    pub fn marker(tag: MarkerTag, text: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Marker(tag),
            children: vec![Node::Text(text.into())],
        }
    }

    pub fn marker_tag(&self) -> Option<&MarkerTag> {
        match &self.kind {
            ElementKind::Marker(tag) => Some(tag),
            ElementKind::Span => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

/// Child-index path from the layer root to a node. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<(NodePath, usize)> {
        let (last, rest) = self.0.split_last()?;
        Some((NodePath(rest.to_vec()), *last))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialOrd for NodePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodePath {
    /// Document order: ancestors sort before their descendants.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// A selection boundary in DOM terms.
///
/// When `path` names a text node, `offset` counts chars into that text.
/// When it names an element or the root, `offset` is a child index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomPosition {
    pub path: NodePath,
    pub offset: usize,
}

impl DomPosition {
    pub fn new(path: NodePath, offset: usize) -> Self {
        Self { path, offset }
    }
}

/// A text leaf located in the page's offset space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLeaf {
    pub path: NodePath,
    pub start: usize,
    pub len: usize,
}

impl TextLeaf {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A run of text sharing the same innermost marker, for painting.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub range: TextRange,
    pub marker: Option<MarkerTag>,
}

/// The rendered text layer of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    page: PageNumber,
    children: Vec<Node>,
    click_bound: bool,
}

impl TextLayer {
    pub fn new(page: PageNumber, spans: Vec<Element>) -> Self {
        Self {
            page,
            children: spans.into_iter().map(Node::Element).collect(),
            click_bound: false,
        }
    }

    /// Convenience constructor with one unpositioned span per string.
    pub fn from_spans<S: AsRef<str>>(page: PageNumber, spans: &[S]) -> Self {
        Self::new(
            page,
            spans
                .iter()
                .map(|text| Element::span(text.as_ref()))
                .collect(),
        )
    }

    pub fn page(&self) -> PageNumber {
        self.page
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub(crate) fn is_click_bound(&self) -> bool {
        self.click_bound
    }

    pub(crate) fn set_click_bound(&mut self) {
        self.click_bound = true;
    }

    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            match node {
                Node::Element(element) => node = element.children.get(*index)?,
                Node::Text(_) => return None,
            }
        }
        Some(node)
    }

    /// Children of the element (or root) at `path`.
    pub fn children_at(&self, path: &NodePath) -> Option<&[Node]> {
        if path.is_root() {
            return Some(&self.children);
        }
        match self.node(path)? {
            Node::Element(element) => Some(&element.children),
            Node::Text(_) => None,
        }
    }

    pub(crate) fn children_at_mut(&mut self, path: &NodePath) -> Option<&mut Vec<Node>> {
        let mut children = &mut self.children;
        for index in path.indices() {
            match children.get_mut(*index)? {
                Node::Element(element) => children = &mut element.children,
                Node::Text(_) => return None,
            }
        }
        Some(children)
    }

    /// Every text leaf in document order with its offset span.
    pub fn text_leaves(&self) -> Vec<TextLeaf> {
        let mut leaves = Vec::new();
        let mut cursor = 0;
        collect_leaves(&self.children, &NodePath::root(), &mut cursor, &mut leaves);
        leaves
    }

    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        push_text(&self.children, &mut out);
        out
    }

    pub fn text_len(&self) -> usize {
        self.text_leaves().last().map(TextLeaf::end).unwrap_or(0)
    }

    /// Plain text covered by `range`, clamped to the layer length.
    pub fn slice(&self, range: TextRange) -> String {
        self.plain_text()
            .chars()
            .skip(range.start)
            .take(range.len())
            .collect()
    }

    /// Maps a plain-text offset back to a boundary inside a text leaf.
    ///
    /// An offset that falls on the seam between two leaves resolves to the
    /// end of the earlier one; both describe the same offset.
    pub fn position_at(&self, offset: usize) -> Option<DomPosition> {
        let leaves = self.text_leaves();
        if leaves.is_empty() {
            return (offset == 0).then(|| DomPosition::new(NodePath::root(), 0));
        }
        leaves
            .into_iter()
            .find(|leaf| offset <= leaf.end())
            .map(|leaf| DomPosition::new(leaf.path, offset - leaf.start))
    }

    /// Nearest marker enclosing (or being) the node at `path`.
    pub fn marker_at(&self, path: &NodePath) -> Option<&MarkerTag> {
        let mut found = None;
        let mut children = &self.children;
        for index in path.indices() {
            match children.get(*index)? {
                Node::Element(element) => {
                    if let Some(tag) = element.marker_tag() {
                        found = Some(tag);
                    }
                    children = &element.children;
                }
                Node::Text(_) => break,
            }
        }
        found
    }

    /// Leaf runs annotated with their innermost marker.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut cursor = 0;
        collect_segments(&self.children, None, &mut cursor, &mut segments);
        segments
    }

    pub fn markers(&self) -> Vec<MarkerTag> {
        let mut markers = Vec::new();
        collect_markers(&self.children, &mut markers);
        markers
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the `at`-th char, or the end of the string.
pub(crate) fn byte_index(text: &str, at: usize) -> usize {
    text.char_indices()
        .nth(at)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

fn collect_leaves(nodes: &[Node], base: &NodePath, cursor: &mut usize, out: &mut Vec<TextLeaf>) {
    for (index, node) in nodes.iter().enumerate() {
        let path = base.child(index);
        match node {
            Node::Text(text) => {
                let len = char_len(text);
                out.push(TextLeaf {
                    path,
                    start: *cursor,
                    len,
                });
                *cursor += len;
            }
            Node::Element(element) => collect_leaves(&element.children, &path, cursor, out),
        }
    }
}

fn push_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => push_text(&element.children, out),
        }
    }
}

fn collect_segments(
    nodes: &[Node],
    marker: Option<&MarkerTag>,
    cursor: &mut usize,
    out: &mut Vec<Segment>,
) {
    for node in nodes {
        match node {
            Node::Text(text) => {
                let len = char_len(text);
                if len == 0 {
                    continue;
                }
                let range = TextRange {
                    start: *cursor,
                    end: *cursor + len,
                };
                *cursor += len;
                let extends_last = matches!(
                    out.last(),
                    Some(last) if last.marker.as_ref() == marker && last.range.end == range.start
                );
                match out.last_mut() {
                    Some(last) if extends_last => {
                        last.text.push_str(text);
                        last.range.end = range.end;
                    }
                    _ => out.push(Segment {
                        text: text.clone(),
                        range,
                        marker: marker.cloned(),
                    }),
                }
            }
            Node::Element(element) => {
                let inner = element.marker_tag().or(marker);
                collect_segments(&element.children, inner, cursor, out);
            }
        }
    }
}

fn collect_markers(nodes: &[Node], out: &mut Vec<MarkerTag>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if let Some(tag) = element.marker_tag() {
                out.push(tag.clone());
            }
            collect_markers(&element.children, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> TextLayer {
        TextLayer::from_spans(3, &["Plaintiff ", "alleges ", "breach"])
    }

    #[test]
    fn plain_text_concatenates_leaves_in_order() {
        let layer = layer();
        assert_eq!(layer.plain_text(), "Plaintiff alleges breach");
        assert_eq!(layer.text_len(), 24);

        let leaves = layer.text_leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[1].path, NodePath::new([1, 0]));
        assert_eq!(leaves[1].start, 10);
        assert_eq!(leaves[2].end(), 24);
    }

    #[test]
    fn offsets_count_chars_not_bytes() {
        let layer = TextLayer::from_spans(1, &["§ 12 ", "Änderung"]);
        assert_eq!(layer.text_len(), 13);
        assert_eq!(layer.slice(TextRange { start: 5, end: 8 }), "Änd");
    }

    #[test]
    fn position_at_resolves_into_leaves() {
        let layer = layer();
        assert_eq!(
            layer.position_at(12),
            Some(DomPosition::new(NodePath::new([1, 0]), 2))
        );
        assert_eq!(
            layer.position_at(10),
            Some(DomPosition::new(NodePath::new([0, 0]), 10))
        );
        assert_eq!(
            layer.position_at(24),
            Some(DomPosition::new(NodePath::new([2, 0]), 6))
        );
        assert_eq!(layer.position_at(25), None);
    }

    #[test]
    fn node_lookup_follows_paths() {
        let layer = layer();
        assert!(matches!(
            layer.node(&NodePath::new([2, 0])),
            Some(Node::Text(text)) if text == "breach"
        ));
        assert!(layer.node(&NodePath::new([2, 0, 0])).is_none());
        assert!(layer.node(&NodePath::new([9])).is_none());
        assert_eq!(layer.children_at(&NodePath::root()).map(|c| c.len()), Some(3));
    }

    #[test]
    fn marker_at_finds_enclosing_marker() {
        let tag = MarkerTag {
            note_id: NoteId::from("n-1"),
            color: HighlightColor::Blue,
        };
        let span = Element {
            kind: ElementKind::Span,
            children: vec![
                Node::Text("before ".into()),
                Node::Element(Element::marker(tag.clone(), "marked")),
            ],
        };
        let layer = TextLayer::new(1, vec![span]);

        assert_eq!(layer.marker_at(&NodePath::new([0, 1, 0])), Some(&tag));
        assert_eq!(layer.marker_at(&NodePath::new([0, 1])), Some(&tag));
        assert_eq!(layer.marker_at(&NodePath::new([0, 0])), None);
        assert_eq!(tag.class_name(), "highlight-blue");

        let segments = layer.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].range, TextRange { start: 7, end: 13 });
        assert_eq!(segments[1].marker, Some(tag));
    }

    #[test]
    fn range_overlap_is_half_open() {
        let a = TextRange { start: 10, end: 20 };
        assert!(a.overlaps(&TextRange { start: 15, end: 25 }));
        assert!(!a.overlaps(&TextRange { start: 20, end: 25 }));
        assert_eq!(TextRange::normalized(9, 4), TextRange { start: 4, end: 9 });
    }
}
