//! Projection of stored highlights into a page's text layer.
//!
//! Rendering is idempotent: previously injected markers are unwrapped and
//! adjacent text merged before every range is applied again, so a layer can
//! be re-rendered after any store mutation without accumulating markers.

use tracing::debug;

use crate::note::{HighlightColor, Note, NoteId};
use crate::text_layer::{byte_index, Element, MarkerTag, Node, NodePath, TextLayer, TextRange};

/// One range to project as a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSpec {
    pub range: TextRange,
    pub color: HighlightColor,
    pub note_id: NoteId,
}

impl From<&Note> for HighlightSpec {
    fn from(note: &Note) -> Self {
        Self {
            range: note.range(),
            color: note.highlight_color,
            note_id: note.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Ranges that produced at least one marker.
    pub applied: usize,
    /// Notes whose range fell outside the layer.
    pub skipped: Vec<NoteId>,
}

/// Unwraps every marker back into plain text and merges adjacent text nodes.
/// Returns the number of markers removed.
pub fn strip_markers(layer: &mut TextLayer) -> usize {
    let mut removed = 0;
    let children = std::mem::take(layer.children_mut());
    *layer.children_mut() = unwrap_markers(children, &mut removed);
    removed
}

fn unwrap_markers(nodes: Vec<Node>, removed: &mut usize) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Element(element) if element.marker_tag().is_some() => {
                *removed += 1;
                for inner in unwrap_markers(element.children, removed) {
                    push_merged(&mut out, inner);
                }
            }
            Node::Element(mut element) => {
                element.children = unwrap_markers(element.children, removed);
                out.push(Node::Element(element));
            }
            text @ Node::Text(_) => push_merged(&mut out, text),
        }
    }
    out
}

fn push_merged(out: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text(text) if text.is_empty() => {}
        Node::Text(text) => match out.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(&text),
            _ => out.push(Node::Text(text)),
        },
        element => out.push(element),
    }
}

/// Strips old markers, then wraps each range in a marker element.
///
/// Ranges are applied independently; overlapping ranges nest markers rather
/// than being merged or rejected.
pub fn render_highlights(layer: &mut TextLayer, specs: &[HighlightSpec]) -> RenderReport {
    strip_markers(layer);

    let mut report = RenderReport::default();
    for spec in specs {
        if apply_range(layer, spec) > 0 {
            report.applied += 1;
        } else {
            report.skipped.push(spec.note_id.clone());
        }
    }

    debug!(
        page = layer.page(),
        applied = report.applied,
        skipped = report.skipped.len(),
        "rendered highlights"
    );
    report
}

/// Wraps the part of every overlapping leaf in a marker. Returns the number
/// of markers created.
fn apply_range(layer: &mut TextLayer, spec: &HighlightSpec) -> usize {
    let tag = MarkerTag {
        note_id: spec.note_id.clone(),
        color: spec.color,
    };
    let mut created = 0;

    // Back to front, so splitting a leaf never shifts the paths still to visit.
    for leaf in layer.text_leaves().into_iter().rev() {
        let Some(hit) = spec.range.intersect(leaf.start, leaf.end()) else {
            continue;
        };
        let Some((parent, index)) = leaf.path.parent() else {
            continue;
        };
        let Some(siblings) = layer.children_at_mut(&parent) else {
            continue;
        };
        let Some(Node::Text(text)) = siblings.get(index) else {
            continue;
        };

        let local_start = byte_index(text, hit.start - leaf.start);
        let local_end = byte_index(text, hit.end - leaf.start);
        let before = &text[..local_start];
        let middle = &text[local_start..local_end];
        let after = &text[local_end..];

        let mut replacement = Vec::with_capacity(3);
        if !before.is_empty() {
            replacement.push(Node::Text(before.to_owned()));
        }
        replacement.push(Node::Element(Element::marker(tag.clone(), middle)));
        if !after.is_empty() {
            replacement.push(Node::Text(after.to_owned()));
        }

        siblings.splice(index..=index, replacement);
        created += 1;
    }
    created
}

/// Marks the layer's delegated click listener as bound. Returns `true` only
/// the first time; later calls are no-ops, so re-renders never rebind.
pub fn bind_click_listener(layer: &mut TextLayer) -> bool {
    if layer.is_click_bound() {
        return false;
    }
    layer.set_click_bound();
    true
}

/// Delivers a click on `target` through the layer's delegated listener.
///
/// When the click lands inside a marker, `on_focus` receives its note id.
/// Layers without a bound listener ignore clicks.
pub fn dispatch_click<F>(layer: &TextLayer, target: &NodePath, on_focus: F) -> Option<NoteId>
where
    F: FnOnce(&NoteId),
{
    if !layer.is_click_bound() {
        return None;
    }
    let note_id = layer.marker_at(target)?.note_id.clone();
    on_focus(&note_id);
    Some(note_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(start: usize, end: usize, id: &str, color: HighlightColor) -> HighlightSpec {
        HighlightSpec {
            range: TextRange { start, end },
            color,
            note_id: NoteId::from(id),
        }
    }

    fn layer() -> TextLayer {
        TextLayer::from_spans(5, &["The ", "Plaintiff alleges ", "breach of contract."])
    }

    #[test]
    fn wraps_range_spanning_several_leaves() {
        let mut layer = layer();
        let original = layer.plain_text();
        let report = render_highlights(&mut layer, &[spec(4, 28, "n1", HighlightColor::Blue)]);

        assert_eq!(report.applied, 1);
        assert_eq!(layer.plain_text(), original);

        let marked: String = layer
            .segments()
            .into_iter()
            .filter(|s| s.marker.is_some())
            .map(|s| s.text)
            .collect();
        assert_eq!(marked, "Plaintiff alleges breach");
        assert_eq!(layer.markers().len(), 2);
        assert!(layer
            .markers()
            .iter()
            .all(|m| m.class_name() == "highlight-blue"));
    }

    #[test]
    fn split_keeps_before_and_after_text() {
        let mut layer = TextLayer::from_spans(1, &["abcdefgh"]);
        render_highlights(&mut layer, &[spec(2, 5, "n1", HighlightColor::Yellow)]);

        let span = match &layer.children()[0] {
            Node::Element(element) => element,
            Node::Text(_) => panic!("expected span"),
        };
        assert_eq!(span.children.len(), 3);
        assert_eq!(span.children[0], Node::Text("ab".into()));
        assert!(matches!(&span.children[1], Node::Element(m) if m.marker_tag().is_some()));
        assert_eq!(span.children[2], Node::Text("fgh".into()));
    }

    #[test]
    fn rendering_twice_is_idempotent() {
        let specs = [
            spec(0, 3, "a", HighlightColor::Green),
            spec(10, 20, "b", HighlightColor::Pink),
        ];
        let mut once = layer();
        render_highlights(&mut once, &specs);
        let mut twice = once.clone();
        render_highlights(&mut twice, &specs);
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_then_reapply_round_trips_text() {
        let original = layer();
        let specs = [
            spec(0, 4, "a", HighlightColor::Green),
            spec(6, 15, "b", HighlightColor::Blue),
            spec(22, 41, "c", HighlightColor::Purple),
        ];

        let mut layer = original.clone();
        render_highlights(&mut layer, &specs);
        let removed = strip_markers(&mut layer);
        assert_eq!(removed, 3);
        assert_eq!(layer, original);

        render_highlights(&mut layer, &specs);
        assert_eq!(layer.plain_text(), original.plain_text());
        assert_eq!(layer.markers().len(), 3);
    }

    #[test]
    fn out_of_range_specs_are_skipped() {
        let mut layer = layer();
        let report = render_highlights(&mut layer, &[spec(100, 120, "gone", HighlightColor::Yellow)]);
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, vec![NoteId::from("gone")]);
        assert!(layer.markers().is_empty());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let mut layer = TextLayer::from_spans(1, &["§ 12 Änderung"]);
        render_highlights(&mut layer, &[spec(5, 8, "n", HighlightColor::Yellow)]);
        let marked: Vec<_> = layer.segments().into_iter().filter(|s| s.marker.is_some()).collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].text, "Änd");
    }

    #[test]
    fn click_listener_binds_once_and_resolves_markers() {
        let mut layer = layer();
        assert!(bind_click_listener(&mut layer));
        assert!(!bind_click_listener(&mut layer));

        render_highlights(&mut layer, &[spec(4, 13, "n1", HighlightColor::Blue)]);
        // Span 1 is now [marker("Plaintiff"), text(" alleges ")].
        let mut focused = None;
        let hit = dispatch_click(&layer, &NodePath::new([1, 0, 0]), |id| focused = Some(id.clone()));
        assert_eq!(hit, Some(NoteId::from("n1")));
        assert_eq!(focused, Some(NoteId::from("n1")));

        let miss = dispatch_click(&layer, &NodePath::new([1, 1]), |_| panic!("no marker here"));
        assert_eq!(miss, None);

        // Re-rendering keeps the binding.
        render_highlights(&mut layer, &[spec(4, 13, "n2", HighlightColor::Blue)]);
        assert_eq!(
            dispatch_click(&layer, &NodePath::new([1, 0, 0]), |_| {}),
            Some(NoteId::from("n2"))
        );
    }

    #[test]
    fn unbound_layers_ignore_clicks() {
        let mut layer = layer();
        render_highlights(&mut layer, &[spec(4, 13, "n1", HighlightColor::Blue)]);
        assert_eq!(dispatch_click(&layer, &NodePath::new([1, 0, 0]), |_| {}), None);
    }
}
