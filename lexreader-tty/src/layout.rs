//! Wraps text layers into terminal rows and models the scrolling viewport.

use lexreader_core::{MarkerTag, PageNumber, TextLayer, TextRange, VisibilityEntry};

/// A run of characters on one row sharing a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    pub start: usize,
    pub len: usize,
    pub marker: Option<MarkerTag>,
}

impl Piece {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    PageHeader,
    Text,
    /// Placeholder for a page whose text layer is not mounted yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub page: PageNumber,
    pub kind: RowKind,
    pub pieces: Vec<Piece>,
    /// Page offset where the row begins, for rows without pieces too.
    pub start: usize,
}

impl Row {
    fn new(page: PageNumber, kind: RowKind, start: usize) -> Self {
        Self {
            page,
            kind,
            pieces: Vec::new(),
            start,
        }
    }

    pub fn end(&self) -> usize {
        self.pieces.last().map_or(self.start, Piece::end)
    }

    pub fn range(&self) -> TextRange {
        TextRange {
            start: self.start,
            end: self.end(),
        }
    }

    fn push_char(&mut self, ch: char, offset: usize, marker: Option<&MarkerTag>) {
        match self.pieces.last_mut() {
            Some(last) if last.end() == offset && last.marker.as_ref() == marker => {
                last.text.push(ch);
                last.len += 1;
            }
            _ => self.pieces.push(Piece {
                text: ch.to_string(),
                start: offset,
                len: 1,
                marker: marker.cloned(),
            }),
        }
    }
}

/// Header plus wrapped rows for one page. Line breaks end a row and are
/// not drawn; every other character occupies one column.
pub fn layout_page(layer: &TextLayer, width: usize) -> Vec<Row> {
    let width = width.max(1);
    let page = layer.page();
    let mut rows = vec![Row::new(page, RowKind::PageHeader, 0)];
    let mut current = Row::new(page, RowKind::Text, 0);
    let mut column = 0;

    for segment in layer.segments() {
        let mut offset = segment.range.start;
        for ch in segment.text.chars() {
            if ch == '\n' {
                let next = Row::new(page, RowKind::Text, offset + 1);
                rows.push(std::mem::replace(&mut current, next));
                column = 0;
            } else {
                if column == width {
                    let next = Row::new(page, RowKind::Text, offset);
                    rows.push(std::mem::replace(&mut current, next));
                    column = 0;
                }
                current.push_char(ch, offset, segment.marker.as_ref());
                column += 1;
            }
            offset += 1;
        }
    }
    if !current.pieces.is_empty() {
        rows.push(current);
    }
    rows
}

/// Rows standing in for a page that has not been loaded.
pub fn pending_rows(page: PageNumber) -> Vec<Row> {
    vec![
        Row::new(page, RowKind::PageHeader, 0),
        Row::new(page, RowKind::Pending, 0),
    ]
}

/// Offset of the start of the next word after `offset`.
pub fn word_forward(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = offset.min(chars.len());
    while idx < chars.len() && !chars[idx].is_whitespace() {
        idx += 1;
    }
    while idx < chars.len() && chars[idx].is_whitespace() {
        idx += 1;
    }
    idx
}

/// Offset of the start of the word before `offset`.
pub fn word_backward(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = offset.min(chars.len());
    while idx > 0 && chars[idx - 1].is_whitespace() {
        idx -= 1;
    }
    while idx > 0 && !chars[idx - 1].is_whitespace() {
        idx -= 1;
    }
    idx
}

/// A window of `height` rows over the laid-out pages.
#[derive(Debug, Clone, Default)]
pub struct ScrollView {
    rows: Vec<Row>,
    top: usize,
    height: usize,
}

impl ScrollView {
    pub fn new(height: usize) -> Self {
        Self {
            rows: Vec::new(),
            top: 0,
            height: height.max(1),
        }
    }

    /// Replaces the content, keeping the first visible page row anchored.
    pub fn set_rows(&mut self, rows: Vec<Row>) {
        let anchor = self.rows.get(self.top).map(|row| (row.page, row.kind, row.start));
        self.rows = rows;
        if let Some((page, kind, start)) = anchor {
            let found = self
                .rows
                .iter()
                .position(|row| row.page == page && row.kind == kind && row.end() >= start);
            if let Some(idx) = found {
                self.top = idx;
            }
        }
        self.top = self.top.min(self.max_top());
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height.max(1);
        self.top = self.top.min(self.max_top());
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn visible_rows(&self) -> &[Row] {
        let end = (self.top + self.height).min(self.rows.len());
        &self.rows[self.top.min(end)..end]
    }

    fn max_top(&self) -> usize {
        self.rows.len().saturating_sub(self.height)
    }

    /// Returns whether the view moved.
    pub fn scroll_by(&mut self, delta: isize) -> bool {
        let next = if delta.is_negative() {
            self.top.saturating_sub(delta.unsigned_abs())
        } else {
            self.top.saturating_add(delta.unsigned_abs()).min(self.max_top())
        };
        let moved = next != self.top;
        self.top = next;
        moved
    }

    /// Puts the header of `page` at the top of the view.
    pub fn scroll_to_page(&mut self, page: PageNumber) -> bool {
        let Some(idx) = self
            .rows
            .iter()
            .position(|row| row.page == page && row.kind == RowKind::PageHeader)
        else {
            return false;
        };
        let next = idx.min(self.max_top());
        let moved = next != self.top;
        self.top = next;
        moved
    }

    /// Scrolls the minimum needed to show row `idx`.
    pub fn ensure_visible(&mut self, idx: usize) -> bool {
        let next = if idx < self.top {
            idx
        } else if idx >= self.top + self.height {
            idx + 1 - self.height
        } else {
            return false;
        };
        self.top = next.min(self.max_top());
        true
    }

    /// Whether the view has scrolled as far down as the content allows.
    pub fn at_end(&self) -> bool {
        self.top > 0 && self.top >= self.max_top()
    }

    /// Fraction of each page's rows inside the view, for every page that
    /// shows at least one row.
    ///
    /// Short pages can all be fully on screen at once. Once the view is
    /// pinned at the end only the last page is reported, otherwise it could
    /// never become the most visible one.
    pub fn visibility(&self) -> Vec<VisibilityEntry> {
        if self.at_end() {
            return self
                .visible_rows()
                .last()
                .map(|row| vec![VisibilityEntry::visible(row.page, 1.0)])
                .unwrap_or_default();
        }
        let mut entries: Vec<(PageNumber, usize, usize)> = Vec::new();
        let bottom = self.top + self.height;
        for (idx, row) in self.rows.iter().enumerate() {
            let shown = usize::from(idx >= self.top && idx < bottom);
            match entries.last_mut() {
                Some((page, total, visible)) if *page == row.page => {
                    *total += 1;
                    *visible += shown;
                }
                _ => entries.push((row.page, 1, shown)),
            }
        }
        entries
            .into_iter()
            .filter(|(_, _, visible)| *visible > 0)
            .map(|(page, total, visible)| VisibilityEntry::visible(page, visible as f32 / total as f32))
            .collect()
    }

    /// Index of the text row of `page` holding `offset`.
    pub fn row_of(&self, page: PageNumber, offset: usize) -> Option<usize> {
        let mut candidate = None;
        for (idx, row) in self.rows.iter().enumerate() {
            if row.page != page || row.kind != RowKind::Text {
                continue;
            }
            if row.start <= offset {
                candidate = Some(idx);
            } else {
                break;
            }
        }
        candidate
    }

    /// First text row visible in the view.
    pub fn first_visible_text(&self) -> Option<&Row> {
        self.visible_rows()
            .iter()
            .find(|row| row.kind == RowKind::Text && !row.pieces.is_empty())
    }

    /// Moves `offset` by `delta` rows within its page, keeping the column.
    pub fn vertical_move(&self, page: PageNumber, offset: usize, delta: isize) -> usize {
        let Some(idx) = self.row_of(page, offset) else {
            return offset;
        };
        let column = offset - self.rows[idx].start;
        let target = idx.saturating_add_signed(delta).min(self.rows.len().saturating_sub(1));
        let step: isize = if delta.is_negative() { 1 } else { -1 };
        let mut probe = target;
        // Walk back towards the original row until a text row of this page.
        loop {
            let row = &self.rows[probe];
            if row.page == page && row.kind == RowKind::Text {
                return (row.start + column).min(row.end().saturating_sub(1).max(row.start));
            }
            if probe == idx {
                return offset;
            }
            probe = probe.saturating_add_signed(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexreader_core::{render_highlights, HighlightColor, HighlightSpec, NoteId};

    fn layer() -> TextLayer {
        TextLayer::from_spans(2, &["Plaintiff alleges\n", "breach of the lease."])
    }

    #[test]
    fn rows_follow_breaks_and_wrap_width() {
        let rows = layout_page(&layer(), 10);
        let text: Vec<(RowKind, String, usize)> = rows
            .iter()
            .map(|row| {
                let text: String = row.pieces.iter().map(|p| p.text.as_str()).collect();
                (row.kind, text, row.start)
            })
            .collect();
        assert_eq!(
            text,
            vec![
                (RowKind::PageHeader, String::new(), 0),
                (RowKind::Text, "Plaintiff ".into(), 0),
                (RowKind::Text, "alleges".into(), 10),
                (RowKind::Text, "breach of ".into(), 18),
                (RowKind::Text, "the lease.".into(), 28),
            ]
        );
    }

    #[test]
    fn marker_boundaries_split_pieces_with_page_offsets() {
        let mut layer = layer();
        render_highlights(
            &mut layer,
            &[HighlightSpec {
                range: TextRange { start: 10, end: 24 },
                color: HighlightColor::Green,
                note_id: NoteId::from("n1"),
            }],
        );
        let rows = layout_page(&layer, 80);
        let first = &rows[1].pieces;
        assert_eq!(first.len(), 2);
        assert_eq!((first[1].start, first[1].text.as_str()), (10, "alleges"));
        assert!(first[1].marker.is_some());

        let second = &rows[2].pieces;
        assert_eq!(second[0].text, "breach");
        assert_eq!(second[0].start, 18);
        assert!(second[0].marker.is_some());
        assert!(second[1].marker.is_none());
    }

    #[test]
    fn visibility_reports_fraction_per_page() {
        let mut rows = layout_page(&layer(), 80);
        rows.extend(pending_rows(3));
        rows.extend(pending_rows(4));
        let mut view = ScrollView::new(3);
        view.set_rows(rows);
        assert!(view.scroll_by(2));

        let entries = view.visibility();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].page, 2);
        assert!((entries[0].ratio - 1.0 / 3.0).abs() < f32::EPSILON);
        assert_eq!(entries[1].page, 3);
        assert!((entries[1].ratio - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn pinned_view_reports_only_the_last_page() {
        let mut rows = layout_page(&layer(), 80);
        rows.extend(pending_rows(3));
        rows.extend(pending_rows(4));
        let mut view = ScrollView::new(3);
        view.set_rows(rows);
        assert!(!view.at_end());
        assert!(view.scroll_by(50));
        assert!(view.at_end());

        let entries = view.visibility();
        assert_eq!(entries, vec![VisibilityEntry::visible(4, 1.0)]);
    }

    #[test]
    fn scrolling_is_bounded() {
        let mut view = ScrollView::new(2);
        view.set_rows(layout_page(&layer(), 80));
        assert!(!view.scroll_by(-5));
        assert!(view.scroll_by(10));
        assert_eq!(view.top(), 1);
        assert!(view.scroll_to_page(2));
        assert_eq!(view.top(), 0);
        assert!(!view.scroll_to_page(9));
    }

    #[test]
    fn vertical_moves_keep_column() {
        let mut view = ScrollView::new(10);
        view.set_rows(layout_page(&layer(), 10));
        assert_eq!(view.row_of(2, 12), Some(2));
        assert_eq!(view.vertical_move(2, 12, 1), 20);
        assert_eq!(view.vertical_move(2, 20, -1), 12);
        assert_eq!(view.vertical_move(2, 3, -1), 3);
    }

    #[test]
    fn word_motions_skip_whitespace() {
        let text = "Plaintiff alleges  breach";
        assert_eq!(word_forward(text, 0), 10);
        assert_eq!(word_forward(text, 10), 19);
        assert_eq!(word_forward(text, 19), 25);
        assert_eq!(word_backward(text, 19), 10);
        assert_eq!(word_backward(text, 12), 10);
        assert_eq!(word_backward(text, 0), 0);
    }
}
