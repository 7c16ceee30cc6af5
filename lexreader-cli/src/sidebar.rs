use lexreader_core::{AnnotationStore, HighlightColor, NoteId, PageNumber};
use lexreader_tty::PanelLine;

#[derive(Debug, Clone, PartialEq)]
pub struct SidebarEntry {
    pub note_id: NoteId,
    pub page: Option<PageNumber>,
    pub color: HighlightColor,
    pub label: String,
}

/// Notes list shown next to the text, grouped by page.
#[derive(Debug, Default)]
pub struct SidebarWindow {
    entries: Vec<SidebarEntry>,
    selected: usize,
    scroll_offset: usize,
}

impl SidebarWindow {
    /// Rebuilds the entries, keeping the selection on the same note.
    pub fn refresh(&mut self, store: &AnnotationStore) {
        let keep = self.selected_entry().map(|entry| entry.note_id.clone());
        self.entries = store
            .grouped()
            .into_iter()
            .flat_map(|group| group.notes)
            .map(|note| SidebarEntry {
                note_id: note.id.clone(),
                page: note.page_number,
                color: note.highlight_color,
                label: format_label(note.page_number, &note.highlighted_text, &note.content),
            })
            .collect();
        match keep {
            Some(id) if self.select_note(&id) => {}
            _ => self.selected = self.selected.min(self.entries.len().saturating_sub(1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected_entry(&self) -> Option<&SidebarEntry> {
        self.entries.get(self.selected)
    }

    pub fn selected(&self) -> Option<usize> {
        (!self.entries.is_empty()).then_some(self.selected)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let len = self.entries.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    pub fn select_note(&mut self, id: &NoteId) -> bool {
        match self.entries.iter().position(|entry| &entry.note_id == id) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }

    pub fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(viewport_height);
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
            return;
        }
        let bottom = self.scroll_offset + viewport_height;
        if self.selected >= bottom {
            self.scroll_offset = self.selected + 1 - viewport_height;
        }
    }

    pub fn panel_lines(&self, flashing: Option<&NoteId>) -> Vec<PanelLine> {
        if self.entries.is_empty() {
            return vec![PanelLine {
                text: "No notes yet. Select text with v.".into(),
                color: None,
                flashing: false,
            }];
        }
        self.entries
            .iter()
            .map(|entry| PanelLine {
                text: entry.label.clone(),
                color: Some(entry.color),
                flashing: flashing == Some(&entry.note_id),
            })
            .collect()
    }
}

fn format_label(page: Option<PageNumber>, highlighted: &str, content: &str) -> String {
    let page = page.map_or_else(|| "p-".to_owned(), |page| format!("p{page}"));
    let quote: String = highlighted.split_whitespace().collect::<Vec<_>>().join(" ");
    if content.trim() == quote {
        format!("{page} \"{quote}\"")
    } else {
        format!("{page} \"{quote}\": {}", content.trim())
    }
}
