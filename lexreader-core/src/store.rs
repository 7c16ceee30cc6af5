//! In-memory note cache for the open document.
//!
//! The store is the only owner of the note list. Mutations go through the
//! notes service first and touch local state only after it confirms.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::ReaderError;
use crate::highlight::HighlightSpec;
use crate::note::{HighlightColor, NewNote, Note, NoteId};
use crate::offsets::SelectionRect;
use crate::services::NotesService;
use crate::text_layer::{PageNumber, TextRange};
use crate::DocumentId;

/// A captured selection waiting for its note (`highlightMeta`).
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightMeta {
    pub draft_id: NoteId,
    pub page: PageNumber,
    pub text: String,
    pub range: TextRange,
    pub rects: Vec<SelectionRect>,
}

/// Sidebar group: notes of one page, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGroup<'a> {
    pub page: Option<PageNumber>,
    pub notes: Vec<&'a Note>,
}

pub struct AnnotationStore {
    service: Arc<dyn NotesService>,
    document: DocumentId,
    notes: Vec<Note>,
}

impl AnnotationStore {
    pub fn new(service: Arc<dyn NotesService>, document: DocumentId) -> Self {
        Self {
            service,
            document,
            notes: Vec::new(),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    pub fn notes_for_page(&self, page: PageNumber) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |note| note.is_on_page(page))
    }

    pub fn highlight_specs(&self, page: PageNumber) -> Vec<HighlightSpec> {
        self.notes_for_page(page).map(HighlightSpec::from).collect()
    }

    /// Replaces the cache with the service's notes for `document`.
    #[instrument(skip(self))]
    pub async fn load(&mut self, document: DocumentId) -> Result<&[Note], ReaderError> {
        let notes = self
            .service
            .fetch_notes(document)
            .await
            .map_err(ReaderError::service("fetch notes"))?;
        debug!(count = notes.len(), "loaded notes");
        self.document = document;
        self.notes = notes;
        Ok(&self.notes)
    }

    /// Rejects `range` when it intersects any note on the same page.
    pub fn check_overlap(&self, page: PageNumber, range: TextRange) -> Result<(), ReaderError> {
        let range = TextRange::normalized(range.start, range.end);
        if self
            .notes_for_page(page)
            .any(|note| note.range().overlaps(&range))
        {
            return Err(ReaderError::OverlappingHighlight { page, range });
        }
        Ok(())
    }

    /// Persists a note for `draft`. Empty `content` falls back to the
    /// highlighted text.
    #[instrument(skip(self, draft, content), fields(page = draft.page, range = %draft.range))]
    pub async fn create(
        &mut self,
        draft: &HighlightMeta,
        content: &str,
        color: HighlightColor,
    ) -> Result<Note, ReaderError> {
        self.check_overlap(draft.page, draft.range)?;
        let content = match content.trim() {
            "" => draft.text.trim(),
            trimmed => trimmed,
        };
        if content.is_empty() {
            return Err(ReaderError::EmptyHighlight);
        }

        let request = NewNote {
            document_id: self.document,
            page_number: draft.page,
            start_offset: draft.range.start,
            end_offset: draft.range.end,
            text: draft.text.clone(),
            content: content.to_owned(),
            color,
        };
        let note = self
            .service
            .create_note(request)
            .await
            .map_err(ReaderError::service("create note"))?;
        self.notes.push(note.clone());
        Ok(note)
    }

    #[instrument(skip(self, content))]
    pub async fn update(&mut self, id: &NoteId, content: &str) -> Result<Note, ReaderError> {
        if self.get(id).is_none() {
            return Err(ReaderError::UnknownNote(id.clone()));
        }
        let updated = self
            .service
            .update_note(id, content)
            .await
            .map_err(ReaderError::service("update note"))?;
        if let Some(slot) = self.notes.iter_mut().find(|note| &note.id == id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn remove(&mut self, id: &NoteId) -> Result<Note, ReaderError> {
        if self.get(id).is_none() {
            return Err(ReaderError::UnknownNote(id.clone()));
        }
        self.service
            .delete_note(id)
            .await
            .map_err(ReaderError::service("delete note"))?;
        let idx = self
            .notes
            .iter()
            .position(|note| &note.id == id)
            .ok_or_else(|| ReaderError::UnknownNote(id.clone()))?;
        Ok(self.notes.remove(idx))
    }

    /// Notes grouped by page ascending, pageless notes last, each group
    /// newest first.
    pub fn grouped(&self) -> Vec<PageGroup<'_>> {
        let mut sorted: Vec<&Note> = self.notes.iter().collect();
        sorted.sort_by(|a, b| {
            let page_key = |note: &Note| (note.page_number.is_none(), note.page_number);
            page_key(a)
                .cmp(&page_key(b))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let mut groups: Vec<PageGroup<'_>> = Vec::new();
        for note in sorted {
            match groups.last_mut() {
                Some(group) if group.page == note.page_number => group.notes.push(note),
                _ => groups.push(PageGroup {
                    page: note.page_number,
                    notes: vec![note],
                }),
            }
        }
        groups
    }
}
