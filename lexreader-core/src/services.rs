//! Interfaces to the collaborators the reader depends on, plus in-process
//! notes backends.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::note::{NewNote, Note, NoteId};
use crate::text_layer::PageNumber;
use crate::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAccess {
    pub has_full_access: bool,
    pub preview_max_pages: Option<PageNumber>,
}

impl DocumentAccess {
    pub fn full() -> Self {
        Self {
            has_full_access: true,
            preview_max_pages: None,
        }
    }

    pub fn preview(pages: PageNumber) -> Self {
        Self {
            has_full_access: false,
            preview_max_pages: Some(pages),
        }
    }

    /// Page ceiling implied by this grant, if any.
    pub fn ceiling(&self) -> Option<PageNumber> {
        if self.has_full_access {
            None
        } else {
            self.preview_max_pages
        }
    }
}

/// Opaque byte source handed to the PDF rendering library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfSource {
    pub url: String,
    pub auth_header: Option<String>,
}

#[async_trait]
pub trait AccessService: Send + Sync {
    async fn fetch_document_access(&self, document: DocumentId) -> Result<DocumentAccess>;
    async fn check_availability(&self, document: DocumentId) -> Result<bool>;
    async fn resolve_pdf_source(&self, document: DocumentId) -> Result<PdfSource>;
}

#[async_trait]
pub trait NotesService: Send + Sync {
    async fn fetch_notes(&self, document: DocumentId) -> Result<Vec<Note>>;
    async fn create_note(&self, note: NewNote) -> Result<Note>;
    async fn update_note(&self, id: &NoteId, content: &str) -> Result<Note>;
    async fn delete_note(&self, id: &NoteId) -> Result<()>;
}

fn materialize(note: NewNote) -> Note {
    Note {
        id: NoteId::from(Uuid::new_v4().to_string()),
        document_id: note.document_id,
        page_number: Some(note.page_number),
        highlighted_text: note.text,
        char_offset_start: note.start_offset,
        char_offset_end: note.end_offset,
        content: note.content,
        highlight_color: note.color,
        created_at: Utc::now(),
    }
}

/// Notes kept in process memory.
pub struct MemoryNotesService {
    inner: Mutex<HashMap<DocumentId, Vec<Note>>>,
}

impl MemoryNotesService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryNotesService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotesService for MemoryNotesService {
    async fn fetch_notes(&self, document: DocumentId) -> Result<Vec<Note>> {
        Ok(self.inner.lock().get(&document).cloned().unwrap_or_default())
    }

    async fn create_note(&self, note: NewNote) -> Result<Note> {
        let note = materialize(note);
        self.inner
            .lock()
            .entry(note.document_id)
            .or_default()
            .push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &NoteId, content: &str) -> Result<Note> {
        let mut inner = self.inner.lock();
        let note = inner
            .values_mut()
            .flat_map(|notes| notes.iter_mut())
            .find(|note| &note.id == id)
            .ok_or_else(|| anyhow!("note {id} not found"))?;
        note.content = content.to_owned();
        Ok(note.clone())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let mut inner = self.inner.lock();
        for notes in inner.values_mut() {
            if let Some(idx) = notes.iter().position(|note| &note.id == id) {
                notes.remove(idx);
                return Ok(());
            }
        }
        Err(anyhow!("note {id} not found"))
    }
}

/// Notes persisted as one JSON file per document under `root`.
pub struct FileNotesService {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileNotesService {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create notes directory at {:?}", root))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn notes_path(&self, document: DocumentId) -> PathBuf {
        self.root.join(format!("{document}.notes.json"))
    }

    fn read(&self, document: DocumentId) -> Result<Vec<Note>> {
        let path = self.notes_path(document);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open notes file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        serde_json::from_str(&buf).with_context(|| format!("failed to decode notes file {:?}", path))
    }

    fn write(&self, document: DocumentId, notes: &[Note]) -> Result<()> {
        let path = self.notes_path(document);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(notes)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp notes file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn documents(&self) -> Result<Vec<DocumentId>> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".notes.json")) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(stem) {
                documents.push(id);
            }
        }
        Ok(documents)
    }

    /// Applies `edit` to the file holding `id` and writes it back.
    fn modify<R>(&self, id: &NoteId, edit: impl FnOnce(&mut Vec<Note>, usize) -> R) -> Result<R> {
        let _guard = self.write_lock.lock();
        for document in self.documents()? {
            let mut notes = self.read(document)?;
            if let Some(idx) = notes.iter().position(|note| &note.id == id) {
                let result = edit(&mut notes, idx);
                self.write(document, &notes)?;
                return Ok(result);
            }
        }
        Err(anyhow!("note {id} not found"))
    }
}

#[async_trait]
impl NotesService for FileNotesService {
    async fn fetch_notes(&self, document: DocumentId) -> Result<Vec<Note>> {
        self.read(document)
    }

    async fn create_note(&self, note: NewNote) -> Result<Note> {
        let _guard = self.write_lock.lock();
        let note = materialize(note);
        let mut notes = self.read(note.document_id)?;
        notes.push(note.clone());
        self.write(note.document_id, &notes)?;
        Ok(note)
    }

    async fn update_note(&self, id: &NoteId, content: &str) -> Result<Note> {
        self.modify(id, |notes, idx| {
            notes[idx].content = content.to_owned();
            notes[idx].clone()
        })
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.modify(id, |notes, idx| {
            notes.remove(idx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::HighlightColor;
    use tempfile::tempdir;

    fn new_note(document: DocumentId, page: PageNumber) -> NewNote {
        NewNote {
            document_id: document,
            page_number: page,
            start_offset: 120,
            end_offset: 144,
            text: "Plaintiff alleges breach".into(),
            content: "see count II".into(),
            color: HighlightColor::Blue,
        }
    }

    #[test]
    fn access_ceiling_ignores_preview_when_full() {
        assert_eq!(DocumentAccess::preview(10).ceiling(), Some(10));
        assert_eq!(DocumentAccess::full().ceiling(), None);
        let odd = DocumentAccess {
            has_full_access: true,
            preview_max_pages: Some(3),
        };
        assert_eq!(odd.ceiling(), None);
    }

    #[tokio::test]
    async fn memory_service_round_trips_crud() {
        let service = MemoryNotesService::new();
        let doc = Uuid::new_v4();
        let created = service.create_note(new_note(doc, 5)).await.unwrap();
        assert!(!created.id.is_draft());
        assert_eq!(created.page_number, Some(5));

        let updated = service.update_note(&created.id, "revised").await.unwrap();
        assert_eq!(updated.content, "revised");
        assert_eq!(service.fetch_notes(doc).await.unwrap()[0].content, "revised");

        service.delete_note(&created.id).await.unwrap();
        assert!(service.fetch_notes(doc).await.unwrap().is_empty());
        assert!(service.delete_note(&created.id).await.is_err());
    }

    #[tokio::test]
    async fn file_service_persists_across_instances() {
        let dir = tempdir().unwrap();
        let doc = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = FileNotesService::new(dir.path().join("notes")).unwrap();
        let kept = first.create_note(new_note(doc, 5)).await.unwrap();
        let dropped = first.create_note(new_note(doc, 6)).await.unwrap();
        first.create_note(new_note(other, 1)).await.unwrap();
        first.update_note(&kept.id, "annotated").await.unwrap();
        first.delete_note(&dropped.id).await.unwrap();

        let second = FileNotesService::new(dir.path().join("notes")).unwrap();
        let notes = second.fetch_notes(doc).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, kept.id);
        assert_eq!(notes[0].content, "annotated");
        assert_eq!(second.fetch_notes(other).await.unwrap().len(), 1);
        assert!(second.update_note(&dropped.id, "x").await.is_err());
    }
}
