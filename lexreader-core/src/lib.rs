pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod highlight;
pub mod note;
pub mod offsets;
pub mod services;
pub mod store;
pub mod text_layer;
pub mod viewport;
pub mod window;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use config::ReaderConfig;
pub use controller::{DisplayState, Liveness, ReaderController, ReaderPhase, ReaderProps, SidebarState};
pub use error::ReaderError;
pub use gate::{AccessGate, GateState};
pub use highlight::{render_highlights, strip_markers, HighlightSpec, RenderReport};
pub use note::{HighlightColor, NewNote, Note, NoteId};
pub use offsets::{map_selection, offset_of, Selection, SelectionRect};
pub use services::{
    AccessService, DocumentAccess, FileNotesService, MemoryNotesService, NotesService, PdfSource,
};
pub use store::{AnnotationStore, HighlightMeta, PageGroup};
pub use text_layer::{
    DomPosition, Element, ElementKind, MarkerTag, Node, NodePath, PageNumber,
    Segment, TextLayer, TextRange,
};
pub use viewport::{ViewportTracker, VisibilityEntry};
pub use window::{allowed_max_page, PageWindow, WindowParams};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"lexreader:document"));

/// Stable id for a local file, derived from its canonical path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: PageNumber,
    pub metadata: DocumentMetadata,
}

/// An opened PDF that can produce per-page text layers.
pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn text_layer(&self, page: PageNumber) -> Result<TextLayer>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: u32 },
    PrevPage { count: u32 },
    GotoPage { page: PageNumber },
    ScaleBy { factor: f32 },
    ResetScale,
    ToggleDarkMode,
    ToggleSidebar,
    CancelNote,
}

/// Notifications a host drains after each input to decide what to repaint.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    ContentUnavailable,
    DocumentReady {
        total_pages: PageNumber,
        allowed_max_page: PageNumber,
    },
    CurrentPageChanged(PageNumber),
    RenderLimitChanged(PageNumber),
    ScrollToPage(PageNumber),
    PreviewLimitReached(PageNumber),
    HighlightsApplied {
        page: PageNumber,
        count: usize,
    },
    NotesChanged,
    NoteDialogOpened(NoteId),
    NoteDialogClosed,
    NoteFocused {
        note: NoteId,
        page: Option<PageNumber>,
    },
    FlashCleared(NoteId),
    DisplayChanged,
    Error(String),
}
