//! Reader view orchestration.
//!
//! `ReaderController` owns every piece of per-view state: the note cache,
//! the render window, the viewport tracker, the preview gate and the
//! registry of mounted text layers. Hosts feed it input events and drain
//! `ReaderEvent`s to learn what to repaint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, instrument, trace, warn};

use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::gate::{AccessGate, GateState};
use crate::highlight::{bind_click_listener, dispatch_click, render_highlights, RenderReport};
use crate::note::{HighlightColor, Note, NoteId};
use crate::offsets::{map_selection, Selection, SelectionRect};
use crate::services::{AccessService, NotesService, PdfSource};
use crate::store::{AnnotationStore, HighlightMeta};
use crate::text_layer::{NodePath, PageNumber, TextLayer};
use crate::viewport::{ViewportTracker, VisibilityEntry};
use crate::window::{allowed_max_page, PageWindow, WindowParams};
use crate::{Command, DocumentId, ReaderEvent};

const MIN_ZOOM: f32 = 0.25;
const MAX_ZOOM: f32 = 4.0;

pub type LimitCallback = Box<dyn FnMut(PageNumber) + Send>;

/// Inputs a host supplies when it mounts a reader view.
pub struct ReaderProps {
    pub document_id: DocumentId,
    pub start_page: PageNumber,
    pub max_allowed_page: Option<PageNumber>,
    pub on_preview_limit_reached: Option<LimitCallback>,
}

impl ReaderProps {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            start_page: 1,
            max_allowed_page: None,
            on_preview_limit_reached: None,
        }
    }

    pub fn with_start_page(mut self, page: PageNumber) -> Self {
        self.start_page = page;
        self
    }

    pub fn with_max_allowed_page(mut self, page: Option<PageNumber>) -> Self {
        self.max_allowed_page = page;
        self
    }

    pub fn on_preview_limit_reached(mut self, callback: impl FnMut(PageNumber) + Send + 'static) -> Self {
        self.on_preview_limit_reached = Some(Box::new(callback));
        self
    }
}

/// Shared mount flag. Cleared once the view goes away; async continuations
/// check it before touching state.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPhase {
    Loading,
    Unavailable,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayState {
    pub current_page: PageNumber,
    pub total_pages: Option<PageNumber>,
    pub zoom: f32,
    pub dark_mode: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: None,
            zoom: 1.0,
            dark_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidebarState {
    pub open: bool,
    pub active_note: Option<NoteId>,
    flash: Option<(NoteId, Instant)>,
}

impl SidebarState {
    pub fn is_flashing(&self, id: &NoteId, now: Instant) -> bool {
        matches!(&self.flash, Some((flashing, until)) if flashing == id && now < *until)
    }
}

pub struct ReaderController {
    document_id: DocumentId,
    start_page: PageNumber,
    max_allowed_page: Option<PageNumber>,
    on_limit: Option<LimitCallback>,
    config: ReaderConfig,
    access: Arc<dyn AccessService>,
    store: AnnotationStore,
    liveness: Liveness,
    phase: ReaderPhase,
    ceiling: Option<PageNumber>,
    window: Option<PageWindow>,
    gate: AccessGate,
    tracker: ViewportTracker,
    pages: BTreeMap<PageNumber, TextLayer>,
    display: DisplayState,
    sidebar: SidebarState,
    pending: Option<HighlightMeta>,
    events: Arc<Mutex<Vec<ReaderEvent>>>,
}

impl ReaderController {
    pub fn mount(
        props: ReaderProps,
        config: ReaderConfig,
        access: Arc<dyn AccessService>,
        notes: Arc<dyn NotesService>,
    ) -> Self {
        let tracker = ViewportTracker::new(config.page_debounce(), config.scroll_idle());
        let start_page = props.start_page.max(1);
        Self {
            document_id: props.document_id,
            start_page,
            max_allowed_page: props.max_allowed_page,
            on_limit: props.on_preview_limit_reached,
            config,
            access,
            store: AnnotationStore::new(notes, props.document_id),
            liveness: Liveness::new(),
            phase: ReaderPhase::Loading,
            ceiling: None,
            window: None,
            gate: AccessGate::unrestricted(),
            tracker,
            pages: BTreeMap::new(),
            display: DisplayState {
                current_page: start_page,
                ..DisplayState::default()
            },
            sidebar: SidebarState::default(),
            pending: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn drain_events(&self) -> Vec<ReaderEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Checks availability, resolves the access ceiling and loads notes.
    /// A failed note load is reported but does not block reading.
    #[instrument(skip(self), fields(document = %self.document_id))]
    pub async fn open(&mut self) -> Result<ReaderPhase, ReaderError> {
        let available = self
            .access
            .check_availability(self.document_id)
            .await
            .map_err(ReaderError::service("check availability"))?;
        self.ensure_alive()?;
        if !available {
            warn!("document content unavailable");
            self.phase = ReaderPhase::Unavailable;
            self.emit(ReaderEvent::ContentUnavailable);
            return Ok(self.phase);
        }

        let access = self
            .access
            .fetch_document_access(self.document_id)
            .await
            .map_err(ReaderError::service("fetch document access"))?;
        self.ensure_alive()?;
        self.ceiling = match (access.ceiling(), self.max_allowed_page) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        debug!(ceiling = ?self.ceiling, "resolved access ceiling");

        let loaded = self.store.load(self.document_id).await.map(|notes| notes.len());
        self.ensure_alive()?;
        match loaded {
            Ok(count) => {
                debug!(count, "notes ready");
                self.emit(ReaderEvent::NotesChanged);
            }
            Err(err) => self.report(&err),
        }
        Ok(self.phase)
    }

    pub async fn resolve_source(&self) -> Result<PdfSource, ReaderError> {
        if self.phase == ReaderPhase::Unavailable {
            return Err(ReaderError::ContentUnavailable);
        }
        let source = self
            .access
            .resolve_pdf_source(self.document_id)
            .await
            .map_err(ReaderError::service("resolve pdf source"))?;
        self.ensure_alive()?;
        Ok(source)
    }

    /// Called once the PDF library reports its page count. Later reports
    /// for the same view are ignored so the window never shrinks.
    #[instrument(skip(self))]
    pub fn on_document_loaded(&mut self, total_pages: PageNumber) -> Result<(), ReaderError> {
        self.ensure_alive()?;
        match self.phase {
            ReaderPhase::Unavailable => return Err(ReaderError::ContentUnavailable),
            ReaderPhase::Ready => {
                debug!(total_pages, "document already loaded");
                return Ok(());
            }
            ReaderPhase::Loading => {}
        }
        let total = total_pages.max(1);
        let allowed = allowed_max_page(self.ceiling, total);
        let start = self.start_page.clamp(1, allowed);
        let window = PageWindow::open(WindowParams::from(&self.config), allowed, start);
        let render_limit = window.render_limit();
        self.window = Some(window);
        self.gate = AccessGate::new(self.ceiling.filter(|ceiling| *ceiling < total).map(|_| allowed));
        self.display.total_pages = Some(total);
        self.display.current_page = start;
        self.phase = ReaderPhase::Ready;

        self.emit(ReaderEvent::DocumentReady {
            total_pages: total,
            allowed_max_page: allowed,
        });
        self.emit(ReaderEvent::RenderLimitChanged(render_limit));
        if start > 1 {
            self.tracker.begin_programmatic(start);
            self.emit(ReaderEvent::ScrollToPage(start));
        }
        self.emit(ReaderEvent::CurrentPageChanged(start));
        if self.gate.observe(start) {
            self.fire_limit(start);
        }
        Ok(())
    }

    pub fn phase(&self) -> ReaderPhase {
        self.phase
    }

    pub fn display(&self) -> DisplayState {
        self.display
    }

    pub fn sidebar(&self) -> &SidebarState {
        &self.sidebar
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn notes(&self) -> &[Note] {
        self.store.notes()
    }

    pub fn render_limit(&self) -> Option<PageNumber> {
        self.window.as_ref().map(PageWindow::render_limit)
    }

    pub fn allowed_max_page(&self) -> Option<PageNumber> {
        self.window.as_ref().map(PageWindow::allowed_max_page)
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn is_programmatic_scroll(&self) -> bool {
        self.tracker.is_programmatic()
    }

    pub fn pending_highlight(&self) -> Option<&HighlightMeta> {
        self.pending.as_ref()
    }

    /// Selection rectangles drawn while the note dialog is open. Hosts
    /// without page geometry, like the terminal, paint the pending range
    /// from `pending_highlight` instead.
    pub fn provisional_rects(&self) -> &[SelectionRect] {
        self.pending.as_ref().map_or(&[], |meta| meta.rects.as_slice())
    }

    pub fn text_layer(&self, page: PageNumber) -> Option<&TextLayer> {
        self.pages.get(&page)
    }

    pub fn mounted_pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.pages.keys().copied()
    }

    /// Registers a freshly rendered text layer and paints its highlights.
    pub fn mount_text_layer(&mut self, layer: TextLayer) -> Result<RenderReport, ReaderError> {
        let page = layer.page();
        let allowed = self.allowed_max_page().ok_or(ReaderError::NotReady)?;
        if page == 0 || page > allowed {
            return Err(ReaderError::NavigationBlocked {
                target: page,
                allowed,
            });
        }
        let mut layer = layer;
        bind_click_listener(&mut layer);
        let report = render_highlights(&mut layer, &self.store.highlight_specs(page));
        if !report.skipped.is_empty() {
            debug!(page, skipped = report.skipped.len(), "highlights outside text layer");
        }
        self.pages.insert(page, layer);
        self.emit(ReaderEvent::HighlightsApplied {
            page,
            count: report.applied,
        });
        Ok(report)
    }

    pub fn unmount_text_layer(&mut self, page: PageNumber) -> Option<TextLayer> {
        self.pages.remove(&page)
    }

    /// Re-runs the renderer for a mounted page after a note mutation.
    pub fn reapply_highlights(&mut self, page: PageNumber) -> Option<RenderReport> {
        let specs = self.store.highlight_specs(page);
        let layer = self.pages.get_mut(&page)?;
        let report = render_highlights(layer, &specs);
        self.emit(ReaderEvent::HighlightsApplied {
            page,
            count: report.applied,
        });
        Some(report)
    }

    pub fn on_scroll(&mut self, now: Instant) {
        self.tracker.note_user_scroll(now);
    }

    pub fn on_visibility(&mut self, entries: &[VisibilityEntry], now: Instant) {
        self.tracker.observe(entries, now);
    }

    /// The host reports that a programmatic scroll has come to rest.
    pub fn scroll_settled(&mut self) {
        self.tracker.end_programmatic();
    }

    /// Advances deadline-driven state: the debounced current page and the
    /// note flash.
    pub fn tick(&mut self, now: Instant) {
        if !self.liveness.is_alive() {
            return;
        }
        if let Some(page) = self.tracker.poll(now) {
            self.set_current_page(page);
        }
        if let Some((id, until)) = &self.sidebar.flash {
            if now >= *until {
                let id = id.clone();
                self.sidebar.flash = None;
                self.emit(ReaderEvent::FlashCleared(id));
            }
        }
    }

    fn set_current_page(&mut self, page: PageNumber) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let page = page.clamp(1, window.allowed_max_page());
        let grew = window.on_page_change(page);
        let render_limit = window.render_limit();
        if page != self.display.current_page {
            debug!(from = self.display.current_page, to = page, "current page changed");
            self.display.current_page = page;
            self.emit(ReaderEvent::CurrentPageChanged(page));
        }
        if grew {
            self.emit(ReaderEvent::RenderLimitChanged(render_limit));
        }
        if self.gate.observe(page) {
            self.fire_limit(page);
        }
    }

    fn fire_limit(&mut self, page: PageNumber) {
        self.emit(ReaderEvent::PreviewLimitReached(page));
        if let Some(callback) = self.on_limit.as_mut() {
            callback(page);
        }
    }

    /// Explicit navigation. Targets past the preview limit are refused and
    /// fire the limit callback; everything else is clamped into range.
    #[instrument(skip(self))]
    pub fn jump_to_page(&mut self, target: PageNumber) -> Result<PageNumber, ReaderError> {
        self.ensure_alive()?;
        if self.phase != ReaderPhase::Ready {
            return Err(ReaderError::NotReady);
        }
        if let Err(err) = self.gate.check_navigation(target) {
            warn!(target, "navigation blocked by preview limit");
            self.fire_limit(target);
            return Err(err);
        }
        let window = self.window.as_mut().ok_or(ReaderError::NotReady)?;
        let page = target.clamp(1, window.allowed_max_page());
        if window.ensure_includes(page) {
            let render_limit = window.render_limit();
            self.emit(ReaderEvent::RenderLimitChanged(render_limit));
        }
        self.tracker.begin_programmatic(page);
        self.emit(ReaderEvent::ScrollToPage(page));
        self.set_current_page(page);
        Ok(page)
    }

    pub fn next_page(&mut self, count: u32) -> Result<PageNumber, ReaderError> {
        let target = self.display.current_page.saturating_add(count.max(1));
        self.jump_to_page(target)
    }

    pub fn prev_page(&mut self, count: u32) -> Result<PageNumber, ReaderError> {
        let target = self.display.current_page.saturating_sub(count.max(1)).max(1);
        self.jump_to_page(target)
    }

    /// Captures a finished selection. Returns `None` while the user is
    /// still scrolling or when the selection does not map to a usable range.
    pub fn on_selection(&mut self, selection: Selection, now: Instant) -> Option<HighlightMeta> {
        if self.phase != ReaderPhase::Ready || self.tracker.is_user_scrolling(now) {
            return None;
        }
        let layer = self.pages.get(&selection.page)?;
        let range = map_selection(layer, &selection, self.config.min_selection_chars)?;
        let text = layer.slice(range);
        if text.trim().is_empty() {
            return None;
        }
        let meta = HighlightMeta {
            draft_id: NoteId::draft(),
            page: selection.page,
            text,
            range,
            rects: selection.rects,
        };
        trace!(page = meta.page, range = %meta.range, "captured selection");
        self.pending = Some(meta.clone());
        self.emit(ReaderEvent::NoteDialogOpened(meta.draft_id.clone()));
        Some(meta)
    }

    pub fn cancel_note(&mut self) {
        if self.pending.take().is_some() {
            self.emit(ReaderEvent::NoteDialogClosed);
        }
    }

    /// Saves the pending highlight. On failure the dialog stays open.
    #[instrument(skip(self, content))]
    pub async fn confirm_note(&mut self, content: &str, color: HighlightColor) -> Result<Note, ReaderError> {
        let draft = self.pending.clone().ok_or(ReaderError::NoPendingHighlight)?;
        let created = self.store.create(&draft, content, color).await;
        self.ensure_alive()?;
        let note = match created {
            Ok(note) => note,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };
        self.pending = None;
        self.emit(ReaderEvent::NoteDialogClosed);

        let refreshed = self.store.load(self.document_id).await.map(|_| ());
        self.ensure_alive()?;
        if let Err(err) = refreshed {
            self.report(&err);
        }
        self.reapply_highlights(draft.page);
        self.emit(ReaderEvent::NotesChanged);
        Ok(note)
    }

    /// Replaces a note's text. Blank content falls back to its highlighted
    /// text.
    #[instrument(skip(self, content))]
    pub async fn update_note(&mut self, id: &NoteId, content: &str) -> Result<Note, ReaderError> {
        let fallback = self
            .store
            .get(id)
            .map(|note| note.highlighted_text.trim().to_owned())
            .ok_or_else(|| ReaderError::UnknownNote(id.clone()))?;
        let content = match content.trim() {
            "" => fallback.as_str(),
            trimmed => trimmed,
        };
        if content.is_empty() {
            return Err(ReaderError::EmptyHighlight);
        }
        let updated = self.store.update(id, content).await;
        self.ensure_alive()?;
        let note = updated.inspect_err(|err| self.report(err))?;
        if let Some(page) = note.page_number {
            self.reapply_highlights(page);
        }
        self.emit(ReaderEvent::NotesChanged);
        Ok(note)
    }

    #[instrument(skip(self))]
    pub async fn delete_note(&mut self, id: &NoteId) -> Result<Note, ReaderError> {
        let removed = self.store.remove(id).await;
        self.ensure_alive()?;
        let note = removed.inspect_err(|err| self.report(err))?;
        if self.sidebar.active_note.as_ref() == Some(id) {
            self.sidebar.active_note = None;
            self.sidebar.flash = None;
        }
        if let Some(page) = note.page_number {
            self.reapply_highlights(page);
        }
        self.emit(ReaderEvent::NotesChanged);
        Ok(note)
    }

    /// Routes a click inside a page's text layer. Clicking a marker focuses
    /// its note.
    pub fn click(&mut self, page: PageNumber, target: &NodePath, now: Instant) -> Option<NoteId> {
        let layer = self.pages.get(&page)?;
        let id = dispatch_click(layer, target, |id| trace!(page, note = %id, "marker clicked"))?;
        self.focus_note(&id, now).ok()?;
        Some(id)
    }

    /// Opens the sidebar on `id` and starts its flash.
    pub fn focus_note(&mut self, id: &NoteId, now: Instant) -> Result<(), ReaderError> {
        let page = self
            .store
            .get(id)
            .map(|note| note.page_number)
            .ok_or_else(|| ReaderError::UnknownNote(id.clone()))?;
        self.sidebar.open = true;
        self.sidebar.active_note = Some(id.clone());
        self.sidebar.flash = Some((id.clone(), now + self.config.flash_duration()));
        self.emit(ReaderEvent::NoteFocused {
            note: id.clone(),
            page,
        });
        Ok(())
    }

    /// Sidebar selection: focus the note and jump to its page.
    pub fn open_note(&mut self, id: &NoteId, now: Instant) -> Result<(), ReaderError> {
        self.focus_note(id, now)?;
        let page = self.store.get(id).and_then(|note| note.page_number);
        if let Some(page) = page {
            self.jump_to_page(page)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, command: Command) -> Result<(), ReaderError> {
        match command {
            Command::NextPage { count } => {
                self.next_page(count)?;
            }
            Command::PrevPage { count } => {
                self.prev_page(count)?;
            }
            Command::GotoPage { page } => {
                self.jump_to_page(page)?;
            }
            Command::ScaleBy { factor } => {
                let zoom = (self.display.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
                self.set_zoom(zoom);
            }
            Command::ResetScale => self.set_zoom(1.0),
            Command::ToggleDarkMode => {
                self.display.dark_mode = !self.display.dark_mode;
                self.emit(ReaderEvent::DisplayChanged);
            }
            Command::ToggleSidebar => {
                self.sidebar.open = !self.sidebar.open;
                self.emit(ReaderEvent::DisplayChanged);
            }
            Command::CancelNote => self.cancel_note(),
        }
        Ok(())
    }

    fn set_zoom(&mut self, zoom: f32) {
        if (self.display.zoom - zoom).abs() > f32::EPSILON {
            self.display.zoom = zoom;
            self.emit(ReaderEvent::DisplayChanged);
        }
    }

    /// Tears the view down. In-flight continuations observe the cleared
    /// liveness flag and drop their results.
    pub fn unmount(&mut self) {
        debug!(document = %self.document_id, "unmounting reader view");
        self.liveness.cancel();
        self.pages.clear();
        self.pending = None;
    }

    fn ensure_alive(&self) -> Result<(), ReaderError> {
        if self.liveness.is_alive() {
            Ok(())
        } else {
            Err(ReaderError::Unmounted)
        }
    }

    fn report(&self, err: &ReaderError) {
        warn!(error = %err, "reader operation failed");
        self.emit(ReaderEvent::Error(err.to_string()));
    }

    fn emit(&self, event: ReaderEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DocumentAccess, MemoryNotesService};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use uuid::Uuid;

    struct FakeAccess {
        access: DocumentAccess,
        available: bool,
    }

    #[async_trait]
    impl AccessService for FakeAccess {
        async fn fetch_document_access(&self, _: DocumentId) -> anyhow::Result<DocumentAccess> {
            Ok(self.access)
        }
        async fn check_availability(&self, _: DocumentId) -> anyhow::Result<bool> {
            Ok(self.available)
        }
        async fn resolve_pdf_source(&self, document: DocumentId) -> anyhow::Result<PdfSource> {
            Ok(PdfSource {
                url: format!("memory://{document}"),
                auth_header: None,
            })
        }
    }

    /// Notes service that unmounts the view while a fetch is in flight.
    struct UnmountingNotes {
        liveness: Mutex<Option<Liveness>>,
    }

    #[async_trait]
    impl NotesService for UnmountingNotes {
        async fn fetch_notes(&self, _: DocumentId) -> anyhow::Result<Vec<Note>> {
            if let Some(liveness) = self.liveness.lock().as_ref() {
                liveness.cancel();
            }
            Ok(Vec::new())
        }
        async fn create_note(&self, _: crate::note::NewNote) -> anyhow::Result<Note> {
            Err(anyhow!("unused"))
        }
        async fn update_note(&self, _: &NoteId, _: &str) -> anyhow::Result<Note> {
            Err(anyhow!("unused"))
        }
        async fn delete_note(&self, _: &NoteId) -> anyhow::Result<()> {
            Err(anyhow!("unused"))
        }
    }

    fn access(access: DocumentAccess) -> Arc<dyn AccessService> {
        Arc::new(FakeAccess {
            access,
            available: true,
        })
    }

    async fn ready(props: ReaderProps, grant: DocumentAccess, total: PageNumber) -> ReaderController {
        let mut reader = ReaderController::mount(
            props,
            ReaderConfig::default(),
            access(grant),
            Arc::new(MemoryNotesService::new()),
        );
        assert_eq!(reader.open().await.unwrap(), ReaderPhase::Loading);
        reader.on_document_loaded(total).unwrap();
        reader
    }

    /// Scrolls to `page` and lets the debounce settle.
    fn scroll_to(reader: &mut ReaderController, page: PageNumber, now: &mut Instant) {
        reader.on_scroll(*now);
        reader.on_visibility(
            &[
                VisibilityEntry::visible(page.saturating_sub(1).max(1), 0.2),
                VisibilityEntry::visible(page, 0.8),
            ],
            *now,
        );
        *now += Duration::from_millis(150);
        reader.tick(*now);
    }

    fn complaint_page() -> TextLayer {
        let preamble = format!("{:<120}", "COMPLAINT FOR DAMAGES. Filed in the Superior Court.");
        TextLayer::from_spans(5, &[preamble.as_str(), "Plaintiff alleges breach", " of the lease."])
    }

    #[tokio::test]
    async fn limit_callback_fires_once_per_arrival() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let props = ReaderProps::new(Uuid::new_v4())
            .on_preview_limit_reached(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let mut reader = ready(props, DocumentAccess::preview(10), 50).await;
        assert_eq!(reader.allowed_max_page(), Some(10));

        let mut now = Instant::now();
        for page in [3, 7, 10] {
            scroll_to(&mut reader, page, &mut now);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(reader.gate_state(), GateState::Triggered);
        scroll_to(&mut reader, 10, &mut now);
        scroll_to(&mut reader, 8, &mut now);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(reader.gate_state(), GateState::Open);
        assert_eq!(reader.display().current_page, 8);
        scroll_to(&mut reader, 10, &mut now);
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        let limit_events = reader
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, ReaderEvent::PreviewLimitReached(10)))
            .count();
        assert_eq!(limit_events, 2);
    }

    #[tokio::test]
    async fn saved_highlight_survives_page_reload() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 12).await;
        reader.mount_text_layer(complaint_page()).unwrap();

        let now = Instant::now();
        let layer = reader.text_layer(5).unwrap();
        let rect = SelectionRect {
            x: 0.1,
            y: 0.4,
            width: 0.3,
            height: 0.02,
        };
        let selection = Selection::between(layer, 120, 144).unwrap().with_rects(vec![rect]);
        let meta = reader.on_selection(selection, now).unwrap();
        assert_eq!(meta.text, "Plaintiff alleges breach");
        assert_eq!(reader.provisional_rects(), &[rect]);

        let note = reader.confirm_note("", HighlightColor::Blue).await.unwrap();
        assert_eq!(note.content, "Plaintiff alleges breach");
        assert_eq!(note.highlight_color, HighlightColor::Blue);
        assert!(reader.pending_highlight().is_none());
        assert!(reader.provisional_rects().is_empty());

        reader.unmount_text_layer(5);
        let report = reader.mount_text_layer(complaint_page()).unwrap();
        assert_eq!(report.applied, 1);
        let marked: Vec<_> = reader
            .text_layer(5)
            .unwrap()
            .segments()
            .into_iter()
            .filter(|segment| segment.marker.is_some())
            .collect();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].text, "Plaintiff alleges breach");
        assert_eq!(marked[0].range.start, 120);
        assert_eq!(marked[0].range.end, 144);
    }

    #[tokio::test]
    async fn jump_grows_window_and_scrolls() {
        let props = ReaderProps::new(Uuid::new_v4())
            .with_start_page(14)
            .with_max_allowed_page(Some(40));
        let mut reader = ready(props, DocumentAccess::full(), 60).await;
        assert_eq!(reader.render_limit(), Some(20));
        assert_eq!(reader.allowed_max_page(), Some(40));
        reader.scroll_settled();
        reader.drain_events();

        assert_eq!(reader.jump_to_page(35).unwrap(), 35);
        assert_eq!(reader.render_limit(), Some(40));
        assert_eq!(reader.display().current_page, 35);
        assert!(reader.is_programmatic_scroll());
        assert!(reader.drain_events().contains(&ReaderEvent::ScrollToPage(35)));

        // Observer noise during the scroll does not move the page.
        let now = Instant::now();
        reader.on_visibility(&[VisibilityEntry::visible(22, 0.9)], now);
        reader.tick(now + Duration::from_millis(500));
        assert_eq!(reader.display().current_page, 35);
    }

    #[tokio::test]
    async fn repeated_load_keeps_window_and_position() {
        let props = ReaderProps::new(Uuid::new_v4()).with_max_allowed_page(Some(45));
        let mut reader = ready(props, DocumentAccess::full(), 60).await;
        reader.jump_to_page(35).unwrap();
        let limit = reader.render_limit();
        assert_eq!(limit, Some(41));
        reader.drain_events();

        reader.on_document_loaded(60).unwrap();
        assert_eq!(reader.render_limit(), limit);
        assert_eq!(reader.display().current_page, 35);
        assert_eq!(reader.allowed_max_page(), Some(45));
        assert!(reader.drain_events().is_empty());
    }

    #[tokio::test]
    async fn navigation_past_preview_limit_is_refused() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let props = ReaderProps::new(Uuid::new_v4()).on_preview_limit_reached(move |page| {
            assert_eq!(page, 25);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut reader = ready(props, DocumentAccess::preview(10), 50).await;

        assert!(matches!(
            reader.jump_to_page(25),
            Err(ReaderError::NavigationBlocked { target: 25, allowed: 10 })
        ));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(reader.display().current_page, 1);
    }

    #[tokio::test]
    async fn ceiling_at_page_count_never_gates() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::preview(50), 12).await;
        assert_eq!(reader.allowed_max_page(), Some(12));
        assert_eq!(reader.jump_to_page(12).unwrap(), 12);
        assert!(!reader
            .drain_events()
            .iter()
            .any(|event| matches!(event, ReaderEvent::PreviewLimitReached(_))));
    }

    #[tokio::test]
    async fn selection_is_ignored_while_scrolling() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 12).await;
        reader.mount_text_layer(complaint_page()).unwrap();
        let now = Instant::now();
        reader.on_scroll(now);
        let selection = Selection::between(reader.text_layer(5).unwrap(), 120, 144).unwrap();
        assert!(reader.on_selection(selection.clone(), now).is_none());
        assert!(reader
            .on_selection(selection, now + Duration::from_millis(500))
            .is_some());
    }

    #[tokio::test]
    async fn marker_click_focuses_and_flashes_note() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 12).await;
        reader.mount_text_layer(complaint_page()).unwrap();
        let now = Instant::now();
        let selection = Selection::between(reader.text_layer(5).unwrap(), 120, 144).unwrap();
        reader.on_selection(selection, now).unwrap();
        let note = reader.confirm_note("breach claim", HighlightColor::Pink).await.unwrap();

        let marker_path = NodePath::new([1, 0]);
        assert!(reader.text_layer(5).unwrap().marker_at(&marker_path).is_some());
        assert_eq!(reader.click(5, &marker_path, now), Some(note.id.clone()));
        assert!(reader.sidebar().open);
        assert_eq!(reader.sidebar().active_note, Some(note.id.clone()));
        assert!(reader.sidebar().is_flashing(&note.id, now + Duration::from_millis(500)));

        reader.drain_events();
        reader.tick(now + Duration::from_millis(900));
        assert!(!reader.sidebar().is_flashing(&note.id, now + Duration::from_millis(900)));
        assert_eq!(reader.drain_events(), vec![ReaderEvent::FlashCleared(note.id.clone())]);

        assert_eq!(reader.click(5, &NodePath::new([0, 0]), now), None);
    }

    #[tokio::test]
    async fn overlapping_selection_keeps_dialog_open() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 12).await;
        reader.mount_text_layer(complaint_page()).unwrap();
        let now = Instant::now();
        let layer = reader.text_layer(5).unwrap();
        reader.on_selection(Selection::between(layer, 120, 144).unwrap(), now).unwrap();
        reader.confirm_note("", HighlightColor::Yellow).await.unwrap();

        let layer = reader.text_layer(5).unwrap();
        reader.on_selection(Selection::between(layer, 130, 150).unwrap(), now).unwrap();
        let err = reader.confirm_note("again", HighlightColor::Green).await.unwrap_err();
        assert!(err.is_validation());
        assert!(reader.pending_highlight().is_some());
        assert_eq!(reader.notes().len(), 1);
        assert!(reader
            .drain_events()
            .iter()
            .any(|event| matches!(event, ReaderEvent::Error(_))));
    }

    #[tokio::test]
    async fn delete_removes_marker_and_clears_focus() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 12).await;
        reader.mount_text_layer(complaint_page()).unwrap();
        let now = Instant::now();
        let layer = reader.text_layer(5).unwrap();
        reader.on_selection(Selection::between(layer, 120, 144).unwrap(), now).unwrap();
        let note = reader.confirm_note("", HighlightColor::Yellow).await.unwrap();
        reader.focus_note(&note.id, now).unwrap();

        let updated = reader.update_note(&note.id, "  ").await.unwrap();
        assert_eq!(updated.content, "Plaintiff alleges breach");

        reader.delete_note(&note.id).await.unwrap();
        assert!(reader.sidebar().active_note.is_none());
        assert!(reader.text_layer(5).unwrap().markers().is_empty());
        assert_eq!(
            reader.text_layer(5).unwrap().plain_text(),
            complaint_page().plain_text()
        );
    }

    #[tokio::test]
    async fn unavailable_content_blocks_reading() {
        let mut reader = ReaderController::mount(
            ReaderProps::new(Uuid::new_v4()),
            ReaderConfig::default(),
            Arc::new(FakeAccess {
                access: DocumentAccess::full(),
                available: false,
            }),
            Arc::new(MemoryNotesService::new()),
        );
        assert_eq!(reader.open().await.unwrap(), ReaderPhase::Unavailable);
        assert!(matches!(
            reader.on_document_loaded(10),
            Err(ReaderError::ContentUnavailable)
        ));
        assert!(matches!(
            reader.resolve_source().await,
            Err(ReaderError::ContentUnavailable)
        ));
        assert_eq!(reader.drain_events(), vec![ReaderEvent::ContentUnavailable]);
    }

    #[tokio::test]
    async fn results_after_unmount_are_dropped() {
        let notes = Arc::new(UnmountingNotes {
            liveness: Mutex::new(None),
        });
        let mut reader = ReaderController::mount(
            ReaderProps::new(Uuid::new_v4()),
            ReaderConfig::default(),
            access(DocumentAccess::full()),
            notes.clone(),
        );
        *notes.liveness.lock() = Some(reader.liveness());

        assert!(matches!(reader.open().await, Err(ReaderError::Unmounted)));
        assert!(reader.drain_events().is_empty());
        assert!(matches!(reader.on_document_loaded(5), Err(ReaderError::Unmounted)));
    }

    #[tokio::test]
    async fn zoom_is_clamped_and_resettable() {
        let mut reader = ready(ReaderProps::new(Uuid::new_v4()), DocumentAccess::full(), 3).await;
        for _ in 0..40 {
            reader.apply(Command::ScaleBy { factor: 1.1 }).unwrap();
        }
        assert_eq!(reader.display().zoom, MAX_ZOOM);
        reader.apply(Command::ScaleBy { factor: 0.01 }).unwrap();
        assert_eq!(reader.display().zoom, MIN_ZOOM);
        reader.apply(Command::ResetScale).unwrap();
        assert_eq!(reader.display().zoom, 1.0);
        reader.apply(Command::ToggleDarkMode).unwrap();
        assert!(reader.display().dark_mode);
    }
}
