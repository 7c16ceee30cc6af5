use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use lexreader_core::{
    Command, DocumentBackend, HighlightColor, NoteId, PageNumber, ReaderController, ReaderEvent,
    Selection, SelectionRect, TextRange,
};
use lexreader_tty::{
    layout_page, paint::truncate_with_ellipsis, pending_rows, word_backward, word_forward,
    write_status_line, EventMapper, InputMode, Motion, PaintStyle, RowKind, ScrollView,
    TextRenderer, UiEvent,
};
use tracing::{debug, warn};

use crate::sidebar::SidebarWindow;

const SIDEBAR_WIDTH: u16 = 40;
const BASE_WRAP: f32 = 72.0;
const MIN_WRAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Redraw,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
enum NoteTarget {
    New,
    Edit(NoteId),
}

#[derive(Debug, Clone)]
struct NoteDraft {
    target: NoteTarget,
    color: HighlightColor,
}

/// Terminal host around a [`ReaderController`]: owns the scroll view, the
/// selection cursor, the notes sidebar and the status line.
pub struct App {
    reader: ReaderController,
    backend: Arc<dyn DocumentBackend>,
    view: ScrollView,
    mapper: EventMapper,
    sidebar: SidebarWindow,
    cols: u16,
    rows: u16,
    cursor: Option<(PageNumber, usize)>,
    anchor: Option<usize>,
    draft: Option<NoteDraft>,
    default_color: HighlightColor,
    status: Option<String>,
    dirty: bool,
}

impl App {
    pub fn new(
        reader: ReaderController,
        backend: Arc<dyn DocumentBackend>,
        default_color: HighlightColor,
        cols: u16,
        rows: u16,
    ) -> Self {
        let mut app = Self {
            reader,
            backend,
            view: ScrollView::new(usize::from(rows.saturating_sub(1))),
            mapper: EventMapper::new(),
            sidebar: SidebarWindow::default(),
            cols,
            rows,
            cursor: None,
            anchor: None,
            draft: None,
            default_color,
            status: None,
            dirty: true,
        };
        app.sidebar.refresh(app.reader.store());
        app.sync();
        app
    }

    pub fn reader(&self) -> &ReaderController {
        &self.reader
    }

    pub fn mapper_mut(&mut self) -> &mut EventMapper {
        &mut self.mapper
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.view.set_height(usize::from(rows.saturating_sub(1)));
        self.relayout();
        self.dirty = true;
    }

    /// Advances timers and applies whatever the controller queued.
    pub fn tick(&mut self, now: Instant) {
        self.reader.tick(now);
        self.sync();
    }

    pub async fn handle(&mut self, event: UiEvent, now: Instant) -> LoopAction {
        match event {
            UiEvent::Command(command) => self.apply(command),
            UiEvent::Scroll { rows } => self.user_scroll(rows as isize, now),
            UiEvent::ScrollScreen { screens } => {
                let rows = screens as isize * self.view.height() as isize;
                self.user_scroll(rows, now);
            }
            UiEvent::BeginSelection => self.begin_selection(),
            UiEvent::MoveCursor(motion) => self.move_cursor(motion, now),
            UiEvent::ToggleAnchor => {
                self.anchor = match (self.anchor, self.cursor) {
                    (None, Some((_, offset))) => Some(offset),
                    _ => None,
                };
                self.dirty = true;
            }
            UiEvent::ConfirmSelection => self.confirm_selection(now),
            UiEvent::CancelSelection => self.clear_selection(),
            UiEvent::NoteInputChanged { .. } => self.dirty = true,
            UiEvent::CycleColor => {
                if let Some(draft) = self.draft.as_mut().filter(|d| d.target == NoteTarget::New) {
                    draft.color = draft.color.cycle();
                    self.dirty = true;
                }
            }
            UiEvent::NoteSubmit { text } => self.submit_note(&text).await,
            UiEvent::NoteCancel => self.cancel_note(),
            UiEvent::OpenSidebar => {
                if !self.reader.sidebar().open {
                    self.apply(Command::ToggleSidebar);
                }
                self.sidebar.refresh(self.reader.store());
                self.mapper.set_mode(InputMode::Sidebar);
                self.dirty = true;
            }
            UiEvent::CloseOverlay => {
                if self.reader.sidebar().open {
                    self.apply(Command::ToggleSidebar);
                }
                self.mapper.set_mode(InputMode::Normal);
                self.dirty = true;
            }
            UiEvent::SidebarMoveSelection { delta } => {
                self.dirty |= self.sidebar.move_selection(delta);
            }
            UiEvent::SidebarActivate => {
                if let Some(id) = self.selected_note() {
                    if let Err(err) = self.reader.open_note(&id, now) {
                        self.set_status(err.to_string());
                    }
                }
            }
            UiEvent::SidebarEdit => self.begin_edit(),
            UiEvent::SidebarDelete => {
                if let Some(id) = self.selected_note() {
                    match self.reader.delete_note(&id).await {
                        Ok(_) => self.set_status("Note deleted"),
                        Err(err) => self.set_status(err.to_string()),
                    }
                }
            }
            UiEvent::Quit => return LoopAction::Quit,
            UiEvent::None => {}
        }
        self.sync();
        if self.dirty {
            LoopAction::Redraw
        } else {
            LoopAction::Continue
        }
    }

    fn apply(&mut self, command: Command) {
        if let Err(err) = self.reader.apply(command) {
            self.set_status(err.to_string());
        }
    }

    fn user_scroll(&mut self, rows: isize, now: Instant) {
        self.reader.on_scroll(now);
        if self.view.scroll_by(rows) {
            self.reader.on_visibility(&self.view.visibility(), now);
            self.dirty = true;
        }
    }

    fn begin_selection(&mut self) {
        match self.view.first_visible_text() {
            Some(row) => {
                self.cursor = Some((row.page, row.start));
                self.anchor = None;
            }
            None => {
                self.mapper.set_mode(InputMode::Normal);
                self.set_status("No text on screen to select");
            }
        }
        self.dirty = true;
    }

    fn move_cursor(&mut self, motion: Motion, now: Instant) {
        let Some((page, offset)) = self.cursor else {
            return;
        };
        let Some(layer) = self.reader.text_layer(page) else {
            return;
        };
        let last = layer.text_len().saturating_sub(1);
        let line = self.view.row_of(page, offset).map(|idx| &self.view.rows()[idx]);
        let next = match motion {
            Motion::Left(n) => offset.saturating_sub(n as usize),
            Motion::Right(n) => offset.saturating_add(n as usize),
            Motion::Up(n) => self.view.vertical_move(page, offset, -(n as isize)),
            Motion::Down(n) => self.view.vertical_move(page, offset, n as isize),
            Motion::WordForward(n) => {
                let text = layer.plain_text();
                (0..n).fold(offset, |at, _| word_forward(&text, at))
            }
            Motion::WordBackward(n) => {
                let text = layer.plain_text();
                (0..n).fold(offset, |at, _| word_backward(&text, at))
            }
            Motion::LineStart => line.map_or(offset, |row| row.start),
            Motion::LineEnd => line.map_or(offset, |row| row.end().saturating_sub(1).max(row.start)),
        }
        .min(last);
        self.cursor = Some((page, next));
        if let Some(idx) = self.view.row_of(page, next) {
            if self.view.ensure_visible(idx) {
                self.reader.on_visibility(&self.view.visibility(), now);
            }
        }
        self.dirty = true;
    }

    /// Enter in select mode: with an anchor the range becomes a highlight,
    /// without one the cursor acts as a click.
    fn confirm_selection(&mut self, now: Instant) {
        let Some((page, offset)) = self.cursor else {
            return;
        };
        let Some(anchor) = self.anchor else {
            let target = self
                .reader
                .text_layer(page)
                .and_then(|layer| layer.position_at(offset + 1))
                .map(|position| position.path);
            let focused = target.and_then(|path| self.reader.click(page, &path, now));
            if focused.is_none() {
                self.set_status("Set an anchor with v, then press Enter");
            }
            return;
        };
        let range = selected_range(anchor, offset);
        let rects = self.selection_rects(page, range);
        let selection = self
            .reader
            .text_layer(page)
            .and_then(|layer| Selection::between(layer, range.start, range.end));
        let Some(selection) = selection else {
            return;
        };
        if self.reader.on_selection(selection.with_rects(rects), now).is_none() {
            self.set_status("Selection too short for a highlight");
        }
    }

    /// Viewport-relative boxes for the part of `range` on screen.
    fn selection_rects(&self, page: PageNumber, range: TextRange) -> Vec<SelectionRect> {
        let width = f32::from(self.text_cols().max(1));
        let height = self.view.height() as f32;
        self.view
            .visible_rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.page == page
                    && row.kind == RowKind::Text
                    && row.start < range.end
                    && row.end() > range.start
            })
            .map(|(idx, row)| {
                let from = range.start.max(row.start);
                let to = range.end.min(row.end());
                SelectionRect {
                    x: (from - row.start) as f32 / width,
                    y: idx as f32 / height,
                    width: (to - from) as f32 / width,
                    height: 1.0 / height,
                }
            })
            .collect()
    }

    fn clear_selection(&mut self) {
        self.cursor = None;
        self.anchor = None;
        self.dirty = true;
    }

    async fn submit_note(&mut self, text: &str) {
        let Some(draft) = self.draft.clone() else {
            return;
        };
        match draft.target {
            NoteTarget::New => {
                if let Err(err) = self.reader.confirm_note(text, draft.color).await {
                    self.set_status(err.to_string());
                }
            }
            NoteTarget::Edit(id) => match self.reader.update_note(&id, text).await {
                Ok(_) => {
                    self.draft = None;
                    self.mapper.set_mode(InputMode::Sidebar);
                    self.set_status("Note updated");
                }
                Err(err) => self.set_status(err.to_string()),
            },
        }
    }

    fn cancel_note(&mut self) {
        match self.draft.as_ref().map(|draft| &draft.target) {
            Some(NoteTarget::New) => self.reader.cancel_note(),
            Some(NoteTarget::Edit(_)) => {
                self.draft = None;
                self.mapper.set_mode(InputMode::Sidebar);
            }
            None => self.mapper.set_mode(InputMode::Normal),
        }
        self.dirty = true;
    }

    fn begin_edit(&mut self) {
        let Some(id) = self.selected_note() else {
            return;
        };
        let Some(note) = self.reader.store().get(&id) else {
            return;
        };
        let content = note.content.clone();
        let color = note.highlight_color;
        self.draft = Some(NoteDraft {
            target: NoteTarget::Edit(id),
            color,
        });
        self.mapper.set_mode(InputMode::NoteInput);
        self.mapper.set_note_buffer(&content);
        self.dirty = true;
    }

    fn selected_note(&self) -> Option<NoteId> {
        self.sidebar.selected_entry().map(|entry| entry.note_id.clone())
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
        self.dirty = true;
    }

    /// Drains controller events until the queue is empty, then relayouts
    /// and scrolls once.
    fn sync(&mut self) {
        let mut relayout = false;
        let mut scroll_target = None;
        loop {
            let events = self.reader.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                match event {
                    ReaderEvent::ContentUnavailable => {
                        self.set_status("Document content is unavailable");
                    }
                    ReaderEvent::DocumentReady { .. } | ReaderEvent::DisplayChanged => {
                        relayout = true;
                    }
                    ReaderEvent::RenderLimitChanged(limit) => {
                        self.mount_pages(limit);
                        relayout = true;
                    }
                    ReaderEvent::HighlightsApplied { .. } => relayout = true,
                    ReaderEvent::ScrollToPage(page) => scroll_target = Some(page),
                    ReaderEvent::CurrentPageChanged(_) | ReaderEvent::FlashCleared(_) => {
                        self.dirty = true;
                    }
                    ReaderEvent::PreviewLimitReached(page) => {
                        self.set_status(format!(
                            "Preview ends at page {page}. Full access is required to read further."
                        ));
                    }
                    ReaderEvent::NotesChanged => {
                        self.sidebar.refresh(self.reader.store());
                        self.dirty = true;
                    }
                    ReaderEvent::NoteDialogOpened(_) => {
                        self.draft = Some(NoteDraft {
                            target: NoteTarget::New,
                            color: self.default_color,
                        });
                        self.mapper.set_mode(InputMode::NoteInput);
                        self.dirty = true;
                    }
                    ReaderEvent::NoteDialogClosed => {
                        self.draft = None;
                        self.clear_selection();
                        self.mapper.set_mode(InputMode::Normal);
                    }
                    ReaderEvent::NoteFocused { note, .. } => {
                        self.sidebar.refresh(self.reader.store());
                        self.sidebar.select_note(&note);
                        if self.mapper.mode() != InputMode::NoteInput {
                            self.clear_selection();
                            self.mapper.set_mode(InputMode::Sidebar);
                        }
                        relayout = true;
                    }
                    ReaderEvent::Error(message) => self.set_status(message),
                }
            }
        }
        if relayout {
            self.relayout();
        }
        if let Some(page) = scroll_target {
            self.view.scroll_to_page(page);
            // Terminal scrolls land immediately.
            self.reader.on_visibility(&self.view.visibility(), Instant::now());
            self.reader.scroll_settled();
            self.dirty = true;
        }
    }

    fn mount_pages(&mut self, limit: PageNumber) {
        for page in 1..=limit {
            if self.reader.text_layer(page).is_some() {
                continue;
            }
            let layer = match self.backend.text_layer(page) {
                Ok(layer) => layer,
                Err(err) => {
                    warn!(page, error = %err, "failed to extract text layer");
                    self.set_status(format!("Page {page} could not be read"));
                    continue;
                }
            };
            match self.reader.mount_text_layer(layer) {
                Ok(report) => debug!(page, applied = report.applied, "mounted text layer"),
                Err(err) => warn!(page, error = %err, "text layer rejected"),
            }
        }
    }

    fn text_cols(&self) -> u16 {
        if self.reader.sidebar().open {
            self.cols.saturating_sub(SIDEBAR_WIDTH)
        } else {
            self.cols
        }
    }

    fn wrap_width(&self) -> usize {
        let max = usize::from(self.text_cols()).max(MIN_WRAP);
        ((BASE_WRAP * self.reader.display().zoom).round() as usize).clamp(MIN_WRAP, max)
    }

    fn relayout(&mut self) {
        let width = self.wrap_width();
        let limit = self.reader.render_limit().unwrap_or(0);
        let mut rows = Vec::new();
        for page in 1..=limit {
            match self.reader.text_layer(page) {
                Some(layer) => rows.extend(layout_page(layer, width)),
                None => rows.extend(pending_rows(page)),
            }
        }
        self.view.set_rows(rows);
        self.dirty = true;
    }

    fn status_text(&self) -> String {
        let display = self.reader.display();
        let info = self.backend.info();
        let title = info.metadata.title.clone().unwrap_or_else(|| {
            info.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let mut status = format!("{title}  p{}", display.current_page);
        if let Some(total) = display.total_pages {
            status.push_str(&format!("/{total}"));
            match self.reader.allowed_max_page() {
                Some(allowed) if allowed < total => status.push_str(&format!(" (preview {allowed})")),
                _ => {}
            }
        }
        if (display.zoom - 1.0).abs() > f32::EPSILON {
            status.push_str(&format!("  {:.0}%", display.zoom * 100.0));
        }
        if let Some(draft) = &self.draft {
            status.push_str(&format!("  [{}]", draft.color));
        }
        let pending = self.mapper.pending_input();
        let status = combine_status(Some(status), self.status.as_deref());
        combine_status(status, pending.as_deref()).unwrap_or_default()
    }

    pub fn redraw<W: Write>(&mut self, renderer: &mut TextRenderer<W>, now: Instant) -> Result<()> {
        let text_cols = self.text_cols();
        let height = self.view.height();
        let sidebar = self.reader.sidebar();
        let flashing = sidebar
            .active_note
            .as_ref()
            .filter(|id| sidebar.is_flashing(id, now));
        let selection = match (self.cursor, self.anchor, self.reader.pending_highlight()) {
            (_, _, Some(pending)) => Some((pending.page, pending.range)),
            (Some((page, offset)), Some(anchor), None) => Some((page, selected_range(anchor, offset))),
            _ => None,
        };
        let style = PaintStyle {
            dark_mode: self.reader.display().dark_mode,
            selection,
            cursor: self.cursor,
            active_note: sidebar.active_note.as_ref(),
            flashing,
        };

        renderer.begin_sync_update()?;
        let visible = self.view.visible_rows();
        renderer.paint_rows(visible, 0, 0, text_cols, &style)?;
        for y in visible.len()..height {
            queue!(
                renderer.writer(),
                cursor::MoveTo(0, y as u16),
                Clear(ClearType::UntilNewLine)
            )?;
        }
        if sidebar.open {
            self.sidebar.ensure_visible(height.saturating_sub(3));
            let lines = self.sidebar.panel_lines(flashing);
            let title = format!("Notes ({})", self.reader.notes().len());
            renderer.paint_panel(
                text_cols,
                0,
                SIDEBAR_WIDTH.min(self.cols),
                height as u16,
                &title,
                &lines,
                self.sidebar.selected(),
                self.sidebar.scroll_offset(),
            )?;
        }
        let status = truncate_with_ellipsis(self.status_text(), usize::from(self.cols));
        {
            let writer = renderer.writer();
            queue!(
                writer,
                cursor::MoveTo(0, self.rows.saturating_sub(1)),
                Clear(ClearType::CurrentLine)
            )?;
            write_status_line(writer, &status)?;
        }
        renderer.end_sync_update()?;
        Ok(())
    }
}

/// Inclusive anchor and cursor positions as a half-open range.
fn selected_range(anchor: usize, cursor: usize) -> TextRange {
    TextRange {
        start: anchor.min(cursor),
        end: anchor.max(cursor) + 1,
    }
}

fn combine_status(base: Option<String>, extra: Option<&str>) -> Option<String> {
    match (base, extra.filter(|s| !s.is_empty())) {
        (Some(mut base), Some(extra)) => {
            base.push_str(" | ");
            base.push_str(extra);
            Some(base)
        }
        (Some(base), None) => Some(base),
        (None, Some(extra)) => Some(extra.to_string()),
        (None, None) => None,
    }
}
