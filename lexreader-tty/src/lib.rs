pub mod layout;
pub mod paint;

use std::io::{self, Write};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use lexreader_core::{Command, PageNumber};

pub use layout::{layout_page, pending_rows, word_backward, word_forward, Piece, Row, RowKind, ScrollView};
pub use paint::{PaintStyle, PanelLine, TextRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left(u32),
    Right(u32),
    Up(u32),
    Down(u32),
    WordForward(u32),
    WordBackward(u32),
    LineStart,
    LineEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    /// User-driven scroll by whole rows.
    Scroll { rows: i32 },
    /// User-driven scroll by whole screens.
    ScrollScreen { screens: i32 },
    BeginSelection,
    MoveCursor(Motion),
    ToggleAnchor,
    ConfirmSelection,
    CancelSelection,
    NoteInputChanged { text: String },
    CycleColor,
    NoteSubmit { text: String },
    NoteCancel,
    OpenSidebar,
    CloseOverlay,
    SidebarMoveSelection { delta: isize },
    SidebarActivate,
    SidebarEdit,
    SidebarDelete,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Select,
    NoteInput,
    Sidebar,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<u32>,
    pending_digits: String,
    mode: InputMode,
    note_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            if matches!(mode, InputMode::NoteInput) || matches!(self.mode, InputMode::NoteInput) {
                self.note_buffer.clear();
            }
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Pre-fills the note buffer, e.g. when editing an existing note.
    pub fn set_note_buffer(&mut self, text: &str) {
        self.note_buffer = text.to_owned();
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Select => self.map_event_select(event),
            InputMode::NoteInput => self.map_event_note(event),
            InputMode::Sidebar => self.map_event_sidebar(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let rows = self.take_count() as i32;
                UiEvent::Scroll { rows }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let rows = self.take_count() as i32;
                UiEvent::Scroll { rows: -rows }
            }
            (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                let screens = self.take_count() as i32;
                UiEvent::ScrollScreen { screens }
            }
            (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                let screens = self.take_count() as i32;
                UiEvent::ScrollScreen { screens: -screens }
            }
            (KeyCode::PageDown, _) | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                let screens = self.take_count() as i32;
                UiEvent::ScrollScreen { screens }
            }
            (KeyCode::PageUp, _) => {
                let screens = self.take_count() as i32;
                UiEvent::ScrollScreen { screens: -screens }
            }
            (KeyCode::Char('J'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('K'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.pending_count.take().filter(|&page| page > 0).unwrap_or(1);
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                let page = self
                    .pending_count
                    .take()
                    .filter(|&page| page > 0)
                    .unwrap_or(PageNumber::MAX);
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoPage {
                    page: PageNumber::MAX,
                })
            }
            (KeyCode::Char('v'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Select);
                UiEvent::BeginSelection
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) | (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::OpenSidebar
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ResetScale)
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ScaleBy { factor: 1.1 })
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ScaleBy { factor: 0.9 })
            }
            (KeyCode::Char('d'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleDarkMode)
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_select(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() && c != '0' => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit);
                }
                UiEvent::None
            }
            (KeyCode::Char('0'), KeyModifiers::NONE) if self.pending_count.is_some() => {
                self.push_digit(0);
                UiEvent::None
            }
            (KeyCode::Char('0'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::MoveCursor(Motion::LineStart)
            }
            (KeyCode::Char('$'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::MoveCursor(Motion::LineEnd)
            }
            (KeyCode::Char('h'), KeyModifiers::NONE) | (KeyCode::Left, _) => {
                UiEvent::MoveCursor(Motion::Left(self.take_count()))
            }
            (KeyCode::Char('l'), KeyModifiers::NONE) | (KeyCode::Right, _) => {
                UiEvent::MoveCursor(Motion::Right(self.take_count()))
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => {
                UiEvent::MoveCursor(Motion::Up(self.take_count()))
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => {
                UiEvent::MoveCursor(Motion::Down(self.take_count()))
            }
            (KeyCode::Char('w'), KeyModifiers::NONE) => {
                UiEvent::MoveCursor(Motion::WordForward(self.take_count()))
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) => {
                UiEvent::MoveCursor(Motion::WordBackward(self.take_count()))
            }
            (KeyCode::Char('v'), KeyModifiers::NONE) | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::ToggleAnchor
            }
            (KeyCode::Enter, _) | (KeyCode::Char('a'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::ConfirmSelection
            }
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::CancelSelection
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_note(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => UiEvent::NoteCancel,
            (KeyCode::Enter, _) => UiEvent::NoteSubmit {
                text: self.note_buffer.clone(),
            },
            (KeyCode::Tab, _) => UiEvent::CycleColor,
            (KeyCode::Backspace, _) => {
                self.note_buffer.pop();
                UiEvent::NoteInputChanged {
                    text: self.note_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.note_buffer.push(c);
                UiEvent::NoteInputChanged {
                    text: self.note_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn map_event_sidebar(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('s'), _) | (KeyCode::Tab, _) => {
                UiEvent::CloseOverlay
            }
            (KeyCode::Enter, _) => UiEvent::SidebarActivate,
            (KeyCode::Char('e'), KeyModifiers::NONE) => UiEvent::SidebarEdit,
            (KeyCode::Char('x'), KeyModifiers::NONE) | (KeyCode::Delete, _) => {
                UiEvent::SidebarDelete
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::SidebarMoveSelection { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::SidebarMoveSelection { delta: -1 }
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: u32) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> u32 {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::NoteInput => Some(format!("note> {}", self.note_buffer)),
            InputMode::Select => Some(format!("-- SELECT -- {}", self.pending_digits)),
            InputMode::Normal | InputMode::Sidebar if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            _ => None,
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
