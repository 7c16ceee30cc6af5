use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text_layer::{PageNumber, TextRange};
use crate::DocumentId;

const DRAFT_PREFIX: &str = "draft-";

/// Note identifier: client-generated while drafting, server-assigned once saved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn draft() -> Self {
        Self(format!("{DRAFT_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_draft(&self) -> bool {
        self.0.starts_with(DRAFT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Purple,
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Purple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
        }
    }

    /// Next colour in palette order, wrapping around.
    pub fn cycle(self) -> Self {
        let idx = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HighlightColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown highlight color `{s}`"))
    }
}

/// A persisted highlight with its note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub document_id: DocumentId,
    #[serde(default)]
    pub page_number: Option<PageNumber>,
    pub highlighted_text: String,
    pub char_offset_start: usize,
    pub char_offset_end: usize,
    pub content: String,
    #[serde(default)]
    pub highlight_color: HighlightColor,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn range(&self) -> TextRange {
        TextRange::normalized(self.char_offset_start, self.char_offset_end)
    }

    pub fn is_on_page(&self, page: PageNumber) -> bool {
        self.page_number == Some(page)
    }
}

/// Payload for creating a note through the notes service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub document_id: DocumentId,
    pub page_number: PageNumber,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub content: String,
    pub color: HighlightColor,
}
