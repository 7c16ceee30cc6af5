use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::note::HighlightColor;
use crate::offsets::MIN_SELECTION_CHARS;
use crate::text_layer::PageNumber;

/// Reader tuning, loaded from `config.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub lookahead_pages: u32,
    pub batch_pages: u32,
    pub initial_lead_pages: u32,
    pub initial_min_pages: u32,
    pub page_debounce_ms: u64,
    pub scroll_idle_ms: u64,
    pub flash_ms: u64,
    pub min_selection_chars: usize,
    pub default_color: HighlightColor,
    pub preview_max_pages: Option<PageNumber>,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            lookahead_pages: 5,
            batch_pages: 10,
            initial_lead_pages: 6,
            initial_min_pages: 10,
            page_debounce_ms: 100,
            scroll_idle_ms: 120,
            flash_ms: 900,
            min_selection_chars: MIN_SELECTION_CHARS,
            default_color: HighlightColor::Yellow,
            preview_max_pages: None,
            pdfium_library: None,
        }
    }
}

impl ReaderConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse reader configuration")
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn page_debounce(&self) -> Duration {
        Duration::from_millis(self.page_debounce_ms)
    }

    pub fn scroll_idle(&self) -> Duration {
        Duration::from_millis(self.scroll_idle_ms)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }
}
