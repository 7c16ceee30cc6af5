mod access;
mod app;
mod sidebar;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use lexreader_core::{
    document_id_for_path, DocumentProvider, FileNotesService, PageNumber, ReaderConfig,
    ReaderController, ReaderPhase, ReaderProps,
};
use lexreader_render::PdfiumTextSource;
use lexreader_tty::TextRenderer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::access::{source_path, LocalAccessService};
use crate::app::{App, LoopAction};

#[derive(Debug, Parser)]
#[command(
    name = "lexreader",
    version,
    about = "Terminal PDF reader with highlights and notes"
)]
struct Args {
    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<PageNumber>,

    /// Only allow reading the first N pages
    #[arg(long = "preview-pages")]
    preview_pages: Option<PageNumber>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the PDF file to open
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "lexreader", "lexreader")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ReaderConfig::load(&config_path)?;
    let preview_pages = args.preview_pages.or(config.preview_max_pages);

    let access = Arc::new(LocalAccessService::new(args.file.clone(), preview_pages));
    let notes = Arc::new(FileNotesService::new(
        project_dirs.data_local_dir().join("notes"),
    )?);

    let limit_hits = Arc::new(AtomicU32::new(0));
    let mut props = ReaderProps::new(document_id_for_path(&args.file)).on_preview_limit_reached({
        let limit_hits = Arc::clone(&limit_hits);
        move |page| {
            info!(page, "preview limit reached");
            limit_hits.fetch_add(1, Ordering::Relaxed);
        }
    });
    if let Some(page) = args.page {
        props = props.with_start_page(page);
    }

    let default_color = config.default_color;
    let pdfium_library = config.pdfium_library.clone();
    let mut reader = ReaderController::mount(props, config, access, notes);
    if reader.open().await? == ReaderPhase::Unavailable {
        return Err(anyhow!("{:?} is not available for reading", args.file));
    }

    let source = reader.resolve_source().await?;
    let path = source_path(&source)?;
    let provider = PdfiumTextSource::new(pdfium_library.as_deref())?;
    let backend = provider
        .open(&path)
        .await
        .with_context(|| format!("failed to open {:?}", path))?;
    reader.on_document_loaded(backend.info().page_count)?;

    let (cols, rows) = terminal::size()?;
    let mut app = App::new(reader, backend, default_color, cols, rows);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, Clear(ClearType::All))?;
    let mut renderer = TextRenderer::new(stdout);

    loop {
        app.tick(Instant::now());
        if app.take_dirty() {
            app.redraw(&mut renderer, Instant::now())?;
        }

        if event::poll(Duration::from_millis(100))? {
            let ev = event::read()?;
            if let Event::Resize(cols, rows) = ev {
                app.resize(cols, rows);
                renderer.clear_all()?;
                continue;
            }
            let ui_event = app.mapper_mut().map_event(ev);
            match app.handle(ui_event, Instant::now()).await {
                LoopAction::Redraw | LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.clear_all()?;
    let hits = limit_hits.load(Ordering::Relaxed);
    if hits > 0 {
        warn!(hits, "session ended after reaching the preview limit");
    }
    Ok(())
}

/// File-only logging; the terminal is in raw mode while the reader runs.
fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "lexreader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
