use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lexreader_core::{
    document_id_for_path, DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider,
    PageNumber, TextLayer,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Opens PDFs through a bound pdfium library and serves their text layers.
pub struct PdfiumTextSource {
    pdfium: Arc<Pdfium>,
}

impl PdfiumTextSource {
    /// Binds pdfium from `library` when given, then from the working
    /// directory, then from the system search path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match library.and_then(bind_pdfium_at) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumTextSource {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        debug!(pages = info.page_count, "opened document");
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    layers: Mutex<HashMap<PageNumber, TextLayer>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            layers: Mutex::new(HashMap::new()),
            pdfium,
            path,
            info,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`.
        // It is only stored in `self.document`, which is declared before
        // `pdfium` and therefore dropped before the bindings it refers to.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("document {:?} is not loaded", self.path))?;
        f(document)
    }

    fn extract_text(&self, page: PageNumber) -> Result<String> {
        self.with_document(|document| {
            let index = page_index(page)?;
            let pdf_page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page))?;
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page))?;
            Ok(text.all())
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn text_layer(&self, page: PageNumber) -> Result<TextLayer> {
        if page == 0 || page > self.info.page_count {
            return Err(anyhow!(
                "page {} out of range (document has {} pages)",
                page,
                self.info.page_count
            ));
        }
        if let Some(layer) = self.layers.lock().get(&page) {
            return Ok(layer.clone());
        }

        let text = self.extract_text(page)?;
        let lines = split_lines(&text);
        if lines.is_empty() {
            warn!(page, path = %self.path.display(), "page has no extractable text");
        }
        let layer = TextLayer::from_spans(page, &lines);
        self.layers.lock().insert(page, layer.clone());
        Ok(layer)
    }
}

/// Converts a 1-based page number into pdfium's zero-based index.
fn page_index(page: PageNumber) -> Result<PdfPageIndex> {
    page.checked_sub(1)
        .and_then(|index| PdfPageIndex::try_from(index).ok())
        .ok_or_else(|| anyhow!("page {} is out of supported range", page))
}

/// One span per line, each keeping its trailing `\n`. Line endings are
/// normalised so character offsets do not depend on the producer.
fn split_lines(text: &str) -> Vec<String> {
    let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
    normalised
        .split_inclusive('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = PageNumber::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned())
        .filter(|t| !t.trim().is_empty());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned())
        .filter(|a| !a.trim().is_empty());

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata { title, author },
    })
}

fn bind_pdfium_at(path: &Path) -> Option<Pdfium> {
    match Pdfium::bind_to_library(path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from configured path {}: {}",
                path.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set `pdfium_library` in the config ({})",
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_keep_their_breaks() {
        let lines = split_lines("COMPLAINT\r\nPlaintiff alleges breach\n\nof the lease.");
        assert_eq!(
            lines,
            vec!["COMPLAINT\n", "Plaintiff alleges breach\n", "\n", "of the lease."]
        );
        let layer = TextLayer::from_spans(1, &lines);
        assert_eq!(
            layer.plain_text(),
            "COMPLAINT\nPlaintiff alleges breach\n\nof the lease."
        );
    }

    #[test]
    fn empty_page_has_no_spans() {
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn page_numbers_map_to_zero_based_indices() {
        assert_eq!(page_index(1).unwrap(), 0);
        assert_eq!(page_index(12).unwrap(), 11);
        assert!(page_index(0).is_err());
        assert!(page_index(PageNumber::MAX).is_err());
    }
}
