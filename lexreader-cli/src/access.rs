use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lexreader_core::{AccessService, DocumentAccess, DocumentId, PageNumber, PdfSource};
use tracing::debug;
use url::Url;

/// Grants access to a single local file, optionally as a preview.
pub struct LocalAccessService {
    path: PathBuf,
    preview_pages: Option<PageNumber>,
}

impl LocalAccessService {
    pub fn new(path: PathBuf, preview_pages: Option<PageNumber>) -> Self {
        Self {
            path,
            preview_pages,
        }
    }
}

#[async_trait]
impl AccessService for LocalAccessService {
    async fn fetch_document_access(&self, document: DocumentId) -> Result<DocumentAccess> {
        let access = match self.preview_pages {
            Some(pages) => DocumentAccess::preview(pages),
            None => DocumentAccess::full(),
        };
        debug!(%document, ?access, "resolved local access");
        Ok(access)
    }

    async fn check_availability(&self, _document: DocumentId) -> Result<bool> {
        Ok(self.path.is_file())
    }

    async fn resolve_pdf_source(&self, _document: DocumentId) -> Result<PdfSource> {
        let absolute = self
            .path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", self.path))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| anyhow!("cannot express {:?} as a file URL", absolute))?;
        Ok(PdfSource {
            url: url.into(),
            auth_header: None,
        })
    }
}

/// Local path behind a `file://` source.
pub fn source_path(source: &PdfSource) -> Result<PathBuf> {
    let url = Url::parse(&source.url).with_context(|| format!("invalid source URL {}", source.url))?;
    if url.scheme() != "file" {
        return Err(anyhow!("unsupported source scheme {:?}", url.scheme()));
    }
    url.to_file_path()
        .map_err(|_| anyhow!("source URL {} has no local path", source.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn availability_follows_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brief.pdf");
        let service = LocalAccessService::new(path.clone(), None);
        assert!(!service.check_availability(Uuid::nil()).await.unwrap());

        std::fs::write(&path, b"%PDF-1.7").unwrap();
        assert!(service.check_availability(Uuid::nil()).await.unwrap());
    }

    #[tokio::test]
    async fn preview_flag_limits_access() {
        let service = LocalAccessService::new(PathBuf::from("brief.pdf"), Some(10));
        let access = service.fetch_document_access(Uuid::nil()).await.unwrap();
        assert_eq!(access.ceiling(), Some(10));

        let service = LocalAccessService::new(PathBuf::from("brief.pdf"), None);
        let access = service.fetch_document_access(Uuid::nil()).await.unwrap();
        assert!(access.has_full_access);
    }

    #[tokio::test]
    async fn source_round_trips_through_file_url() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brief with spaces.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let service = LocalAccessService::new(path.clone(), None);
        let source = service.resolve_pdf_source(Uuid::nil()).await.unwrap();
        assert!(source.url.starts_with("file://"));
        assert!(source.auth_header.is_none());
        assert_eq!(source_path(&source).unwrap(), path.canonicalize().unwrap());
    }

    #[test]
    fn remote_sources_are_rejected() {
        let source = PdfSource {
            url: "https://example.com/brief.pdf".into(),
            auth_header: Some("Bearer token".into()),
        };
        assert!(source_path(&source).is_err());
    }
}
