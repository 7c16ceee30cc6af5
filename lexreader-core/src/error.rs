use thiserror::Error;

use crate::note::NoteId;
use crate::text_layer::{PageNumber, TextRange};

#[derive(Debug, Error)]
pub enum ReaderError {
    /// Transient failure of an external service; local state is unchanged.
    #[error("{operation} failed: {source}")]
    Service {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("highlight {range} on page {page} overlaps an existing highlight")]
    OverlappingHighlight { page: PageNumber, range: TextRange },

    #[error("highlight has no text to use as its note")]
    EmptyHighlight,

    #[error("page {target} is beyond the preview limit of {allowed} pages")]
    NavigationBlocked {
        target: PageNumber,
        allowed: PageNumber,
    },

    #[error("document content is unavailable")]
    ContentUnavailable,

    #[error("document has not finished loading")]
    NotReady,

    #[error("unknown note {0}")]
    UnknownNote(NoteId),

    #[error("no highlight is waiting for a note")]
    NoPendingHighlight,

    #[error("reader view was unmounted")]
    Unmounted,
}

impl ReaderError {
    pub(crate) fn service(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ReaderError::Service { operation, source }
    }

    /// Failures rejected locally before any service call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReaderError::OverlappingHighlight { .. } | ReaderError::EmptyHighlight
        )
    }
}
