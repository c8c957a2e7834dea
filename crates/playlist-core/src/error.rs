use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Annotation targets page {page} but the document has {page_count} pages")]
    InvalidAnnotationTarget { page: usize, page_count: usize },

    #[error("No documents to merge")]
    EmptyMergeRequest,

    #[error("Page {page} does not exist in source {source_index} ({page_count} pages)")]
    PageIndexOutOfRange {
        source_index: usize,
        page: usize,
        page_count: usize,
    },

    #[error("Source {source_index} has an empty page selection")]
    EmptyPageSelection { source_index: usize },

    #[error("Failed to load source {source_index}: {reason}")]
    SourceLoadFailure { source_index: usize, reason: String },

    #[error("Invalid page list: {0}")]
    InvalidPageList(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Session expired at {0}")]
    SessionExpired(DateTime<Utc>),

    #[error("Sink rejected output: {0}")]
    SinkError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
