//! Annotation and merge core for PDF playlists
//!
//! A playlist is an ordered list of PDF documents. This crate covers what
//! happens to their bytes:
//! - `capture`: turn pointer gestures into [`Annotation`]s with undo/redo
//! - `coords`: map screen coordinates to PDF points
//! - `compositor`: burn annotations into page content
//! - `merge`: concatenate documents, optionally with per-source page filters
//! - `selection`: track which pages of each source go into the next merge
//! - `pipeline`: resolve, compose, merge, and deliver off the caller's thread

pub mod annotation;
pub mod capture;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod document;
pub mod error;
pub mod history;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod selection;
pub mod source;

pub use annotation::{
    annotations_from_json, annotations_to_json, Annotation, AnnotationKind, Color, Point,
    ScreenRect,
};
pub use capture::{CaptureEngine, CommitOutcome, EditorState, EmptyGesture, StrokeHandle, Tool};
pub use compositor::{apply_annotations, apply_to_bytes};
pub use config::{CaptureConfig, Config, ExportConfig};
pub use coords::{DocRect, RenderScale};
pub use document::{DocumentLoader, LopdfLoader};
pub use error::PlaylistError;
pub use history::{AnnotationHistory, Snapshot};
pub use merge::{merge_documents, MergeSource};
pub use pipeline::{ExportJob, ExportOutcome, ExportPipeline, PlaylistEntry};
pub use report::{ProcessMetrics, ProcessResult};
pub use selection::{PageSelection, SelectedPages};
pub use source::{
    ByteSink, DocumentId, ExportDecision, FileResolver, LocalFileSink, Session, SourceResolver,
};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, PlaylistError> {
    let loader = LopdfLoader;
    let doc = loader.load(bytes)?;
    Ok(loader.page_count(&doc))
}

/// Upper bound on the number of pages a page list may expand to.
pub const MAX_PAGE_LIST_LEN: usize = 100_000;

/// Parse a page list like "3, 1-2, 3" into zero-based indices.
///
/// Input pages are 1-based as displayed. Order and repeats are kept, so the
/// result can be handed straight to [`MergeSource::with_pages`]. Lists that
/// expand past [`MAX_PAGE_LIST_LEN`] pages are rejected.
pub fn parse_page_list(input: &str) -> Result<Vec<usize>, PlaylistError> {
    let mut pages = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start = parse_page_number(start)?;
            let end = parse_page_number(end)?;
            if start > end {
                return Err(PlaylistError::InvalidPageList(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }
            check_page_list_len(pages.len(), end - start + 1)?;
            pages.extend((start..=end).map(|page| page - 1));
        } else {
            check_page_list_len(pages.len(), 1)?;
            pages.push(parse_page_number(part)? - 1);
        }
    }

    if pages.is_empty() {
        return Err(PlaylistError::InvalidPageList("No pages given".to_string()));
    }
    Ok(pages)
}

fn check_page_list_len(current: usize, adding: usize) -> Result<(), PlaylistError> {
    if current.saturating_add(adding) > MAX_PAGE_LIST_LEN {
        return Err(PlaylistError::InvalidPageList(format!(
            "More than {} pages",
            MAX_PAGE_LIST_LEN
        )));
    }
    Ok(())
}

fn parse_page_number(value: &str) -> Result<usize, PlaylistError> {
    let value = value.trim();
    match value.parse::<usize>() {
        Ok(0) | Err(_) => Err(PlaylistError::InvalidPageList(format!(
            "Invalid page: {}",
            value
        ))),
        Ok(page) => Ok(page),
    }
}
