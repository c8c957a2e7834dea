//! PDF Merge algorithm
//!
//! Concatenates pages from several PDFs, optionally restricted to an ordered
//! subset of each source's pages.

use crate::document::{materialize_inherited, page_ids};
use crate::error::PlaylistError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One input to [`merge_documents`].
#[derive(Debug, Clone)]
pub struct MergeSource {
    pub bytes: Arc<[u8]>,
    /// Zero-based pages to take, in output order. `None` takes every page in
    /// natural order.
    pub pages: Option<Vec<usize>>,
}

impl MergeSource {
    pub fn all(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            pages: None,
        }
    }

    pub fn with_pages(bytes: impl Into<Arc<[u8]>>, pages: Vec<usize>) -> Self {
        Self {
            bytes: bytes.into(),
            pages: Some(pages),
        }
    }
}

/// Merge sources into one PDF
///
/// The algorithm:
/// 1. If empty, return error
/// 2. If a single unfiltered source, return its bytes as-is
/// 3. Create a new destination document with an empty page tree
/// 4. For each source, in order:
///    a. Resolve and validate its page list
///    b. Copy inherited page attributes onto the pages
///    c. Import all objects with IDs shifted past the destination's
///    d. Append the selected pages (a repeated page gets its own copy)
/// 5. Drop objects no page reaches, compress, and serialize
///
/// Any error aborts the merge; no partial output is produced.
pub fn merge_documents(sources: &[MergeSource]) -> Result<Vec<u8>, PlaylistError> {
    let single = match sources {
        [] => return Err(PlaylistError::EmptyMergeRequest),
        [only] if only.pages.is_none() => Some(only),
        _ => None,
    };
    if let Some(only) = single {
        tracing::debug!("single unfiltered source, returning input unchanged");
        return Ok(only.bytes.to_vec());
    }

    let mut dest = Document::with_version("1.5");
    let pages_id = dest.new_object_id();
    let mut kids: Vec<ObjectId> = Vec::new();

    for (index, source) in sources.iter().enumerate() {
        let mut doc =
            Document::load_mem(&source.bytes).map_err(|e| PlaylistError::SourceLoadFailure {
                source_index: index,
                reason: e.to_string(),
            })?;

        let source_pages = page_ids(&doc);
        let selected = resolve_pages(index, source.pages.as_deref(), source_pages.len())?;

        for &page in &selected {
            materialize_inherited(&mut doc, source_pages[page])?;
        }

        let id_offset = dest.max_id;
        let mut imported = BTreeMap::new();
        for (old_id, object) in std::mem::take(&mut doc.objects) {
            imported.insert(shift_id(old_id, id_offset), remap_object_refs(object, id_offset));
        }
        dest.objects.extend(imported);
        dest.max_id = dest.max_id.max(doc.max_id + id_offset);

        let mut used = HashSet::new();
        for &page in &selected {
            let page_id = shift_id(source_pages[page], id_offset);
            let page_id = if used.insert(page_id) {
                page_id
            } else {
                let copy = dest
                    .get_dictionary(page_id)
                    .map_err(|e| {
                        PlaylistError::OperationError(format!("Invalid page object: {}", e))
                    })?
                    .clone();
                dest.add_object(Object::Dictionary(copy))
            };
            let page = dest
                .get_dictionary_mut(page_id)
                .map_err(|e| PlaylistError::OperationError(format!("Invalid page object: {}", e)))?;
            page.set("Parent", Object::Reference(pages_id));
            kids.push(page_id);
        }

        tracing::debug!(source = index, pages = selected.len(), "imported source");
    }

    let page_count = kids.len();
    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_count as i64));
    pages.set(
        "Kids",
        Object::Array(kids.into_iter().map(Object::Reference).collect()),
    );
    dest.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = dest.add_object(Object::Dictionary(catalog));
    dest.trailer.set("Root", Object::Reference(catalog_id));

    dest.prune_objects();
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| PlaylistError::OperationError(format!("Failed to save merged PDF: {}", e)))?;

    tracing::info!(
        sources = sources.len(),
        pages = page_count,
        bytes = buffer.len(),
        "merged documents"
    );
    Ok(buffer)
}

/// Explicit page lists are validated and kept in caller order; `None` means
/// every page in natural order.
fn resolve_pages(
    source_index: usize,
    pages: Option<&[usize]>,
    page_count: usize,
) -> Result<Vec<usize>, PlaylistError> {
    match pages {
        None => Ok((0..page_count).collect()),
        Some([]) => Err(PlaylistError::EmptyPageSelection { source_index }),
        Some(pages) => {
            if let Some(&page) = pages.iter().find(|&&p| p >= page_count) {
                return Err(PlaylistError::PageIndexOutOfRange {
                    source_index,
                    page,
                    page_count,
                });
            }
            Ok(pages.to_vec())
        }
    }
}

fn shift_id(id: ObjectId, offset: u32) -> ObjectId {
    (id.0 + offset, id.1)
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference(shift_id(id, offset)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_pdf, create_test_pdf_with_inherited_box, page_labels};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_empty_fails() {
        let result = merge_documents(&[]);
        assert!(matches!(result, Err(PlaylistError::EmptyMergeRequest)));
    }

    #[test]
    fn test_merge_single_unfiltered_source_is_identity() {
        let pdf = create_test_pdf(2, "Single");
        let result = merge_documents(&[MergeSource::all(pdf.clone())]).unwrap();
        assert_eq!(result, pdf);
    }

    #[test]
    fn test_merge_single_filtered_source_is_rebuilt() {
        let pdf = create_test_pdf(3, "S");
        let result = merge_documents(&[MergeSource::with_pages(pdf, vec![1])]).unwrap();
        assert_eq!(page_labels(&result), vec!["S-1"]);
    }

    #[test]
    fn test_merge_two_documents_in_source_order() {
        let a = create_test_pdf(3, "A");
        let b = create_test_pdf(2, "B");
        let merged = merge_documents(&[MergeSource::all(a), MergeSource::all(b)]).unwrap();
        assert_eq!(page_labels(&merged), vec!["A-0", "A-1", "A-2", "B-0", "B-1"]);
    }

    #[test]
    fn test_filter_order_is_respected() {
        let a = create_test_pdf(3, "A");
        let b = create_test_pdf(1, "B");
        let merged = merge_documents(&[
            MergeSource::with_pages(a, vec![2, 0]),
            MergeSource::all(b),
        ])
        .unwrap();
        assert_eq!(page_labels(&merged), vec!["A-2", "A-0", "B-0"]);
    }

    #[test]
    fn test_repeated_page_is_copied() {
        let a = create_test_pdf(2, "A");
        let merged = merge_documents(&[MergeSource::with_pages(a, vec![1, 1, 0])]).unwrap();
        assert_eq!(page_labels(&merged), vec!["A-1", "A-1", "A-0"]);
    }

    #[test]
    fn test_out_of_range_filter_fails_whole_merge() {
        let a = create_test_pdf(3, "A");
        let b = create_test_pdf(2, "B");
        let err = merge_documents(&[MergeSource::all(a), MergeSource::with_pages(b, vec![0, 2])])
            .unwrap_err();
        assert!(matches!(
            err,
            PlaylistError::PageIndexOutOfRange {
                source_index: 1,
                page: 2,
                page_count: 2
            }
        ));
    }

    #[test]
    fn test_empty_filter_is_rejected() {
        let a = create_test_pdf(3, "A");
        let b = create_test_pdf(1, "B");
        let err = merge_documents(&[MergeSource::with_pages(a, vec![]), MergeSource::all(b)])
            .unwrap_err();
        assert!(matches!(err, PlaylistError::EmptyPageSelection { source_index: 0 }));
    }

    #[test]
    fn test_unparseable_source_reports_index() {
        let a = create_test_pdf(1, "A");
        let err = merge_documents(&[MergeSource::all(a), MergeSource::all(b"garbage".to_vec())])
            .unwrap_err();
        assert!(matches!(err, PlaylistError::SourceLoadFailure { source_index: 1, .. }));
    }

    #[test]
    fn test_merge_handles_different_sizes() {
        let merged = merge_documents(&[
            MergeSource::all(create_test_pdf(10, "Large")),
            MergeSource::all(create_test_pdf(1, "Small")),
            MergeSource::all(create_test_pdf(5, "Medium")),
        ])
        .unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 16);
    }

    #[test]
    fn test_inherited_media_box_survives_merge() {
        let a = create_test_pdf_with_inherited_box(2, 300.0, 400.0);
        let b = create_test_pdf(1, "B");
        let merged = merge_documents(&[MergeSource::all(a), MergeSource::all(b)]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(crate::document::page_box(&doc, ids[0]).height(), 400.0);
        assert_eq!(crate::document::page_box(&doc, ids[2]).height(), 792.0);
    }

    #[test]
    fn test_unselected_pages_are_pruned() {
        let a = create_test_pdf(4, "A");
        let b = create_test_pdf(1, "B");
        let merged =
            merge_documents(&[MergeSource::with_pages(a, vec![3]), MergeSource::all(b)]).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        let page_objects = doc
            .objects
            .values()
            .filter(|obj| {
                obj.as_dict()
                    .ok()
                    .and_then(|d| d.get(b"Type").ok())
                    .and_then(|t| t.as_name().ok())
                    == Some(b"Page".as_slice())
            })
            .count();
        assert_eq!(page_objects, 2);
    }
}
