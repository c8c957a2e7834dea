//! Document loading and page geometry
//!
//! The pipeline only needs four things from a document: load it, count its
//! pages, serialize it, and ask a page for its height. [`DocumentLoader`] is
//! that seam; [`LopdfLoader`] is the implementation over `lopdf`.

use crate::error::PlaylistError;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Letter size, used when a page has no usable MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic `/Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

pub trait DocumentLoader {
    type Handle;

    fn load(&self, bytes: &[u8]) -> Result<Self::Handle, PlaylistError>;

    fn page_count(&self, doc: &Self::Handle) -> usize;

    fn save(&self, doc: &mut Self::Handle) -> Result<Vec<u8>, PlaylistError>;

    /// Height in PDF points of the zero-based page `index`.
    fn page_height(&self, doc: &Self::Handle, index: usize) -> Result<f64, PlaylistError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfLoader;

impl DocumentLoader for LopdfLoader {
    type Handle = Document;

    fn load(&self, bytes: &[u8]) -> Result<Document, PlaylistError> {
        Document::load_mem(bytes).map_err(|e| PlaylistError::ParseError(e.to_string()))
    }

    fn page_count(&self, doc: &Document) -> usize {
        doc.get_pages().len()
    }

    fn save(&self, doc: &mut Document) -> Result<Vec<u8>, PlaylistError> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| PlaylistError::OperationError(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }

    fn page_height(&self, doc: &Document, index: usize) -> Result<f64, PlaylistError> {
        let pages = page_ids(doc);
        let page_id = pages
            .get(index)
            .copied()
            .ok_or(PlaylistError::InvalidAnnotationTarget {
                page: index,
                page_count: pages.len(),
            })?;
        Ok(page_box(doc, page_id).height())
    }
}

/// Page object ids in document order, indexed from zero.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// A page's MediaBox in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl PageBox {
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

/// Effective MediaBox of a page, following inheritance through `/Parent`.
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let values = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| rect_values(doc, &obj))
        .unwrap_or(DEFAULT_MEDIA_BOX);
    let [x1, y1, x2, y2] = values;
    PageBox {
        llx: x1.min(x2),
        lly: y1.min(y2),
        urx: x1.max(x2),
        ury: y1.max(y2),
    }
}

/// Look up `key` on the page, then on each ancestor page-tree node.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Copy inherited attributes onto the page dictionary itself so the page
/// survives being moved to a different page tree.
pub(crate) fn materialize_inherited(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<(), PlaylistError> {
    let mut found = Vec::new();
    for key in INHERITABLE_KEYS {
        let own = doc
            .get_dictionary(page_id)
            .map(|dict| dict.has(key))
            .unwrap_or(false);
        if own {
            continue;
        }
        if let Some(value) = inherited_attribute(doc, page_id, key) {
            found.push((key, value));
        }
    }

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| PlaylistError::OperationError(format!("Invalid page object: {}", e)))?;
    for (key, value) in found {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

/// Resolve an object that may be an indirect reference into a dictionary copy.
pub(crate) fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

fn rect_values(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = match obj {
        Object::Array(array) => array,
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(item)?;
    }
    Some(values)
}
