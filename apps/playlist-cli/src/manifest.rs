//! Playlist export manifest
//!
//! ```json
//! {
//!   "output_name": "sunday.pdf",
//!   "documents": [
//!     { "id": "opening.pdf", "pages": "2, 1" },
//!     { "id": "closing.pdf", "annotations": [ ... ] }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use playlist_core::{parse_page_list, Annotation, DocumentId, PlaylistEntry};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub output_name: Option<String>,
    pub documents: Vec<ManifestDocument>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestDocument {
    pub id: String,
    /// 1-based page list such as "3, 1-2"; omitted means every page
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid playlist manifest")
    }

    pub fn into_entries(self) -> Result<Vec<PlaylistEntry>> {
        self.documents
            .into_iter()
            .map(|doc| {
                let mut entry = PlaylistEntry::new(DocumentId::new(doc.id.clone()))
                    .with_annotations(doc.annotations.into());
                if let Some(pages) = doc.pages {
                    let pages = parse_page_list(&pages)
                        .with_context(|| format!("Bad page list for {}", doc.id))?;
                    entry = entry.with_pages(pages);
                }
                Ok(entry)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playlist_core::{Color, ScreenRect};

    #[test]
    fn test_manifest_to_entries() {
        let json = r##"{
            "documents": [
                { "id": "a.pdf", "pages": "2, 1" },
                { "id": "b.pdf", "annotations": [
                    { "type": "Crop", "page": 0,
                      "rect": { "x": 0.0, "y": 0.0, "width": 5.0, "height": 5.0 } }
                ] }
            ]
        }"##;
        let manifest = Manifest::from_json(json).unwrap();
        assert_eq!(manifest.output_name, None);

        let entries = manifest.into_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, DocumentId::new("a.pdf"));
        assert_eq!(entries[0].pages, Some(vec![1, 0]));
        assert!(entries[0].annotations.is_empty());
        assert_eq!(entries[1].pages, None);
        assert_eq!(entries[1].annotations.len(), 1);
    }

    #[test]
    fn test_bad_page_list_names_document() {
        let json = r#"{ "documents": [ { "id": "a.pdf", "pages": "0" } ] }"#;
        let err = Manifest::from_json(json).unwrap().into_entries().unwrap_err();
        assert!(err.to_string().contains("a.pdf"));
    }

    #[test]
    fn test_reverse_drag_rects_load_normalized() {
        let json = r##"{ "documents": [ { "id": "a.pdf", "annotations": [
            { "type": "Highlight", "page": 0, "color": "#FFFF00",
              "rect": { "x": 110.0, "y": 70.0, "width": -100.0, "height": -50.0 } }
        ] } ] }"##;
        let entries = Manifest::from_json(json).unwrap().into_entries().unwrap();
        assert_eq!(
            entries[0].annotations[0],
            Annotation::highlight(0, ScreenRect::new(10.0, 20.0, 100.0, 50.0), Color::YELLOW)
        );
    }
}
