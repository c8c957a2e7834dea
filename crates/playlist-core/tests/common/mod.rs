//! Shared helpers for playlist-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, Stream};
use playlist_core::{ByteSink, DocumentId, PlaylistError, Session, SourceResolver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Create a synthetic letter-size PDF whose pages carry a `Label` entry of
/// `{prefix}-{index}`.
pub fn create_synthetic_pdf(num_pages: usize, prefix: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for page_num in 0..num_pages {
        let content = format!("BT /F1 12 Tf 72 720 Td ({} page {}) Tj ET", prefix, page_num);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set("Label", Object::string_literal(format!("{}-{}", prefix, page_num)));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(num_pages as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            let label = doc.get_dictionary(id).unwrap().get(b"Label").unwrap();
            String::from_utf8_lossy(label.as_str().unwrap()).into_owned()
        })
        .collect()
}

/// In-memory resolver. When gated, each call signals `entered` and then
/// waits for `release` before answering.
#[derive(Default)]
pub struct MemoryResolver {
    documents: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
    gated: bool,
    pub entered: Notify,
    pub release: Notify,
}

impl MemoryResolver {
    pub fn new(documents: impl IntoIterator<Item = (&'static str, Vec<u8>)>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|(id, bytes)| (id.to_string(), bytes))
                .collect(),
            ..Self::default()
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceResolver for MemoryResolver {
    async fn resolve(&self, id: &DocumentId, session: &Session) -> Result<Vec<u8>, PlaylistError> {
        session.token()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.documents
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| PlaylistError::SinkError(format!("No such document: {}", id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Download { name: String, bytes: Vec<u8> },
    Upload { name: String, bytes: Vec<u8> },
}

#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSink {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ByteSink for RecordingSink {
    async fn download(&self, name: &str, bytes: &[u8]) -> Result<(), PlaylistError> {
        self.deliveries.lock().unwrap().push(Delivery::Download {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        session: &Session,
    ) -> Result<(), PlaylistError> {
        session.token()?;
        self.deliveries.lock().unwrap().push(Delivery::Upload {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
