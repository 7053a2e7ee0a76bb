//! PDF ingestion.
//!
//! Text comes from `pdf-extract`; page count and document info (title,
//! author) come from `lopdf`, which tolerates a wider range of files than
//! the text extractor does.

use log::debug;
use serde_json::json;

use crate::error::IngestionError;
use crate::ingest::text_metadata;
use crate::models::{Ingested, Payload};

pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| IngestionError::Corrupt(format!("PDF structure: {}", e)))?;

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| IngestionError::Corrupt(format!("PDF text: {}", e)))?;
    let text = text.trim().to_string();

    let mut metadata = text_metadata(&text);
    metadata.insert("pages".to_string(), json!(doc.get_pages().len()));
    if let Some(title) = info_string(&doc, b"Title") {
        metadata.insert("title".to_string(), json!(title));
    }
    if let Some(author) = info_string(&doc, b"Author") {
        metadata.insert("author".to_string(), json!(author));
    }
    debug!("pdf: {} pages, {} chars", doc.get_pages().len(), text.len());

    Ok(Ingested {
        payload: Payload::Text(text),
        metadata,
    })
}

/// A string entry from the trailer's Info dictionary, if present.
fn info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info {
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
        lopdf::Object::Dictionary(d) => d,
        _ => return None,
    };
    let value = dict.get(key).ok()?;
    let raw = match value {
        lopdf::Object::String(bytes, _) => bytes.as_slice(),
        _ => return None,
    };
    let s = String::from_utf8_lossy(raw).trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
