//! Image ingestion via optical character recognition.
//!
//! OCR is delegated to an external `tesseract` binary discovered on PATH.
//! An absent engine is a distinct, reportable failure
//! ([`IngestionError::MissingDependency`]); callers must be able to tell
//! "OCR unavailable" apart from "image contains no readable text", which is
//! a successful ingestion with empty text.

use std::io::Write;
use std::process::Command;

use log::debug;
use serde_json::json;

use crate::error::IngestionError;
use crate::ingest::text_metadata;
use crate::models::{Ingested, Payload};

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    let format = if bytes.starts_with(&PNG_MAGIC) {
        "png"
    } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        "jpeg"
    } else {
        return Err(IngestionError::Corrupt(
            "not a PNG or JPEG image".to_string(),
        ));
    };

    let engine = which::which("tesseract").map_err(|_| {
        IngestionError::MissingDependency(
            "tesseract OCR engine not found on PATH".to_string(),
        )
    })?;

    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{}", format))
        .tempfile()
        .map_err(|e| IngestionError::MissingDependency(format!("OCR scratch file: {}", e)))?;
    file.write_all(bytes)
        .map_err(|e| IngestionError::MissingDependency(format!("OCR scratch file: {}", e)))?;

    let output = Command::new(&engine)
        .arg(file.path())
        .arg("stdout")
        .output()
        .map_err(|e| IngestionError::MissingDependency(format!("tesseract: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestionError::Corrupt(format!(
            "OCR failed: {}",
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!("ocr: {} format, {} chars recognized", format, text.len());

    let mut metadata = text_metadata(&text);
    metadata.insert("image_format".to_string(), json!(format));
    metadata.insert("ocr_engine".to_string(), json!("tesseract"));

    Ok(Ingested {
        payload: Payload::Text(text),
        metadata,
    })
}
