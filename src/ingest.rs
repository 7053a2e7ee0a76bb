//! Ingestion dispatch.
//!
//! The single entry point for turning raw file bytes into a normalized
//! payload: size gate → format detection → per-format ingestor. Library
//! faults never escape; every failure is classified into
//! [`IngestionError`](crate::error::IngestionError) before it crosses this
//! boundary.

use log::debug;
use serde_json::json;

use crate::error::IngestionError;
use crate::format;
use crate::models::{Dataset, FormatKind, Ingested, Metadata};
use crate::{ingest_csv, ingest_docx, ingest_excel, ingest_image, ingest_pdf, ingest_text};

/// Ingest a file: detect its format and run the matching ingestor.
///
/// Returns the detected format alongside the payload and metadata so the
/// caller can record the source identity.
pub fn ingest(
    bytes: &[u8],
    filename: &str,
    max_bytes: u64,
) -> Result<(FormatKind, Ingested), IngestionError> {
    if bytes.is_empty() {
        return Err(IngestionError::Empty);
    }
    if bytes.len() as u64 > max_bytes {
        return Err(IngestionError::TooLarge {
            size: bytes.len() as u64,
            max: max_bytes,
        });
    }

    let kind = format::detect(filename, bytes)?;
    debug!("ingesting {} as {}", filename, kind.as_str());

    let ingested = match kind {
        FormatKind::Csv => ingest_csv::ingest(bytes)?,
        FormatKind::Excel => ingest_excel::ingest(bytes)?,
        FormatKind::Pdf => ingest_pdf::ingest(bytes)?,
        FormatKind::Docx => ingest_docx::ingest(bytes)?,
        FormatKind::Text => ingest_text::ingest(bytes)?,
        FormatKind::Image => ingest_image::ingest(bytes)?,
    };

    Ok((kind, ingested))
}

/// Decode text-like bytes: strict UTF-8 (with BOM sniffing, which also
/// covers UTF-16 BOMs), then Windows-1252 as the fallback. Bytes carrying
/// binary control characters are rejected as an encoding failure rather
/// than decoded into garbage.
pub(crate) fn decode_text(bytes: &[u8]) -> Result<String, IngestionError> {
    let (decoded, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return Ok(decoded.into_owned());
    }

    let binary = bytes
        .iter()
        .any(|&b| b < 0x09 || (b > 0x0d && b < 0x20) || b == 0x7f);
    if binary {
        return Err(IngestionError::Encoding(
            "not valid UTF-8 and content is not text-like".to_string(),
        ));
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(IngestionError::Encoding(
            "no fallback encoding could decode the content".to_string(),
        ));
    }
    Ok(decoded.into_owned())
}

/// Standard metadata block for tabular payloads.
pub(crate) fn table_metadata(dataset: &Dataset) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("rows".to_string(), json!(dataset.rows));
    meta.insert("columns".to_string(), json!(dataset.columns.len()));
    meta.insert(
        "column_names".to_string(),
        json!(dataset
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>()),
    );
    meta.insert(
        "column_types".to_string(),
        json!(dataset
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.semantic.as_str()))
            .collect::<std::collections::BTreeMap<_, _>>()),
    );
    meta.insert(
        "missing_values".to_string(),
        json!(dataset
            .missing_counts()
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>()),
    );
    meta
}

/// Standard metadata block for free-text payloads.
pub(crate) fn text_metadata(text: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("word_count".to_string(), json!(text.split_whitespace().count()));
    meta.insert("char_count".to_string(), json!(text.chars().count()));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        let err = ingest(b"", "data.csv", 1024).unwrap_err();
        assert!(matches!(err, IngestionError::Empty));
    }

    #[test]
    fn oversize_input_is_rejected() {
        let err = ingest(b"a,b\n1,2\n", "data.csv", 4).unwrap_err();
        assert!(matches!(err, IngestionError::TooLarge { size: 8, max: 4 }));
    }

    #[test]
    fn decode_utf8_passthrough() {
        assert_eq!(decode_text("héllo".as_bytes()).unwrap(), "héllo");
    }

    #[test]
    fn decode_latin1_fallback() {
        // "café" in Windows-1252: 0xe9 for é
        let bytes = [b'c', b'a', b'f', 0xe9];
        assert_eq!(decode_text(&bytes).unwrap(), "café");
    }

    #[test]
    fn decode_binary_is_encoding_error() {
        let bytes = [0xff, 0x00, 0x01, 0x02];
        let err = decode_text(&bytes).unwrap_err();
        assert!(matches!(err, IngestionError::Encoding(_)));
    }

    #[test]
    fn text_metadata_counts() {
        let meta = text_metadata("two words");
        assert_eq!(meta["word_count"], 2);
        assert_eq!(meta["char_count"], 9);
    }
}
