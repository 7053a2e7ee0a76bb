//! Plain-text ingestion.

use crate::error::IngestionError;
use crate::ingest::{decode_text, text_metadata};
use crate::models::{Ingested, Payload};

pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    let text = decode_text(bytes)?;
    if text.trim().is_empty() {
        return Err(IngestionError::Empty);
    }
    let metadata = text_metadata(&text);
    Ok(Ingested {
        payload: Payload::Text(text),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_text_with_counts() {
        let ingested = ingest("line one\nline two\n".as_bytes()).unwrap();
        assert_eq!(ingested.metadata["word_count"], 4);
        assert!(matches!(ingested.payload, Payload::Text(_)));
    }

    #[test]
    fn whitespace_only_is_empty() {
        let err = ingest(b"   \n\t\n").unwrap_err();
        assert!(matches!(err, IngestionError::Empty));
    }

    #[test]
    fn binary_bytes_are_encoding_error() {
        // invalid UTF-8 sequence plus NUL and control bytes
        let err = ingest(&[0xc3, 0x28, 0x00, 0x07]).unwrap_err();
        assert!(matches!(err, IngestionError::Encoding(_)));
    }

    #[test]
    fn utf16_with_bom_decodes() {
        // "hi" as UTF-16LE with BOM
        let bytes = [0xff, 0xfe, b'h', 0x00, b'i', 0x00];
        let ingested = ingest(&bytes).unwrap();
        match ingested.payload {
            Payload::Text(t) => assert_eq!(t, "hi"),
            Payload::Table(_) => panic!("expected text"),
        }
    }
}
