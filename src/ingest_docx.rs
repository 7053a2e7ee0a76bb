//! DOCX ingestion.
//!
//! Pulls paragraph text out of `word/document.xml` and document properties
//! out of `docProps/core.xml`. Runs within a paragraph are concatenated;
//! paragraphs become lines.

use std::io::{Cursor, Read};

use serde_json::json;

use crate::error::IngestionError;
use crate::ingest::text_metadata;
use crate::models::{Ingested, Payload};

const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| IngestionError::Corrupt(format!("docx container: {}", e)))?;

    let doc_xml = read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| IngestionError::Corrupt("word/document.xml not found".to_string()))?;
    let text = extract_paragraphs(&doc_xml)?;

    let mut metadata = text_metadata(&text);
    metadata.insert(
        "paragraphs".to_string(),
        json!(text.lines().filter(|l| !l.is_empty()).count()),
    );

    if let Some(core_xml) = read_entry(&mut archive, "docProps/core.xml")? {
        if let Some(title) = core_property(&core_xml, b"title") {
            metadata.insert("title".to_string(), json!(title));
        }
        if let Some(creator) = core_property(&core_xml, b"creator") {
            metadata.insert("author".to_string(), json!(creator));
        }
    }

    Ok(Ingested {
        payload: Payload::Text(text),
        metadata,
    })
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, IngestionError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(IngestionError::Corrupt(format!("{}: {}", name, e))),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| IngestionError::Corrupt(format!("{}: {}", name, e)))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(IngestionError::Corrupt(format!(
            "ZIP entry {} exceeds size limit",
            name
        )));
    }
    Ok(Some(out))
}

/// Collect `<w:t>` runs, joining runs within a paragraph and separating
/// paragraphs with newlines.
fn extract_paragraphs(xml: &[u8]) -> Result<String, IngestionError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestionError::Corrupt(format!("document.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// A Dublin Core property value (`dc:title`, `dc:creator`) from core.xml.
fn core_property(xml: &[u8], local: &[u8]) -> Option<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == local {
                    inside = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if inside => {
                let v = te.unescape().unwrap_or_default().trim().to_string();
                return if v.is_empty() { None } else { Some(v) };
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == local {
                    inside = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_docx(document_xml: &str, core_xml: Option<&str>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(Cursor::new(&mut buf));
            zw.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zw.write_all(document_xml.as_bytes()).unwrap();
            if let Some(core) = core_xml {
                zw.start_file("docProps/core.xml", zip::write::SimpleFileOptions::default())
                    .unwrap();
                zw.write_all(core.as_bytes()).unwrap();
            }
            zw.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_paragraph_text_and_properties() {
        let doc = r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Quarterly </w:t></w:r><w:r><w:t>report</w:t></w:r></w:p><w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p></w:body></w:document>"#;
        let core = r#"<?xml version="1.0"?><cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Q3 Report</dc:title><dc:creator>Ana</dc:creator></cp:coreProperties>"#;

        let ingested = ingest(&build_docx(doc, Some(core))).unwrap();
        match &ingested.payload {
            Payload::Text(t) => {
                assert_eq!(t, "Quarterly report\nSecond paragraph");
            }
            Payload::Table(_) => panic!("expected text"),
        }
        assert_eq!(ingested.metadata["word_count"], 4);
        assert_eq!(ingested.metadata["paragraphs"], 2);
        assert_eq!(ingested.metadata["title"], "Q3 Report");
        assert_eq!(ingested.metadata["author"], "Ana");
    }

    #[test]
    fn missing_document_part_is_corrupt() {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(Cursor::new(&mut buf));
            zw.start_file("word/other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zw.write_all(b"<x/>").unwrap();
            zw.finish().unwrap();
        }
        let err = ingest(&buf).unwrap_err();
        assert!(matches!(err, IngestionError::Corrupt(_)));
    }

    #[test]
    fn non_zip_is_corrupt() {
        let err = ingest(b"plain bytes").unwrap_err();
        assert!(matches!(err, IngestionError::Corrupt(_)));
    }
}
