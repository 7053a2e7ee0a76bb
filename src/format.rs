//! File format detection.
//!
//! Extension match first; when the extension is missing or unknown, fall
//! back to content sniffing (magic bytes, ZIP entry probing for OOXML).
//! Nothing past this boundary sees an unclassified file.

use std::io::Cursor;

use crate::error::IngestionError;
use crate::models::FormatKind;

/// OLE compound-file magic, i.e. legacy Office binaries (`.xls`, `.doc`).
const OLE_MAGIC: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Detect the format of a file from its name and content.
///
/// The extension wins when it is recognized; otherwise the leading bytes
/// decide. Returns `UnsupportedFormat` when neither matches.
pub fn detect(filename: &str, bytes: &[u8]) -> Result<FormatKind, IngestionError> {
    if let Some(kind) = detect_by_extension(filename) {
        return Ok(kind);
    }
    if let Some(kind) = detect_by_content(bytes) {
        return Ok(kind);
    }
    Err(IngestionError::UnsupportedFormat(filename.to_string()))
}

fn detect_by_extension(filename: &str) -> Option<FormatKind> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(FormatKind::Csv),
        "xlsx" | "xls" => Some(FormatKind::Excel),
        "pdf" => Some(FormatKind::Pdf),
        "docx" => Some(FormatKind::Docx),
        "txt" => Some(FormatKind::Text),
        "png" | "jpg" | "jpeg" => Some(FormatKind::Image),
        _ => None,
    }
}

fn detect_by_content(bytes: &[u8]) -> Option<FormatKind> {
    if bytes.starts_with(b"%PDF-") {
        return Some(FormatKind::Pdf);
    }
    if bytes.starts_with(&PNG_MAGIC) || bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        return Some(FormatKind::Image);
    }
    if bytes.starts_with(&OLE_MAGIC) {
        // Legacy workbook container; the Excel ingestor reports the
        // subformat as unsupported.
        return Some(FormatKind::Excel);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return sniff_ooxml(bytes);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        let printable = !text.is_empty()
            && text
                .chars()
                .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'));
        if printable {
            return Some(FormatKind::Text);
        }
    }
    None
}

/// Distinguish xlsx from docx by the entries inside the ZIP container.
fn sniff_ooxml(bytes: &[u8]) -> Option<FormatKind> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut saw_sheet = false;
    let mut saw_document = false;
    for name in archive.file_names() {
        if name.starts_with("xl/") {
            saw_sheet = true;
        } else if name.starts_with("word/") {
            saw_document = true;
        }
    }
    match (saw_sheet, saw_document) {
        (true, false) => Some(FormatKind::Excel),
        (false, true) => Some(FormatKind::Docx),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_entry(entry: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(Cursor::new(&mut buf));
            zw.start_file(entry, zip::write::SimpleFileOptions::default())
                .unwrap();
            zw.write_all(b"<x/>").unwrap();
            zw.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extension_wins() {
        assert_eq!(detect("sales.csv", b"a,b\n1,2").unwrap(), FormatKind::Csv);
        assert_eq!(detect("report.PDF", b"").unwrap(), FormatKind::Pdf);
        assert_eq!(detect("book.xls", b"").unwrap(), FormatKind::Excel);
        assert_eq!(detect("scan.JPeG", b"").unwrap(), FormatKind::Image);
    }

    #[test]
    fn pdf_sniffed_without_extension() {
        assert_eq!(detect("upload", b"%PDF-1.4 ...").unwrap(), FormatKind::Pdf);
    }

    #[test]
    fn ooxml_sniffed_by_zip_entries() {
        let xlsx = zip_with_entry("xl/workbook.xml");
        assert_eq!(detect("upload", &xlsx).unwrap(), FormatKind::Excel);

        let docx = zip_with_entry("word/document.xml");
        assert_eq!(detect("upload", &docx).unwrap(), FormatKind::Docx);
    }

    #[test]
    fn plain_utf8_sniffed_as_text() {
        assert_eq!(detect("notes", b"hello world").unwrap(), FormatKind::Text);
    }

    #[test]
    fn unknown_is_unsupported() {
        let err = detect("blob.parquet", &[0x00, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("blob.parquet"));
    }
}
