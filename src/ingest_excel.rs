//! Excel (xlsx) ingestion.
//!
//! Reads the OOXML container directly: shared strings, sheet names from the
//! workbook part, and the primary worksheet's cell grid. The first sheet in
//! part order is the primary one; remaining sheets are recorded in metadata
//! only, never merged. Legacy binary `.xls` workbooks are reported as an
//! unsupported subformat.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use serde_json::json;

use crate::error::IngestionError;
use crate::ingest::table_metadata;
use crate::models::{Dataset, Ingested, Payload};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const OLE_MAGIC: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    if bytes.starts_with(&OLE_MAGIC) {
        return Err(IngestionError::UnsupportedSubformat(
            "legacy binary .xls workbook; save as .xlsx".to_string(),
        ));
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| IngestionError::Corrupt(format!("xlsx container: {}", e)))?;

    let sheet_names = read_sheet_names(&mut archive)?;
    let shared_strings = read_shared_strings(&mut archive)?;

    let mut worksheet_parts: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    worksheet_parts.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let primary_part = worksheet_parts
        .first()
        .ok_or_else(|| IngestionError::Corrupt("xlsx has no worksheets".to_string()))?
        .clone();

    let sheet_xml = read_zip_entry_bounded(&mut archive, &primary_part)?;
    let grid = parse_sheet_grid(&sheet_xml, &shared_strings)?;

    let (headers, rows) = grid_to_rows(grid)?;
    let dataset = Dataset::from_rows(headers, rows);

    let mut metadata = table_metadata(&dataset);
    metadata.insert("sheet_count".to_string(), json!(worksheet_parts.len()));
    if !sheet_names.is_empty() {
        metadata.insert("primary_sheet".to_string(), json!(sheet_names[0].clone()));
        metadata.insert("sheet_names".to_string(), json!(sheet_names));
    }

    Ok(Ingested {
        payload: Payload::Table(dataset),
        metadata,
    })
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, IngestionError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| IngestionError::Corrupt(format!("{}: {}", name, e)))?;
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
    Ok(out)
}

/// Sheet display names from `xl/workbook.xml`, in workbook order.
fn read_sheet_names(archive: &mut Archive<'_>) -> Result<Vec<String>, IngestionError> {
    if archive.by_name("xl/workbook.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
    let mut names = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            if let Ok(v) = attr.unescape_value() {
                                names.push(v.into_owned());
                            }
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestionError::Corrupt(format!("workbook.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// The shared-strings table. Absent when the workbook stores no strings.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, IngestionError> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestionError::Corrupt(format!("sharedStrings.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Literal,
}

/// Parse a worksheet part into a sparse `(row, col) → value` grid.
fn parse_sheet_grid(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<BTreeMap<(usize, usize), String>, IngestionError> {
    let mut grid = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut current: Option<((usize, usize), CellKind)> = None;
    let mut in_v = false;
    let mut in_inline_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    current = parse_cell_open(&e)?;
                }
                b"v" => in_v = true,
                b"t" => {
                    if matches!(current, Some((_, CellKind::Inline))) {
                        in_inline_t = true;
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v || in_inline_t => {
                if let Some((coord, kind)) = current {
                    let raw = te.unescape().unwrap_or_default().into_owned();
                    let value = match kind {
                        CellKind::Shared => raw
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned()),
                        CellKind::Inline | CellKind::Literal => Some(raw),
                    };
                    if let Some(v) = value {
                        grid.insert(coord, v);
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => current = None,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(IngestionError::Corrupt(format!("worksheet xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(grid)
}

fn parse_cell_open(
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<Option<((usize, usize), CellKind)>, IngestionError> {
    let mut coord = None;
    let mut kind = CellKind::Literal;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => {
                let r = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
                coord = Some(parse_cell_ref(&r)?);
            }
            b"t" => {
                kind = match attr.value.as_ref() {
                    b"s" => CellKind::Shared,
                    b"inlineStr" => CellKind::Inline,
                    _ => CellKind::Literal,
                };
            }
            _ => {}
        }
    }
    Ok(coord.map(|c| (c, kind)))
}

/// Decode an A1-style cell reference into zero-based `(row, col)`.
fn parse_cell_ref(reference: &str) -> Result<(usize, usize), IngestionError> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits = &reference[letters.len()..];

    if letters.is_empty() || digits.is_empty() {
        return Err(IngestionError::Corrupt(format!(
            "bad cell reference: {}",
            reference
        )));
    }

    let mut col = 0usize;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits
        .parse()
        .map_err(|_| IngestionError::Corrupt(format!("bad cell reference: {}", reference)))?;
    if row == 0 {
        return Err(IngestionError::Corrupt(format!(
            "bad cell reference: {}",
            reference
        )));
    }
    Ok((row - 1, col - 1))
}

/// Split the sparse grid into a header row and dense data rows.
fn grid_to_rows(
    grid: BTreeMap<(usize, usize), String>,
) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), IngestionError> {
    if grid.is_empty() {
        return Err(IngestionError::Empty);
    }
    let max_row = grid.keys().map(|(r, _)| *r).max().unwrap_or(0);
    let max_col = grid.keys().map(|(_, c)| *c).max().unwrap_or(0);

    let headers: Vec<String> = (0..=max_col)
        .map(|c| {
            grid.get(&(0, c))
                .cloned()
                .unwrap_or_else(|| format!("column_{}", c + 1))
        })
        .collect();

    if max_row == 0 {
        return Err(IngestionError::Empty);
    }

    let rows: Vec<Vec<Option<String>>> = (1..=max_row)
        .map(|r| (0..=max_col).map(|c| grid.get(&(r, c)).cloned()).collect())
        .collect();

    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WORKBOOK_XML: &str = r#"<?xml version="1.0"?><workbook><sheets><sheet name="Sales" sheetId="1"/><sheet name="Notes" sheetId="2"/></sheets></workbook>"#;
    const SHARED_XML: &str = r#"<?xml version="1.0"?><sst><si><t>region</t></si><si><t>amount</t></si><si><t>north</t></si><si><t>south</t></si></sst>"#;
    const SHEET1_XML: &str = r#"<?xml version="1.0"?><worksheet><sheetData>
        <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
        <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>10</v></c></row>
        <row r="3"><c r="A3" t="s"><v>3</v></c><c r="B3"><v>20</v></c></row>
        <row r="4"><c r="A4" t="inlineStr"><is><t>north</t></is></c></row>
        </sheetData></worksheet>"#;

    fn build_xlsx(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zw = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, content) in parts {
                zw.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zw.write_all(content.as_bytes()).unwrap();
            }
            zw.finish().unwrap();
        }
        buf
    }

    #[test]
    fn parses_primary_sheet_grid() {
        let bytes = build_xlsx(&[
            ("xl/workbook.xml", WORKBOOK_XML),
            ("xl/sharedStrings.xml", SHARED_XML),
            ("xl/worksheets/sheet1.xml", SHEET1_XML),
            ("xl/worksheets/sheet2.xml", r#"<worksheet><sheetData/></worksheet>"#),
        ]);
        let ingested = ingest(&bytes).unwrap();
        let ds = match &ingested.payload {
            Payload::Table(ds) => ds,
            Payload::Text(_) => panic!("expected a table"),
        };
        assert_eq!(ds.rows, 3);
        assert_eq!(ds.columns.len(), 2);
        assert_eq!(ds.columns[0].name, "region");
        assert_eq!(ds.columns[1].name, "amount");
        // inline string row has no amount cell
        assert_eq!(ds.columns[1].missing_count(), 1);
        assert_eq!(ingested.metadata["primary_sheet"], "Sales");
        assert_eq!(ingested.metadata["sheet_count"], 2);
        assert_eq!(
            ingested.metadata["sheet_names"],
            serde_json::json!(["Sales", "Notes"])
        );
    }

    #[test]
    fn legacy_xls_is_unsupported_subformat() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        let err = ingest(&bytes).unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedSubformat(_)));
    }

    #[test]
    fn non_zip_is_corrupt() {
        let err = ingest(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, IngestionError::Corrupt(_)));
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let bytes = build_xlsx(&[(
            "xl/worksheets/sheet1.xml",
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>only</t></is></c></row></sheetData></worksheet>"#,
        )]);
        let err = ingest(&bytes).unwrap_err();
        assert!(matches!(err, IngestionError::Empty));
    }

    #[test]
    fn cell_ref_decoding() {
        assert_eq!(parse_cell_ref("A1").unwrap(), (0, 0));
        assert_eq!(parse_cell_ref("B3").unwrap(), (2, 1));
        assert_eq!(parse_cell_ref("AA10").unwrap(), (9, 26));
        assert!(parse_cell_ref("42").is_err());
        assert!(parse_cell_ref("XY").is_err());
    }
}
