//! Core data models used throughout datalyst.
//!
//! These types represent the source file, the normalized payload (tabular
//! dataset or extracted text), and the session that flows through the
//! ingestion and Q&A pipeline.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Descriptive key/value facts about a source (row counts, page counts, ...).
///
/// A `BTreeMap` so that iteration order, and therefore the derived context
/// string, is stable across runs.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Supported file formats, detected from extension or content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Csv,
    Excel,
    Pdf,
    Docx,
    Text,
    Image,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Csv => "csv",
            FormatKind::Excel => "excel",
            FormatKind::Pdf => "pdf",
            FormatKind::Docx => "docx",
            FormatKind::Text => "text",
            FormatKind::Image => "image",
        }
    }
}

/// Inferred semantic type of a column, from value samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
    Text,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Datetime => "datetime",
            SemanticType::Text => "text",
        }
    }
}

/// A named column with its inferred type and raw cell values.
///
/// Cells are kept as strings; `None` marks a missing value. Numeric parsing
/// happens where the numbers are consumed (context building).
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub semantic: SemanticType,
    pub values: Vec<Option<String>>,
}

impl Column {
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Non-missing values parsed as f64, in row order.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .flatten()
            .filter_map(|v| v.trim().parse::<f64>().ok())
            .collect()
    }
}

/// A tabular dataset: equally sized named columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: usize,
}

impl Dataset {
    /// Build a dataset from a header row and data rows, inferring a semantic
    /// type per column. Rows shorter than the header are padded with missing
    /// cells; longer rows are truncated.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let height = rows.len();

        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column {
                name,
                semantic: SemanticType::Text,
                values: Vec::with_capacity(height),
            })
            .collect();

        for row in rows {
            for (idx, col) in columns.iter_mut().enumerate() {
                let cell = row.get(idx).cloned().flatten().and_then(normalize_cell);
                col.values.push(cell);
            }
        }
        debug_assert!(columns.iter().all(|c| c.values.len() == height));

        for col in &mut columns {
            col.semantic = infer_semantic(&col.values);
        }

        Dataset {
            columns,
            rows: height,
        }
    }

    /// Per-column missing-value counts, in column order.
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.missing_count()))
            .collect()
    }

    /// The first `n` rows rendered back to display cells.
    pub fn sample_rows(&self, n: usize) -> Vec<Vec<String>> {
        let take = n.min(self.rows);
        (0..take)
            .map(|r| {
                self.columns
                    .iter()
                    .map(|c| c.values[r].clone().unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Treat empty cells and common NA spellings as missing.
fn normalize_cell(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "na" | "n/a" | "null" | "nan" | "none" => None,
        _ => Some(trimmed.to_string()),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn parses_as_date(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
}

/// Infer a column's semantic type from its non-missing values.
///
/// All numeric → `Numeric`; all date-like → `Datetime`; few distinct values
/// with repeats → `Categorical`; anything else → `Text`.
fn infer_semantic(values: &[Option<String>]) -> SemanticType {
    let present: Vec<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
    if present.is_empty() {
        return SemanticType::Text;
    }

    if present.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
        return SemanticType::Numeric;
    }

    if present.iter().all(|v| parses_as_date(v)) {
        return SemanticType::Datetime;
    }

    let distinct: BTreeSet<&str> = present.iter().copied().collect();
    if distinct.len() <= 12 && distinct.len() < present.len() {
        return SemanticType::Categorical;
    }

    SemanticType::Text
}

/// The normalized content of an ingested file: a table or free text,
/// never both.
#[derive(Debug, Clone)]
pub enum Payload {
    Table(Dataset),
    Text(String),
}

/// A successful ingestion: the payload plus descriptive metadata.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub payload: Payload,
    pub metadata: Metadata,
}

/// Identity of the loaded file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub name: String,
    pub kind: FormatKind,
    pub size: u64,
    pub sha256: String,
}

impl SourceFile {
    pub fn new(name: &str, kind: FormatKind, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        SourceFile {
            name: name.to_string(),
            kind,
            size: bytes.len() as u64,
            sha256: format!("{:x}", hasher.finalize()),
        }
    }
}

/// The single active analysis context: one loaded file, its payload,
/// metadata, and the derived context string.
///
/// Replaced wholesale on the next successful load; never partially
/// populated.
#[derive(Debug, Clone)]
pub struct Session {
    pub source: SourceFile,
    pub payload: Payload,
    pub metadata: Metadata,
    pub context: String,
}

impl Session {
    pub fn dataset(&self) -> Option<&Dataset> {
        match &self.payload {
            Payload::Table(ds) => Some(ds),
            Payload::Text(_) => None,
        }
    }

    pub fn extracted_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Table(_) => None,
            Payload::Text(t) => Some(t.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(vals: &[&str]) -> Vec<Option<String>> {
        vals.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn numeric_column_inferred() {
        assert_eq!(
            infer_semantic(&cells(&["1", "2.5", "-3"])),
            SemanticType::Numeric
        );
    }

    #[test]
    fn datetime_column_inferred() {
        assert_eq!(
            infer_semantic(&cells(&["2024-01-01", "2024-02-15"])),
            SemanticType::Datetime
        );
        assert_eq!(
            infer_semantic(&cells(&["2024-01-01 10:30:00"])),
            SemanticType::Datetime
        );
    }

    #[test]
    fn categorical_needs_repeats() {
        assert_eq!(
            infer_semantic(&cells(&["north", "south", "north"])),
            SemanticType::Categorical
        );
        // all distinct → free text
        assert_eq!(
            infer_semantic(&cells(&["alice", "bob", "carol"])),
            SemanticType::Text
        );
    }

    #[test]
    fn all_missing_defaults_to_text() {
        assert_eq!(infer_semantic(&[None, None]), SemanticType::Text);
    }

    #[test]
    fn from_rows_normalizes_missing_and_pads() {
        let ds = Dataset::from_rows(
            vec!["date".into(), "sales".into()],
            vec![
                vec![Some("2024-01-01".into()), Some("10".into())],
                vec![Some("2024-01-02".into()), Some("".into())],
                vec![Some("2024-01-03".into())], // short row
            ],
        );
        assert_eq!(ds.rows, 3);
        assert_eq!(ds.columns.len(), 2);
        assert_eq!(ds.columns[0].semantic, SemanticType::Datetime);
        assert_eq!(ds.columns[1].semantic, SemanticType::Numeric);
        assert_eq!(ds.columns[1].missing_count(), 2);
    }

    #[test]
    fn na_spellings_count_as_missing() {
        let ds = Dataset::from_rows(
            vec!["v".into()],
            vec![
                vec![Some("NA".into())],
                vec![Some("n/a".into())],
                vec![Some("null".into())],
                vec![Some("7".into())],
            ],
        );
        assert_eq!(ds.columns[0].missing_count(), 3);
        assert_eq!(ds.columns[0].semantic, SemanticType::Numeric);
    }

    #[test]
    fn source_file_fingerprint_is_content_addressed() {
        let a = SourceFile::new("a.csv", FormatKind::Csv, b"x,y\n1,2\n");
        let b = SourceFile::new("b.csv", FormatKind::Csv, b"x,y\n1,2\n");
        let c = SourceFile::new("a.csv", FormatKind::Csv, b"x,y\n1,3\n");
        assert_eq!(a.sha256, b.sha256);
        assert_ne!(a.sha256, c.sha256);
        assert_eq!(a.size, 8);
    }
}
