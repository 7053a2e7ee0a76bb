//! CSV ingestion.

use crate::error::IngestionError;
use crate::ingest::{decode_text, table_metadata};
use crate::models::{Dataset, Ingested, Payload};

/// Parse CSV bytes into a tabular dataset.
///
/// The first record is the header row. Records whose width disagrees with
/// the header are treated as corruption rather than silently realigned.
pub fn ingest(bytes: &[u8]) -> Result<Ingested, IngestionError> {
    let text = decode_text(bytes)?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestionError::Corrupt(format!("CSV header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(IngestionError::Empty);
    }

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestionError::Corrupt(format!("CSV record: {}", e)))?;
        rows.push(record.iter().map(|cell| Some(cell.to_string())).collect());
    }

    if rows.is_empty() {
        return Err(IngestionError::Empty);
    }

    let dataset = Dataset::from_rows(headers, rows);
    let metadata = table_metadata(&dataset);

    Ok(Ingested {
        payload: Payload::Table(dataset),
        metadata,
    })
}
