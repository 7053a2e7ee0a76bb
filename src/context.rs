//! Context building: reduce a payload to a bounded natural-language summary
//! suitable for inclusion in a model prompt.
//!
//! The same payload and metadata always produce the same string: no
//! timestamps, no randomness. When the summary would exceed the budget,
//! the least informative sections (sample rows, excerpts) are dropped
//! before aggregate statistics.

use std::collections::BTreeMap;

use crate::models::{Column, Dataset, Metadata, Payload, SemanticType};

/// How many sample rows a tabular context carries.
const SAMPLE_ROWS: usize = 5;
/// How many top categories are listed per categorical column.
const TOP_CATEGORIES: usize = 5;
/// Shortest excerpt worth keeping when squeezing into the budget.
const MIN_EXCERPT_CHARS: usize = 80;

/// Build the context string for a payload, bounded to `budget` characters.
pub fn build(payload: &Payload, metadata: &Metadata, budget: usize) -> String {
    let sections = match payload {
        Payload::Table(ds) => table_sections(ds),
        Payload::Text(text) => text_sections(text, metadata),
    };
    assemble(sections, budget)
}

/// Join sections most-informative-first, stopping at the budget. The final
/// section may be truncated to fit when enough room remains for it to still
/// say something.
fn assemble(sections: Vec<String>, budget: usize) -> String {
    let mut out = String::new();
    for section in sections {
        let needed = if out.is_empty() {
            section.len()
        } else {
            section.len() + 2
        };
        if out.len() + needed <= budget {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&section);
            continue;
        }
        // Not enough room for the whole section; keep a truncated tail if
        // it is still meaningfully long, then stop either way.
        let room = budget.saturating_sub(out.len() + 2);
        if room >= MIN_EXCERPT_CHARS {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&truncate_chars(&section, room.saturating_sub(3)));
            out.push_str("...");
        }
        break;
    }
    out
}

/// Truncate at a character boundary.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn table_sections(ds: &Dataset) -> Vec<String> {
    let mut sections = Vec::new();

    sections.push(format!(
        "Dataset overview: {} rows x {} columns",
        ds.rows,
        ds.columns.len()
    ));

    let mut columns = String::from("Columns:");
    for col in &ds.columns {
        let missing = col.missing_count();
        if missing > 0 {
            columns.push_str(&format!(
                "\n- {} ({}, {} missing)",
                col.name,
                col.semantic.as_str(),
                missing
            ));
        } else {
            columns.push_str(&format!("\n- {} ({})", col.name, col.semantic.as_str()));
        }
    }
    sections.push(columns);

    let numeric: Vec<String> = ds
        .columns
        .iter()
        .filter(|c| c.semantic == SemanticType::Numeric)
        .filter_map(numeric_summary)
        .collect();
    if !numeric.is_empty() {
        sections.push(format!("Numeric summary:\n{}", numeric.join("\n")));
    }

    let categorical: Vec<String> = ds
        .columns
        .iter()
        .filter(|c| c.semantic == SemanticType::Categorical)
        .map(category_summary)
        .collect();
    if !categorical.is_empty() {
        sections.push(format!("Top categories:\n{}", categorical.join("\n")));
    }

    if ds.rows > 0 {
        sections.push(sample_section(ds));
    }

    sections
}

fn numeric_summary(col: &Column) -> Option<String> {
    let values = col.numeric_values();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let std = if values.len() > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    Some(format!(
        "- {}: mean {:.2}, min {:.2}, max {:.2}, std {:.2}",
        col.name, mean, min, max, std
    ))
}

fn category_summary(col: &Column) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in col.values.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let mut entries: Vec<(&str, usize)> = counts.into_iter().collect();
    // count descending, then name ascending: stable output
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let listed: Vec<String> = entries
        .into_iter()
        .take(TOP_CATEGORIES)
        .map(|(value, count)| format!("{} ({})", value, count))
        .collect();
    format!("- {}: {}", col.name, listed.join(", "))
}

fn sample_section(ds: &Dataset) -> String {
    let header: Vec<&str> = ds.columns.iter().map(|c| c.name.as_str()).collect();
    let mut out = format!("Sample rows (first {}):\n{}", SAMPLE_ROWS.min(ds.rows), header.join(" | "));
    for row in ds.sample_rows(SAMPLE_ROWS) {
        out.push('\n');
        out.push_str(&row.join(" | "));
    }
    out
}

fn text_sections(text: &str, metadata: &Metadata) -> Vec<String> {
    let mut sections = Vec::new();

    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    let mut summary = format!("Document summary: {} words, {} characters", words, chars);
    if let Some(pages) = metadata.get("pages").and_then(|v| v.as_u64()) {
        summary.push_str(&format!("\nPages: {}", pages));
    }
    if let Some(title) = metadata.get("title").and_then(|v| v.as_str()) {
        summary.push_str(&format!("\nTitle: {}", title));
    }
    if let Some(author) = metadata.get("author").and_then(|v| v.as_str()) {
        summary.push_str(&format!("\nAuthor: {}", author));
    }
    sections.push(summary);

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        sections.push(format!("Excerpt:\n{}", trimmed));
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dataset;

    fn sales_dataset() -> Dataset {
        Dataset::from_rows(
            vec!["date".into(), "sales".into(), "region".into()],
            vec![
                vec![
                    Some("2024-01-01".into()),
                    Some("10".into()),
                    Some("north".into()),
                ],
                vec![Some("2024-01-02".into()), None, Some("south".into())],
                vec![
                    Some("2024-01-03".into()),
                    Some("20".into()),
                    Some("north".into()),
                ],
            ],
        )
    }

    #[test]
    fn tabular_context_mentions_shape_and_missing() {
        let ds = sales_dataset();
        let ctx = build(&Payload::Table(ds), &Metadata::new(), 4000);
        assert!(ctx.contains("3 rows"));
        assert!(ctx.contains("sales (numeric, 1 missing)"));
        assert!(ctx.contains("mean 15.00, min 10.00, max 20.00"));
        assert!(ctx.contains("region: north (2), south (1)"));
        assert!(ctx.contains("Sample rows"));
    }

    #[test]
    fn context_is_deterministic() {
        let ds = sales_dataset();
        let payload = Payload::Table(ds);
        let a = build(&payload, &Metadata::new(), 4000);
        let b = build(&payload, &Metadata::new(), 4000);
        assert_eq!(a, b);
    }

    #[test]
    fn budget_drops_samples_before_stats() {
        let ds = sales_dataset();
        let payload = Payload::Table(ds);
        let full = build(&payload, &Metadata::new(), 4000);
        assert!(full.len() > 150);

        let tight = build(&payload, &Metadata::new(), 150);
        assert!(tight.len() <= 150);
        assert!(tight.contains("3 rows"));
        assert!(!tight.contains("Sample rows"));
    }

    #[test]
    fn text_context_has_counts_and_excerpt() {
        let mut meta = Metadata::new();
        meta.insert("pages".into(), serde_json::json!(2));
        meta.insert("title".into(), serde_json::json!("Q3 Report"));
        let payload = Payload::Text("alpha beta gamma".into());
        let ctx = build(&payload, &meta, 4000);
        assert!(ctx.contains("3 words"));
        assert!(ctx.contains("Pages: 2"));
        assert!(ctx.contains("Title: Q3 Report"));
        assert!(ctx.contains("Excerpt:\nalpha beta gamma"));
    }

    #[test]
    fn long_text_is_truncated_to_budget() {
        let long = "word ".repeat(2000);
        let payload = Payload::Text(long);
        let ctx = build(&payload, &Metadata::new(), 500);
        assert!(ctx.chars().count() <= 500);
        assert!(ctx.contains("Document summary"));
        assert!(ctx.ends_with("..."));
    }

    #[test]
    fn empty_text_yields_summary_only() {
        let payload = Payload::Text(String::new());
        let ctx = build(&payload, &Metadata::new(), 4000);
        assert!(ctx.contains("0 words"));
        assert!(!ctx.contains("Excerpt"));
    }
}
