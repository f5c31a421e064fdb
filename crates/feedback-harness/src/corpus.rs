//! Feedback corpus loading.
//!
//! The corpus is a CSV file with the columns `feedback_id, source,
//! date, user_id, feedback_text, sentiment`. Loading is strict about
//! enumerations and dates (a typo'd sentiment is a data bug worth
//! surfacing, not skipping) but lenient about blank feedback text,
//! which is dropped with a log line.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use feedback_harness_core::models::FeedbackRecord;

/// Raw CSV row, before enum and date parsing.
#[derive(Debug, Deserialize)]
struct RawRow {
    feedback_id: String,
    source: String,
    date: String,
    user_id: String,
    feedback_text: String,
    sentiment: String,
}

/// Load and parse the corpus CSV. Row numbers in errors are 1-based
/// data rows (the header is row 0).
pub fn load_corpus(path: &Path) -> Result<Vec<FeedbackRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open corpus file: {}", path.display()))?;

    let mut records = Vec::new();
    let mut dropped_blank = 0usize;

    for (idx, row) in reader.deserialize::<RawRow>().enumerate() {
        let row_num = idx + 1;
        let row = row.with_context(|| format!("Malformed CSV at row {row_num}"))?;

        if row.feedback_text.trim().is_empty() {
            dropped_blank += 1;
            debug!(row = row_num, id = %row.feedback_id, "dropping blank feedback row");
            continue;
        }

        let source = row
            .source
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Row {row_num}: {e}"))?;
        let sentiment = row
            .sentiment
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Row {row_num}: {e}"))?;
        let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d")
            .with_context(|| format!("Row {row_num}: invalid date {:?}", row.date))?;

        records.push(FeedbackRecord {
            id: row.feedback_id,
            source,
            date,
            user_id: row.user_id,
            text: row.feedback_text,
            sentiment,
        });
    }

    info!(
        records = records.len(),
        dropped_blank,
        path = %path.display(),
        "corpus loaded"
    );
    Ok(records)
}

/// Corpus-level tallies for the `corpus` subcommand.
#[derive(Debug)]
pub struct CorpusSummary {
    pub records: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_sentiment: BTreeMap<String, usize>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

pub fn summarize(records: &[FeedbackRecord]) -> CorpusSummary {
    let mut by_source = BTreeMap::new();
    let mut by_sentiment = BTreeMap::new();
    let mut date_range: Option<(NaiveDate, NaiveDate)> = None;

    for record in records {
        *by_source.entry(record.source.to_string()).or_insert(0) += 1;
        *by_sentiment.entry(record.sentiment.to_string()).or_insert(0) += 1;
        date_range = Some(match date_range {
            None => (record.date, record.date),
            Some((lo, hi)) => (lo.min(record.date), hi.max(record.date)),
        });
    }

    CorpusSummary {
        records: records.len(),
        by_source,
        by_sentiment,
        date_range,
    }
}
