
use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::{KccError, Result};

/// Fixed mapping from raw KCC export column names to canonical field names.
/// Columns not listed here are discarded.
pub const COLUMN_MAP: &[(&str, &str)] = &[
    ("QueryText", "question"),
    ("KccAns", "answer"),
    ("Crop", "crop"),
    ("DistrictName", "district"),
    ("QueryType", "query_type"),
    ("Season", "season"),
    ("StateName", "state"),
];

/// One normalized knowledge-base entry. Immutable once produced; maps to
/// exactly one display string and one vector downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Record {
    /// Canonical textual form used for both embedding and display. Must be
    /// byte-identical between indexing time and serving time.
    #[inline]
    pub fn display_text(&self) -> String {
        format!("Q: {} A: {}", self.question, self.answer)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub sample_cap: usize,
    pub sample_seed: u64,
}

impl From<&crate::config::CorpusConfig> for NormalizeOptions {
    fn from(config: &crate::config::CorpusConfig) -> Self {
        Self {
            sample_cap: config.sample_cap,
            sample_seed: config.sample_seed,
        }
    }
}

/// Normalize a raw KCC CSV export into the canonical record stream.
///
/// Rows with a missing or empty question/answer are dropped. When the
/// surviving rows exceed the sample cap, a uniform random subsample is taken
/// with a fixed seed so repeated runs produce the same corpus. A dataset
/// that cannot be parsed at all aborts the run with no partial output.
#[inline]
pub fn normalize_csv(path: &Path, options: &NormalizeOptions) -> Result<Vec<Record>> {
    info!("Normalizing raw corpus from {}", path.display());

    let file = File::open(path)
        .with_context(|| format!("Failed to open corpus CSV: {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| KccError::Corpus(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let columns = ColumnLayout::from_headers(&headers)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(|e| KccError::Corpus(format!("Failed to parse CSV row: {e}")))?;

        match columns.record_from_row(&row) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    info!(
        "Kept {} rows after dropping {} with empty question/answer",
        records.len(),
        dropped
    );

    Ok(subsample(records, options))
}

/// Positions of the mapped columns within the raw header row.
struct ColumnLayout {
    question: usize,
    answer: usize,
    crop: Option<usize>,
    district: Option<usize>,
    query_type: Option<usize>,
    season: Option<usize>,
    state: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let position = |raw: &str| headers.iter().position(|h| h == raw);

        let required = |raw: &str| {
            position(raw).ok_or_else(|| {
                KccError::Corpus(format!("Required column '{raw}' not found in corpus CSV"))
            })
        };

        Ok(Self {
            question: required("QueryText")?,
            answer: required("KccAns")?,
            crop: position("Crop"),
            district: position("DistrictName"),
            query_type: position("QueryType"),
            season: position("Season"),
            state: position("StateName"),
        })
    }

    /// Map one raw row to a Record, or None when the question or answer is
    /// missing/empty after trimming.
    fn record_from_row(&self, row: &csv::StringRecord) -> Option<Record> {
        let required = |idx: usize| {
            let value = row.get(idx)?.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        };
        let optional = |idx: Option<usize>| {
            idx.and_then(|idx| row.get(idx))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Some(Record {
            question: required(self.question)?,
            answer: required(self.answer)?,
            crop: optional(self.crop),
            district: optional(self.district),
            query_type: optional(self.query_type),
            season: optional(self.season),
            state: optional(self.state),
        })
    }
}

/// Bound the corpus to `sample_cap` records with a seeded uniform sample.
/// Survivors keep their original relative order, which becomes the permanent
/// row order of the vector matrix.
fn subsample(records: Vec<Record>, options: &NormalizeOptions) -> Vec<Record> {
    if records.len() <= options.sample_cap {
        return records;
    }

    info!(
        "Sampling {} of {} records (seed {})",
        options.sample_cap,
        records.len(),
        options.sample_seed
    );

    let mut rng = StdRng::seed_from_u64(options.sample_seed);
    let chosen = index::sample(&mut rng, records.len(), options.sample_cap);

    let mut keep = vec![false; records.len()];
    let mut sampled = Vec::with_capacity(options.sample_cap);
    for idx in chosen.iter() {
        keep[idx] = true;
    }
    for (idx, record) in records.into_iter().enumerate() {
        if keep[idx] {
            sampled.push(record);
        }
    }
    sampled
}

/// Write normalized records as JSON Lines, one record per line.
#[inline]
pub fn write_jsonl(records: &[Record], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create corpus file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| KccError::Corpus(format!("Failed to serialize record: {e}")))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;

    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read a normalized JSON Lines corpus. A malformed line or an empty
/// question/answer is treated as a corrupted corpus and aborts the build.
#[inline]
pub fn read_jsonl(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open corpus file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = serde_json::from_str(&line).map_err(|e| {
            KccError::Corpus(format!("Malformed record on line {}: {e}", line_no + 1))
        })?;

        if record.question.trim().is_empty() || record.answer.trim().is_empty() {
            return Err(KccError::Corpus(format!(
                "Record on line {} has an empty question or answer",
                line_no + 1
            )));
        }

        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Display strings for the record stream, in corpus order.
#[inline]
pub fn display_texts(records: &[Record]) -> Vec<String> {
    records.iter().map(Record::display_text).collect()
}
