//! CSV text → `RecordSet`, validated against the feed's schema.
//!
//! Row policy is strict: a row with any empty cell, a short/truncated row,
//! or a cell that fails type coercion is dropped whole. A schema column
//! missing from the header row aborts the feed's update for this cycle
//! (`ParseError::MissingColumn`) and leaves prior stored data untouched.

use crate::feeds::{Feed, FieldKind};
use crate::models::{Record, RecordSet, Scalar};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{feed}: body is not valid delimited content: {reason}")]
    Malformed { feed: String, reason: String },

    #[error("{feed}: required column '{column}' missing from header")]
    MissingColumn { feed: String, column: String },
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Parse comma-delimited `raw` into the feed's typed records.
pub fn normalize(raw: &str, feed: &Feed) -> Result<RecordSet, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Malformed { feed: feed.name.clone(), reason: e.to_string() })?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    // Resolve each schema column to its position once, up front.
    let mut indices = Vec::with_capacity(feed.schema.len());
    for field in &feed.schema {
        let idx = headers.iter().position(|h| *h == field.name).ok_or_else(|| {
            ParseError::MissingColumn { feed: feed.name.clone(), column: field.name.clone() }
        })?;
        indices.push(idx);
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                debug!("{}: row {} unreadable: {}", feed.name, i + 1, e);
                dropped += 1;
                continue;
            }
        };

        match coerce_row(&row, feed, &indices) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("{}: dropped {} incomplete rows", feed.name, dropped);
    }

    Ok(records)
}

/// Coerce one CSV row to a `Record`, failing closed on any mismatch.
fn coerce_row(row: &csv::StringRecord, feed: &Feed, indices: &[usize]) -> Option<Record> {
    let mut record = Record::new();
    for (field, &idx) in feed.schema.iter().zip(indices) {
        let cell = row.get(idx)?.trim();
        if cell.is_empty() {
            return None;
        }
        record.insert(field.name.clone(), coerce_cell(cell, field.kind)?);
    }
    Some(record)
}

pub fn coerce_cell(cell: &str, kind: FieldKind) -> Option<Scalar> {
    match kind {
        FieldKind::Date => parse_date(cell).map(Scalar::Date),
        FieldKind::Int => parse_int(cell).map(Scalar::Int),
        FieldKind::Float => parse_float(cell).map(Scalar::Float),
        FieldKind::Text => Some(Scalar::Text(cell.to_string())),
    }
}

// ── Cell parsers ──────────────────────────────────────────────────────────────

/// Parse dates: ISO first (NYT format), then common US spellings.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%b %d, %Y") {
        return Some(d);
    }

    None
}

/// Parse an integer, tolerating thousands separators. "1,234" → 1234
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" {
        return None;
    }
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    if cleaned.is_empty() || s.contains('.') {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse a float: strip everything except digits, dot, minus.
pub fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
