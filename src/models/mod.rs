use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Scalar ────────────────────────────────────────────────────────────────────

/// A single typed cell of a normalized record.
///
/// Serialized untagged: dates become `"%Y-%m-%d"` strings, integers and
/// floats become JSON numbers. Deserialization tries the variants in
/// declaration order, so an ISO date string always comes back as `Date`,
/// a whole number as `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Date(NaiveDate),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Date(d) => write!(f, "{}", d),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One normalized row: column name (lower-cased, trimmed) → typed value.
///
/// A `BTreeMap` keeps column order deterministic, which makes the JSON
/// encoding of a natural-key filter canonical.
pub type Record = BTreeMap<String, Scalar>;

/// The normalized rows of one feed. Order carries no meaning; the store
/// is keyed, not ordered.
pub type RecordSet = Vec<Record>;
