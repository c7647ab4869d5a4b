//! The fixed table of named CSV feeds and their per-feed schemas.
//!
//! Each feed declares the typed columns it exposes and the subset of those
//! columns that uniquely identifies a row (the natural key). Normalization
//! validates rows against the schema and the upsert engine matches on the
//! key, so everything downstream of the registry is data-driven.

use serde::{Deserialize, Serialize};

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Date,
    Int,
    Float,
    Text,
}

/// One typed column of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

// ── Feed ──────────────────────────────────────────────────────────────────────

/// Immutable configuration entry for one upstream CSV source.
#[derive(Debug, Clone)]
pub struct Feed {
    pub name: String,
    pub url: String,
    /// Column names whose values identify a row within this feed's
    /// collection. Always a subset of `schema`.
    pub natural_key: Vec<String>,
    pub schema: Vec<FieldSpec>,
}

impl Feed {
    pub fn new(
        name: &str,
        url: &str,
        natural_key: &[&str],
        schema: &[(&str, FieldKind)],
    ) -> Self {
        let schema: Vec<FieldSpec> = schema
            .iter()
            .map(|(n, kind)| FieldSpec { name: n.to_string(), kind: *kind })
            .collect();
        debug_assert!(
            natural_key.iter().all(|k| schema.iter().any(|f| f.name == *k)),
            "natural key column missing from schema for feed {}",
            name
        );
        Self {
            name: name.to_string(),
            url: url.to_string(),
            natural_key: natural_key.iter().map(|k| k.to_string()).collect(),
            schema,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The registered source feeds, in cycle order.
///
/// Mask use is a single static survey snapshot, so it is keyed by county
/// FIPS alone. The two reference tables change rarely but are refreshed on
/// the same cycle as everything else; their upserts are no-ops when the
/// upstream file is unchanged.
pub fn registry() -> Vec<Feed> {
    use FieldKind::*;

    vec![
        Feed::new(
            "covid-us",
            "https://raw.githubusercontent.com/nytimes/covid-19-data/master/us.csv",
            &["date"],
            &[("date", Date), ("cases", Int), ("deaths", Int)],
        ),
        Feed::new(
            "covid-us-state",
            "https://raw.githubusercontent.com/nytimes/covid-19-data/master/us-states.csv",
            &["date", "state"],
            &[
                ("date", Date),
                ("state", Text),
                ("fips", Int),
                ("cases", Int),
                ("deaths", Int),
            ],
        ),
        Feed::new(
            "mask-use-by-county",
            "https://raw.githubusercontent.com/nytimes/covid-19-data/master/mask-use/mask-use-by-county.csv",
            &["countyfp"],
            &[
                ("countyfp", Int),
                ("never", Float),
                ("rarely", Float),
                ("sometimes", Float),
                ("frequently", Float),
                ("always", Float),
            ],
        ),
        Feed::new(
            "state-population",
            "https://www2.census.gov/programs-surveys/popest/datasets/2010-2019/state/detail/SCPRC-EST2019-18+POP-RES.csv",
            &["state"],
            &[("state", Int), ("name", Text), ("popestimate2019", Int)],
        ),
        Feed::new(
            "county-fips",
            "https://raw.githubusercontent.com/kjhealy/fips-codes/master/state_and_county_fips_master.csv",
            &["fips"],
            &[("fips", Int), ("name", Text), ("state", Text)],
        ),
    ]
}
