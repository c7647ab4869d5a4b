//! Natural-key upsert engine.
//!
//! Each record is projected onto its feed's natural key and written with
//! replace-if-exists-else-insert semantics, so re-running a cycle over
//! unchanged data matches every row and inserts none. One bad record never
//! aborts the rest of the batch.

use crate::feeds::Feed;
use crate::models::Record;
use crate::storage::{CollectionRef, DocumentStore};
use tracing::warn;

/// Per-batch counters. `rows` counts records that reached the store;
/// `skipped` counts records dropped for a malformed key or a store-level
/// rejection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub rows: usize,
    pub matched: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Project `record` onto the feed's natural-key columns.
///
/// Normalization guarantees every surviving row carries all key columns,
/// so `None` here means the record did not come through this feed's
/// normalizer; it is skipped, not fatal.
pub fn natural_key_filter(feed: &Feed, record: &Record) -> Option<Record> {
    let mut filter = Record::new();
    for column in &feed.natural_key {
        filter.insert(column.clone(), record.get(column)?.clone());
    }
    Some(filter)
}

/// Upsert every record of `records` into the feed's collection.
///
/// Tolerates zero-row input (a zero-count batch, not an error) and
/// per-record failures (logged, skipped, batch continues).
pub fn upsert_record_set(
    store: &dyn DocumentStore,
    feed: &Feed,
    records: &[Record],
) -> UpsertCounts {
    let collection = CollectionRef::new(store, &feed.name);
    let mut counts = UpsertCounts::default();

    for record in records {
        let Some(filter) = natural_key_filter(feed, record) else {
            warn!("{}: record missing natural key column, skipping", feed.name);
            counts.skipped += 1;
            continue;
        };

        match collection.replace_one(&filter, record) {
            Ok(outcome) => {
                counts.rows += 1;
                if outcome.matched_count > 0 {
                    counts.matched += 1;
                } else {
                    counts.inserted += 1;
                }
            }
            Err(e) => {
                warn!("{}: record upsert failed, skipping: {}", feed.name, e);
                counts.skipped += 1;
            }
        }
    }

    counts
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FieldKind::*;
    use crate::models::Scalar;
    use crate::normalize::normalize;
    use crate::storage::MemoryStore;

    fn state_feed() -> Feed {
        Feed::new(
            "covid-us-state",
            "http://example.invalid/us-states.csv",
            &["date", "state"],
            &[("date", Date), ("state", Text), ("cases", Int), ("deaths", Int)],
        )
    }

    fn normalized(raw: &str, feed: &Feed) -> Vec<Record> {
        normalize(raw, feed).unwrap()
    }

    #[test]
    fn second_upsert_of_same_set_matches_all() {
        let feed = state_feed();
        let store = MemoryStore::new();
        let raw = "date,state,cases,deaths\n\
                   2020-03-01,Washington,1,0\n\
                   2020-03-01,Oregon,2,0\n\
                   2020-03-02,Washington,4,1\n";
        let records = normalized(raw, &feed);

        let first = upsert_record_set(&store, &feed, &records);
        assert_eq!(first.inserted, 3);
        assert_eq!(first.matched, 0);

        let second = upsert_record_set(&store, &feed, &records);
        assert_eq!(second.matched, records.len());
        assert_eq!(second.inserted, 0);
        assert_eq!(store.find_all("covid-us-state").unwrap().len(), 3);
    }

    #[test]
    fn zero_rows_is_a_zero_count_batch() {
        let feed = state_feed();
        let store = MemoryStore::new();
        let counts = upsert_record_set(&store, &feed, &[]);
        assert_eq!(counts, UpsertCounts::default());
    }

    #[test]
    fn record_missing_key_column_is_skipped_not_fatal() {
        let feed = state_feed();
        let store = MemoryStore::new();

        let mut good = Record::new();
        good.insert("date".into(), Scalar::Text("2020-03-01".into()));
        good.insert("state".into(), Scalar::Text("Washington".into()));
        good.insert("cases".into(), Scalar::Int(1));

        let mut bad = Record::new();
        bad.insert("cases".into(), Scalar::Int(9));

        let counts = upsert_record_set(&store, &feed, &[bad, good]);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.inserted, 1);
        assert_eq!(store.find_all("covid-us-state").unwrap().len(), 1);
    }

    #[test]
    fn no_two_stored_records_share_a_key() {
        let feed = state_feed();
        let store = MemoryStore::new();

        let cycle_one = "date,state,cases,deaths\n\
                         2020-03-01,Washington,1,0\n\
                         2020-03-02,Washington,4,1\n";
        let cycle_two = "date,state,cases,deaths\n\
                         2020-03-02,Washington,5,1\n\
                         2020-03-03,Washington,9,2\n";

        upsert_record_set(&store, &feed, &normalized(cycle_one, &feed));
        upsert_record_set(&store, &feed, &normalized(cycle_two, &feed));

        let stored = store.find_all("covid-us-state").unwrap();
        assert_eq!(stored.len(), 3);
        // overlap row reflects the second cycle
        let overlap = stored
            .iter()
            .find(|r| r["date"] == Scalar::Date(chrono::NaiveDate::from_ymd_opt(2020, 3, 2).unwrap()))
            .unwrap();
        assert_eq!(overlap["cases"], Scalar::Int(5));
    }
}
