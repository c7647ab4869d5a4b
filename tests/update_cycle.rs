//! End-to-end cycle scenarios against a scripted source and an in-memory
//! store.

use async_trait::async_trait;
use chrono::NaiveDate;
use epi_data_engine::config::CacheConfig;
use epi_data_engine::feeds::{Feed, FieldKind::*};
use epi_data_engine::fetcher::{FeedSource, FetchError};
use epi_data_engine::models::Scalar;
use epi_data_engine::pipeline::Pipeline;
use epi_data_engine::reader::DataReader;
use epi_data_engine::storage::{DocumentStore, MemoryStore};
use epi_data_engine::utils::SystemClock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source whose bodies can be swapped between cycles. Feeds without a
/// body fail like a timed-out fetch.
struct SwitchableSource {
    bodies: Mutex<HashMap<String, String>>,
}

impl SwitchableSource {
    fn new() -> Self {
        Self { bodies: Mutex::new(HashMap::new()) }
    }

    fn set(&self, feed: &str, body: String) {
        self.bodies.lock().unwrap().insert(feed.to_string(), body);
    }
}

#[async_trait]
impl FeedSource for SwitchableSource {
    async fn fetch_raw(&self, feed: &Feed) -> Result<String, FetchError> {
        self.bodies.lock().unwrap().get(&feed.name).cloned().ok_or_else(|| {
            FetchError::Request { url: feed.url.clone(), reason: "operation timed out".into() }
        })
    }
}

fn national_feed(name: &str) -> Feed {
    Feed::new(
        name,
        "http://example.invalid/data.csv",
        &["date"],
        &[("date", Date), ("cases", Int), ("deaths", Int)],
    )
}

fn national_body(days: std::ops::RangeInclusive<u32>, cases_base: i64) -> String {
    let mut body = String::from("date,cases,deaths\n");
    for day in days {
        body.push_str(&format!("2020-01-{:02},{},0\n", day, cases_base + day as i64));
    }
    body
}

fn jan(day: u32) -> Scalar {
    Scalar::Date(NaiveDate::from_ymd_opt(2020, 1, day).unwrap())
}

#[tokio::test]
async fn overlapping_cycles_keep_one_record_per_date() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(SwitchableSource::new());
    let feed = national_feed("covid-us");
    let pipeline = Pipeline::new(
        source.clone(),
        store.clone(),
        vec![feed],
        Duration::from_secs(60),
    );

    // cycle 0: Jan 1–10; cycle 1: Jan 5–15 with revised counts
    source.set("covid-us", national_body(1..=10, 0));
    pipeline.run_cycle(0).await;
    source.set("covid-us", national_body(5..=15, 100));
    let report = pipeline.run_cycle(1).await;

    let counts = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!(counts.matched, 6, "Jan 5–10 already stored");
    assert_eq!(counts.inserted, 5, "Jan 11–15 are new");

    let stored = store.find_all("covid-us").unwrap();
    assert_eq!(stored.len(), 15);

    for day in 1..=15u32 {
        let record = stored.iter().find(|r| r["date"] == jan(day)).unwrap();
        let expected = if day >= 5 { 100 + day as i64 } else { day as i64 };
        assert_eq!(record["cases"], Scalar::Int(expected), "day {}", day);
    }
}

#[tokio::test(start_paused = true)]
async fn one_timed_out_feed_leaves_the_other_six_visible() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(SwitchableSource::new());

    let feeds: Vec<Feed> = (1..=7).map(|i| national_feed(&format!("feed-{}", i))).collect();
    for i in 1..=7 {
        if i == 4 {
            continue; // feed-4 times out
        }
        source.set(&format!("feed-{}", i), national_body(1..=3, i64::from(i) * 10));
    }

    let pipeline = Pipeline::new(
        source.clone(),
        store.clone(),
        feeds.clone(),
        Duration::from_secs(60),
    );
    let report = pipeline.run_cycle(0).await;
    assert_eq!(report.succeeded(), 6);
    assert_eq!(report.failed(), 1);

    let reader = DataReader::new(
        store.clone(),
        feeds,
        &CacheConfig::default(),
        Arc::new(SystemClock),
    );
    let snapshot = reader.fetch_all(false).await.unwrap();

    assert_eq!(snapshot.len(), 7);
    for i in 1..=7 {
        let records = &snapshot[&format!("feed-{}", i)];
        if i == 4 {
            assert!(records.is_empty());
        } else {
            assert_eq!(records.len(), 3);
        }
    }
}
