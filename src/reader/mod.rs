//! The read path consumers sit on: bulk and single-feed reads from the
//! store, fronted by short-lived TTL caches.
//!
//! Writes never invalidate a cache entry; consumers accept staleness up to
//! the TTL. A bulk read is only cached once every registered collection is
//! present in the store. While some are missing (a mid-write race across
//! collections) the full read is retried a bounded number of times, and
//! after the ceiling the partial snapshot is served *uncached* so the next
//! call tries again.

pub mod cache;

pub use cache::TtlCache;

use crate::config::CacheConfig;
use crate::feeds::Feed;
use crate::models::RecordSet;
use crate::storage::{CollectionRef, DocumentStore, StoreError};
use crate::utils::Clock;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Everything the store holds, keyed by feed name.
pub type Snapshot = BTreeMap<String, RecordSet>;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unknown feed '{0}'")]
    UnknownFeed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

const SNAPSHOT_KEY: &str = "all-feeds";

pub struct DataReader {
    store: Arc<dyn DocumentStore>,
    feeds: Vec<Feed>,
    snapshot_cache: Mutex<TtlCache<String, Snapshot>>,
    feed_cache: Mutex<TtlCache<String, RecordSet>>,
    retry_limit: u32,
    retry_delay: Duration,
}

impl DataReader {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        feeds: Vec<Feed>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let snapshot_ttl = chrono::Duration::seconds(config.snapshot_ttl_secs as i64);
        let feed_ttl = chrono::Duration::seconds(config.feed_ttl_secs as i64);
        Self {
            store,
            feeds,
            snapshot_cache: Mutex::new(TtlCache::new(
                config.max_entries,
                snapshot_ttl,
                Arc::clone(&clock),
            )),
            feed_cache: Mutex::new(TtlCache::new(config.max_entries, feed_ttl, clock)),
            retry_limit: config.read_retry_limit,
            retry_delay: Duration::from_millis(config.read_retry_delay_ms),
        }
    }

    /// Read every registered feed's collection.
    ///
    /// With `allow_cached` a live snapshot is returned without touching
    /// the store at all.
    pub async fn fetch_all(&self, allow_cached: bool) -> Result<Snapshot, StoreError> {
        if allow_cached {
            if let Ok(mut cache) = self.snapshot_cache.lock() {
                if let Some(snapshot) = cache.get(SNAPSHOT_KEY) {
                    debug!("snapshot served from cache");
                    return Ok(snapshot);
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            let present = self.store.collection_names()?;
            let missing: Vec<&str> = self
                .feeds
                .iter()
                .map(|f| f.name.as_str())
                .filter(|name| !present.iter().any(|p| p == name))
                .collect();

            if missing.is_empty() {
                let snapshot = self.read_snapshot()?;
                if let Ok(mut cache) = self.snapshot_cache.lock() {
                    cache.insert(SNAPSHOT_KEY.to_string(), snapshot.clone());
                }
                return Ok(snapshot);
            }

            if attempt >= self.retry_limit {
                warn!(
                    "store still missing {:?} after {} retries, serving partial snapshot uncached",
                    missing, attempt
                );
                return self.read_snapshot();
            }

            attempt += 1;
            debug!(
                "store missing {:?}, retrying full read ({}/{})",
                missing, attempt, self.retry_limit
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Read one feed's collection, cached on its own (shorter) TTL.
    pub fn fetch_feed(&self, name: &str, allow_cached: bool) -> Result<RecordSet, ReadError> {
        let feed = self
            .feeds
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ReadError::UnknownFeed(name.to_string()))?;

        if allow_cached {
            if let Ok(mut cache) = self.feed_cache.lock() {
                if let Some(records) = cache.get(name) {
                    return Ok(records);
                }
            }
        }

        let records = CollectionRef::new(self.store.as_ref(), &feed.name).find_all()?;
        if let Ok(mut cache) = self.feed_cache.lock() {
            cache.insert(name.to_string(), records.clone());
        }
        Ok(records)
    }

    fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::new();
        for feed in &self.feeds {
            let records = CollectionRef::new(self.store.as_ref(), &feed.name).find_all()?;
            snapshot.insert(feed.name.clone(), records);
        }
        info!("{} collections read from the store", snapshot.len());
        Ok(snapshot)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FieldKind::*;
    use crate::models::{Record, Scalar};
    use crate::storage::{MemoryStore, ReplaceOutcome};
    use crate::utils::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store wrapper that counts how often the backing store is actually
    /// read, so cache hits are observable.
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn new(inner: MemoryStore) -> Self {
            Self { inner, reads: AtomicUsize::new(0) }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl DocumentStore for CountingStore {
        fn replace_one(
            &self,
            collection: &str,
            filter: &Record,
            replacement: &Record,
        ) -> Result<ReplaceOutcome, StoreError> {
            self.inner.replace_one(collection, filter, replacement)
        }

        fn find_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_all(collection)
        }

        fn collection_names(&self) -> Result<Vec<String>, StoreError> {
            self.inner.collection_names()
        }
    }

    fn feed(name: &str) -> Feed {
        Feed::new(
            name,
            "http://example.invalid/data.csv",
            &["date"],
            &[("date", Date), ("cases", Int)],
        )
    }

    fn seed(store: &MemoryStore, collection: &str, day: u32, cases: i64) {
        let mut record = Record::new();
        record.insert(
            "date".into(),
            Scalar::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, day).unwrap()),
        );
        record.insert("cases".into(), Scalar::Int(cases));
        let mut filter = Record::new();
        filter.insert("date".into(), record["date"].clone());
        store.replace_one(collection, &filter, &record).unwrap();
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::starting_at(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn cached_read_within_ttl_skips_the_store() {
        let memory = MemoryStore::new();
        seed(&memory, "covid-us", 21, 1);
        seed(&memory, "covid-us-state", 21, 1);
        let store = Arc::new(CountingStore::new(memory));
        let clock = manual_clock();

        let reader = DataReader::new(
            store.clone(),
            vec![feed("covid-us"), feed("covid-us-state")],
            &CacheConfig::default(),
            clock.clone(),
        );

        let filled = reader.fetch_all(false).await.unwrap();
        let reads_after_fill = store.reads();
        assert_eq!(filled.len(), 2);

        let cached = reader.fetch_all(true).await.unwrap();
        assert_eq!(cached, filled);
        assert_eq!(store.reads(), reads_after_fill, "cache hit must not read the store");

        // past the TTL the next allow_cached call reads the store once more
        clock.advance(chrono::Duration::seconds(
            CacheConfig::default().snapshot_ttl_secs as i64 + 1,
        ));
        let refreshed = reader.fetch_all(true).await.unwrap();
        assert_eq!(refreshed, filled);
        assert_eq!(store.reads(), reads_after_fill * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_collection_read_is_retried_then_served_partial_uncached() {
        let memory = MemoryStore::new();
        seed(&memory, "covid-us", 21, 1);
        // "covid-us-state" never written
        let store = Arc::new(CountingStore::new(memory));

        let reader = DataReader::new(
            store.clone(),
            vec![feed("covid-us"), feed("covid-us-state")],
            &CacheConfig::default(),
            manual_clock(),
        );

        let partial = reader.fetch_all(false).await.unwrap();
        assert_eq!(partial["covid-us"].len(), 1);
        assert!(partial["covid-us-state"].is_empty());

        // partial snapshots are never cached: the next cached call reads again
        let reads = store.reads();
        let again = reader.fetch_all(true).await.unwrap();
        assert_eq!(again, partial);
        assert!(store.reads() > reads);
    }

    #[tokio::test]
    async fn fetch_feed_caches_on_its_own_ttl() {
        let memory = MemoryStore::new();
        seed(&memory, "covid-us", 21, 1);
        let store = Arc::new(CountingStore::new(memory));
        let clock = manual_clock();

        let reader =
            DataReader::new(store.clone(), vec![feed("covid-us")], &CacheConfig::default(), clock.clone());

        let first = reader.fetch_feed("covid-us", true).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(store.reads(), 1);

        assert_eq!(reader.fetch_feed("covid-us", true).unwrap(), first);
        assert_eq!(store.reads(), 1);

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(reader.fetch_feed("covid-us", true).unwrap(), first);
        assert_eq!(store.reads(), 2);

        assert!(matches!(
            reader.fetch_feed("no-such-feed", true),
            Err(ReadError::UnknownFeed(_))
        ));
    }
}
