//! Pipeline orchestrator: ties fetcher → normalizer → upsert engine together.
//!
//! ## Run modes
//!
//! `run_cycle()` — one full pass over the registry in fixed order:
//!   for each feed, Fetch → Normalize → Upsert. Failures are isolated per
//!   feed; the returned report carries a typed outcome for every feed.
//!   Idempotent: re-running over unchanged upstream data matches every row
//!   and inserts none.
//!
//! `run_forever()` — the process loop: cycle 0 immediately, then one cycle
//!   every period. Cycles never overlap; a slow cycle delays the next one.
//!   Nothing that happens inside a cycle can end the loop; a feed that is
//!   permanently down only skips its own updates.

use crate::feeds::Feed;
use crate::fetcher::{FeedSource, FetchError};
use crate::normalize::{self, ParseError};
use crate::storage::DocumentStore;
use crate::upsert::{UpsertCounts, upsert_record_set};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

// ── Per-feed outcome ──────────────────────────────────────────────────────────

/// Why one feed's update was abandoned this cycle. Prior stored data is
/// untouched in either case.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network failure: {0}")]
    Network(#[from] FetchError),

    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug)]
pub struct FeedOutcome {
    pub feed: String,
    pub result: Result<UpsertCounts, FeedError>,
}

#[derive(Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcomes: Vec<FeedOutcome>,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Counter totals across the feeds that completed.
    pub fn totals(&self) -> UpsertCounts {
        let mut totals = UpsertCounts::default();
        for counts in self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()) {
            totals.rows += counts.rows;
            totals.matched += counts.matched;
            totals.inserted += counts.inserted;
            totals.skipped += counts.skipped;
        }
        totals
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn DocumentStore>,
    feeds: Vec<Feed>,
    period: Duration,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: Arc<dyn DocumentStore>,
        feeds: Vec<Feed>,
        period: Duration,
    ) -> Self {
        Self { source, store, feeds, period }
    }

    /// Fetch → normalize → upsert for one feed.
    pub async fn update_feed(&self, feed: &Feed) -> Result<UpsertCounts, FeedError> {
        let raw = self.source.fetch_raw(feed).await?;
        let records = normalize::normalize(&raw, feed)?;
        let counts = upsert_record_set(self.store.as_ref(), feed, &records);
        info!(
            "{}: rows={}, update={}, insert={}",
            feed.name, counts.rows, counts.matched, counts.inserted
        );
        Ok(counts)
    }

    /// One full pass across the registered feeds, in registry order.
    pub async fn run_cycle(&self, cycle: u64) -> CycleReport {
        let mut outcomes = Vec::with_capacity(self.feeds.len());
        for feed in &self.feeds {
            let result = self.update_feed(feed).await;
            if let Err(e) = &result {
                warn!("cycle {}: {} skipped: {}", cycle, feed.name, e);
            }
            outcomes.push(FeedOutcome { feed: feed.name.clone(), result });
        }
        CycleReport { cycle, outcomes }
    }

    /// The acquisition loop. Runs until the process is killed.
    pub async fn run_forever(&self) {
        let mut cycle = 0u64;
        loop {
            let report = self.run_cycle(cycle).await;
            let totals = report.totals();
            info!(
                "cycle {}: {} feeds ok, {} failed | rows={}, update={}, insert={}",
                cycle,
                report.succeeded(),
                report.failed(),
                totals.rows,
                totals.matched,
                totals.inserted
            );
            tokio::time::sleep(self.period).await;
            cycle += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
