//! The document store behind the pipeline.
//!
//! The pipeline depends only on a narrow keyed-upsert contract: fetch a
//! collection handle, replace-or-insert one document by a key filter, and
//! read a collection back. `DuckDbStore` is the durable implementation
//! (documents as JSON rows in a single table); `MemoryStore` backs tests.

pub mod memory;

pub use memory::MemoryStore;

use crate::models::Record;
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

// ── Contract ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("invalid document key: {0}")]
    Key(String),
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Result of a single replace-or-insert. `matched_count` is 1 when an
/// existing document with the same key was replaced, 0 on a fresh insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub matched_count: usize,
}

/// Keyed upsert service. Collections spring into existence on first write;
/// reading an absent collection yields an empty set, and absence itself is
/// observable through `collection_names`.
pub trait DocumentStore: Send + Sync {
    fn replace_one(
        &self,
        collection: &str,
        filter: &Record,
        replacement: &Record,
    ) -> Result<ReplaceOutcome, StoreError>;

    fn find_all(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    fn collection_names(&self) -> Result<Vec<String>, StoreError>;
}

/// Borrowed handle onto one collection of a store.
pub struct CollectionRef<'a> {
    store: &'a dyn DocumentStore,
    name: &'a str,
}

impl<'a> CollectionRef<'a> {
    pub fn new(store: &'a dyn DocumentStore, name: &'a str) -> Self {
        Self { store, name }
    }

    pub fn replace_one(
        &self,
        filter: &Record,
        replacement: &Record,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.store.replace_one(self.name, filter, replacement)
    }

    pub fn find_all(&self) -> Result<Vec<Record>, StoreError> {
        self.store.find_all(self.name)
    }
}

/// Canonical key encoding for a natural-key filter. `Record` is a sorted
/// map, so equal filters always encode to the same string.
pub fn encode_key(filter: &Record) -> Result<String, StoreError> {
    serde_json::to_string(filter).map_err(|e| StoreError::Key(e.to_string()))
}

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection  VARCHAR NOT NULL,
    doc_key     VARCHAR NOT NULL,
    doc         VARCHAR NOT NULL,
    updated_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (collection, doc_key)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection);
"#;

// ── DuckDB store ──────────────────────────────────────────────────────────────

pub struct DuckDbStore {
    // DuckDB connections are not Sync; the single logical writer
    // serializes on one coarse lock.
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.lock_conn()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

impl DocumentStore for DuckDbStore {
    fn replace_one(
        &self,
        collection: &str,
        filter: &Record,
        replacement: &Record,
    ) -> Result<ReplaceOutcome, StoreError> {
        let key = encode_key(filter)?;
        let doc = serde_json::to_string(replacement).map_err(|e| StoreError::Key(e.to_string()))?;

        let conn = self.lock_conn()?;
        let matched: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ? AND doc_key = ?",
            params![collection, key],
            |r| r.get(0),
        )?;

        conn.execute(
            r#"INSERT INTO documents (collection, doc_key, doc, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (collection, doc_key) DO UPDATE SET
                   doc = excluded.doc,
                   updated_at = excluded.updated_at"#,
            params![collection, key, doc, Utc::now().naive_utc()],
        )?;

        Ok(ReplaceOutcome { matched_count: matched as usize })
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT doc FROM documents WHERE collection = ?")?;
        let docs: Vec<String> = stmt
            .query_map(params![collection], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_str::<Record>(&doc) {
                Ok(record) => records.push(record),
                Err(e) => warn!("{}: skipping unreadable stored document: {}", collection, e),
            }
        }
        Ok(records)
    }

    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
        let names: Vec<String> = stmt
            .query_map([], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }
}
