//! In-memory `DocumentStore` used by tests and as an injectable fake.

use super::{DocumentStore, ReplaceOutcome, StoreError, encode_key};
use crate::models::Record;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn replace_one(
        &self,
        collection: &str,
        filter: &Record,
        replacement: &Record,
    ) -> Result<ReplaceOutcome, StoreError> {
        let key = encode_key(filter)?;
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        let coll = collections.entry(collection.to_string()).or_default();
        let matched = coll.insert(key, replacement.clone()).is_some();
        Ok(ReplaceOutcome { matched_count: matched as usize })
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        Ok(collections
            .get(collection)
            .map(|coll| coll.values().cloned().collect())
            .unwrap_or_default())
    }

    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        Ok(collections.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;

    #[test]
    fn absent_collection_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.find_all("covid-us").unwrap().is_empty());
        assert!(store.collection_names().unwrap().is_empty());
    }

    #[test]
    fn replace_distinguishes_insert_from_match() {
        let store = MemoryStore::new();
        let mut filter = Record::new();
        filter.insert("countyfp".into(), Scalar::Int(1001));
        let mut record = filter.clone();
        record.insert("always".into(), Scalar::Float(0.444));

        assert_eq!(store.replace_one("mask-use", &filter, &record).unwrap().matched_count, 0);
        assert_eq!(store.replace_one("mask-use", &filter, &record).unwrap().matched_count, 1);
        assert_eq!(store.find_all("mask-use").unwrap().len(), 1);
    }
}
