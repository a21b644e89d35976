//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Collections live in a `HashMap` behind one `std::sync::RwLock`, so a
//! batch is applied under a single write guard and queries never observe
//! it half-done. Search is brute-force cosine distance over every record.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{HarnessError, Result};
use crate::filter::MetadataFilter;
use crate::models::{CollectionInfo, Metadata, SearchResult, VectorRecord};

use super::{check_dims, check_query_dims, check_unique_ids, rank, VectorStore};

#[derive(Default)]
struct MemCollection {
    metadata: Metadata,
    records: BTreeMap<String, VectorRecord>,
}

impl MemCollection {
    fn dims(&self) -> Option<usize> {
        self.records.values().next().map(|r| r.embedding.len())
    }
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .read()
            .map_err(|_| HarnessError::storage("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .write()
            .map_err(|_| HarnessError::storage("in-memory store lock poisoned"))
    }
}

fn missing(name: &str) -> HarnessError {
    HarnessError::storage(format!("collection '{}' does not exist", name))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> Result<Metadata> {
        let mut collections = self.write()?;
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| MemCollection {
                metadata: metadata.clone(),
                records: BTreeMap::new(),
            });
        Ok(entry.metadata.clone())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        check_unique_ids(records)?;
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        // Replacing every record of a collection may change its dimensions.
        let replaces_all = col.records.keys().all(|id| records.iter().any(|r| &r.id == id));
        let stored = if replaces_all { None } else { col.dims() };
        check_dims(stored, records)?;

        for record in records {
            col.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn update(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        check_unique_ids(records)?;
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(unknown) = records.iter().find(|r| !col.records.contains_key(&r.id)) {
            return Err(HarnessError::validation(format!(
                "cannot update unknown id '{}'",
                unknown.id
            )));
        }
        check_dims(col.dims(), records)?;

        for record in records {
            col.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter(|id| col.records.remove(id.as_str()).is_some())
            .count())
    }

    async fn replace_all(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        check_unique_ids(records)?;
        check_dims(None, records)?;
        let mut collections = self.write()?;
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        let removed = col.records.len();
        col.records = records
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();
        Ok(removed)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.read()?;
        let col = collections.get(collection).ok_or_else(|| missing(collection))?;
        check_query_dims(col.dims(), embedding)?;
        Ok(rank(col.records.values(), embedding, k, filter))
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let collections = self.read()?;
        let col = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| col.records.get(id).cloned())
            .collect())
    }

    async fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.read()?;
        let col = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(col.records.keys().cloned().collect())
    }

    async fn info(&self, collection: &str) -> Result<CollectionInfo> {
        let collections = self.read()?;
        let col = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(CollectionInfo {
            name: collection.to_string(),
            count: col.records.len(),
            metadata: col.metadata.clone(),
        })
    }
}
