//! Storage abstraction for vector collections.
//!
//! The [`VectorStore`] trait defines every operation a
//! [`VectorCollection`](crate::collection::VectorCollection) needs,
//! enabling pluggable backends (SQLite in the app crate, in-memory here).
//!
//! Implementations must be `Send + Sync` and must apply each batch
//! atomically: a failed `upsert`, `update` or `delete` leaves the
//! collection exactly as it was, and no `query` may observe a half-written
//! batch.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{HarnessError, Result};
use crate::filter::MetadataFilter;
use crate::models::{CollectionInfo, Metadata, SearchResult, VectorRecord};

/// Abstract storage backend for named vector collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_or_create_collection`](VectorStore::get_or_create_collection) | Idempotent create |
/// | [`upsert`](VectorStore::upsert) | Insert or replace records |
/// | [`update`](VectorStore::update) | Replace existing records only |
/// | [`delete`](VectorStore::delete) | Remove records by id |
/// | [`replace_all`](VectorStore::replace_all) | Swap the whole contents in one batch |
/// | [`query`](VectorStore::query) | Cosine nearest-neighbor search |
/// | [`get`](VectorStore::get) | Fetch records by id |
/// | [`ids`](VectorStore::ids) | List every record id |
/// | [`info`](VectorStore::info) | Name, count and collection metadata |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing and return its metadata.
    async fn get_or_create_collection(&self, name: &str, metadata: &Metadata)
        -> Result<Metadata>;

    /// Insert or replace records by id.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Replace records that already exist. Fails without writing anything
    /// if any id is unknown.
    async fn update(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Remove records by id. Unknown ids are ignored. Returns how many
    /// records were removed.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize>;

    /// Remove every record and write `records` as one atomic batch.
    /// Returns how many records were removed. On error the previous
    /// contents stay in place.
    async fn replace_all(&self, collection: &str, records: &[VectorRecord]) -> Result<usize>;

    /// Return up to `k` records nearest to `embedding`, ascending by
    /// distance, restricted to records matching `filter`.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>>;

    /// Fetch records by id, in the order requested. Missing ids are skipped.
    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>>;

    /// All record ids in ascending order.
    async fn ids(&self, collection: &str) -> Result<Vec<String>>;

    async fn info(&self, collection: &str) -> Result<CollectionInfo>;
}

/// Rank candidate records against a query embedding.
///
/// Shared by every backend so ordering is identical everywhere: ascending
/// distance, ties broken by id.
pub fn rank<'a, I>(candidates: I, embedding: &[f32], k: usize, filter: &MetadataFilter) -> Vec<SearchResult>
where
    I: IntoIterator<Item = &'a VectorRecord>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .filter(|r| filter.matches(&r.metadata))
        .map(|r| SearchResult {
            id: r.id.clone(),
            content: r.content.clone(),
            metadata: r.metadata.clone(),
            distance: cosine_distance(embedding, &r.embedding),
        })
        .collect();

    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(k);
    results
}

/// Check that every vector in a batch has the collection's dimensionality.
///
/// `stored_dims` is `None` for an empty collection, in which case the
/// batch must merely agree with itself.
pub fn check_dims(stored_dims: Option<usize>, records: &[VectorRecord]) -> Result<Option<usize>> {
    let mut dims = stored_dims;
    for record in records {
        if record.embedding.is_empty() {
            return Err(HarnessError::validation(format!(
                "record '{}' has an empty embedding",
                record.id
            )));
        }
        match dims {
            Some(d) if d != record.embedding.len() => {
                return Err(HarnessError::validation(format!(
                    "record '{}' has {} dimensions, collection uses {}",
                    record.id,
                    record.embedding.len(),
                    d
                )))
            }
            Some(_) => {}
            None => dims = Some(record.embedding.len()),
        }
    }
    Ok(dims)
}

/// Reject a query vector whose length differs from the stored vectors.
pub fn check_query_dims(stored_dims: Option<usize>, embedding: &[f32]) -> Result<()> {
    match stored_dims {
        Some(d) if d != embedding.len() => Err(HarnessError::validation(format!(
            "query has {} dimensions, collection uses {}",
            embedding.len(),
            d
        ))),
        _ => Ok(()),
    }
}

/// Reject batches that name the same id twice.
pub fn check_unique_ids(records: &[VectorRecord]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(HarnessError::validation(format!(
                "duplicate id '{}' in batch",
                record.id
            )));
        }
    }
    Ok(())
}
