//! SQLite-backed [`VectorStore`] implementation.
//!
//! Records live in the `records` table keyed by `(collection, id)`.
//! Every batch runs inside one transaction, so a failed `upsert`,
//! `update` or `delete` leaves the collection untouched and readers never
//! see half of a batch. Search loads the collection's vectors and ranks
//! them with the same brute-force cosine scan as the in-memory store.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use kb_harness_core::embedding::{blob_to_vec, vec_to_blob};
use kb_harness_core::error::{HarnessError, Result};
use kb_harness_core::filter::MetadataFilter;
use kb_harness_core::models::{CollectionInfo, Metadata, SearchResult, VectorRecord};
use kb_harness_core::store::{
    check_dims, check_query_dims, check_unique_ids, rank, VectorStore,
};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(storage)
    }
}

fn storage(e: sqlx::Error) -> HarnessError {
    HarnessError::storage(e.to_string())
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn decode_metadata(owner: &str, json: &str) -> Result<Metadata> {
    serde_json::from_str(json).map_err(|e| {
        HarnessError::format(
            format!("metadata of '{}'", owner),
            format!("line {}, column {}: {}", e.line(), e.column(), e),
        )
    })
}

fn encode_metadata(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| HarnessError::storage(e.to_string()))
}

fn row_to_record(row: &SqliteRow) -> Result<VectorRecord> {
    let id: String = row.get("id");
    let metadata_json: String = row.get("metadata_json");
    let blob: Vec<u8> = row.get("embedding");
    Ok(VectorRecord {
        metadata: decode_metadata(&id, &metadata_json)?,
        content: row.get("content"),
        embedding: blob_to_vec(&blob),
        id,
    })
}

async fn ensure_exists(tx: &mut Transaction<'static, Sqlite>, collection: &str) -> Result<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_one(&mut **tx)
            .await
            .map_err(storage)?;
    if exists {
        Ok(())
    } else {
        Err(missing(collection))
    }
}

fn missing(name: &str) -> HarnessError {
    HarnessError::storage(format!("collection '{}' does not exist", name))
}

/// Vector length of the stored records, ignoring `excluding` ids.
async fn stored_dims(
    tx: &mut Transaction<'static, Sqlite>,
    collection: &str,
    excluding: &[VectorRecord],
) -> Result<Option<usize>> {
    let rows = sqlx::query("SELECT id, dims FROM records WHERE collection = ?")
        .bind(collection)
        .fetch_all(&mut **tx)
        .await
        .map_err(storage)?;
    Ok(rows
        .iter()
        .filter(|row| {
            let id: String = row.get("id");
            !excluding.iter().any(|r| r.id == id)
        })
        .map(|row| row.get::<i64, _>("dims") as usize)
        .next())
}

async fn write_records(
    tx: &mut Transaction<'static, Sqlite>,
    collection: &str,
    records: &[VectorRecord],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, content, metadata_json, embedding, dims, hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                content = excluded.content,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding,
                dims = excluded.dims,
                hash = excluded.hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(&record.id)
        .bind(&record.content)
        .bind(encode_metadata(&record.metadata)?)
        .bind(vec_to_blob(&record.embedding))
        .bind(record.embedding.len() as i64)
        .bind(content_hash(&record.content))
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> Result<Metadata> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO collections (name, metadata_json, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(encode_metadata(metadata)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let stored: String =
            sqlx::query_scalar("SELECT metadata_json FROM collections WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        decode_metadata(name, &stored)
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        check_unique_ids(records)?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        // Only records outside the batch constrain its dimensions.
        let dims = stored_dims(&mut tx, collection, records).await?;
        check_dims(dims, records)?;

        write_records(&mut tx, collection, records).await?;
        tx.commit().await.map_err(storage)
    }

    async fn update(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        check_unique_ids(records)?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        for record in records {
            let exists: bool = sqlx::query_scalar(
                "SELECT COUNT(*) > 0 FROM records WHERE collection = ? AND id = ?",
            )
            .bind(collection)
            .bind(&record.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
            if !exists {
                return Err(HarnessError::validation(format!(
                    "cannot update unknown id '{}'",
                    record.id
                )));
            }
        }
        let dims = stored_dims(&mut tx, collection, &[]).await?;
        check_dims(dims, records)?;

        write_records(&mut tx, collection, records).await?;
        tx.commit().await.map_err(storage)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        let mut removed = 0u64;
        for id in ids {
            let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            removed += result.rows_affected();
        }
        tx.commit().await.map_err(storage)?;
        Ok(removed as usize)
    }

    async fn replace_all(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        check_unique_ids(records)?;
        check_dims(None, records)?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        write_records(&mut tx, collection, records).await?;
        tx.commit().await.map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
        check_query_dims(records.first().map(|r| r.embedding.len()), embedding)?;
        Ok(rank(&records, embedding, k, filter))
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT id, content, metadata_json, embedding FROM records
                 WHERE collection = ? AND id = ?",
            )
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
            if let Some(row) = row {
                records.push(row_to_record(&row)?);
            }
        }
        tx.commit().await.map_err(storage)?;
        Ok(records)
    }

    async fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, collection).await?;
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM records WHERE collection = ? ORDER BY id ASC")
                .bind(collection)
                .fetch_all(&mut *tx)
                .await
                .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(ids)
    }

    async fn info(&self, collection: &str) -> Result<CollectionInfo> {
        let row = sqlx::query(
            "SELECT c.metadata_json,
                    (SELECT COUNT(*) FROM records r WHERE r.collection = c.name) AS count
             FROM collections c WHERE c.name = ?",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| missing(collection))?;

        let metadata_json: String = row.get("metadata_json");
        let count: i64 = row.get("count");
        Ok(CollectionInfo {
            name: collection.to_string(),
            count: count as usize,
            metadata: decode_metadata(collection, &metadata_json)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        let mut meta = Metadata::new();
        meta.insert("hnsw:space".into(), json!("cosine"));
        store.get_or_create_collection("docs", &meta).await.unwrap();
        store
    }

    fn rec(id: &str, content: &str, embedding: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), json!(format!("Title {}", id)));
        VectorRecord {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_create_keeps_original_metadata() {
        let store = store().await;
        let mut other = Metadata::new();
        other.insert("hnsw:space".into(), json!("l2"));
        let meta = store.get_or_create_collection("docs", &other).await.unwrap();
        assert_eq!(meta.get("hnsw:space"), Some(&json!("cosine")));
    }

    #[tokio::test]
    async fn test_upsert_query_and_replace() {
        let store = store().await;
        store
            .upsert(
                "docs",
                &[rec("a", "alpha", vec![1.0, 0.0]), rec("b", "beta", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        store
            .upsert("docs", &[rec("a", "alpha v2", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .query("docs", &[1.0, 0.0], 5, &MetadataFilter::new())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].content, "alpha v2");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[0].metadata.get("title"), Some(&json!("Title a")));
        assert_eq!(store.info("docs").await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_writes_nothing() {
        let store = store().await;
        store.upsert("docs", &[rec("a", "alpha", vec![1.0, 0.0])]).await.unwrap();
        let err = store
            .upsert(
                "docs",
                &[rec("b", "beta", vec![0.0, 1.0]), rec("c", "gamma", vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
        assert_eq!(store.ids("docs").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_atomic() {
        let store = store().await;
        store.upsert("docs", &[rec("a", "alpha", vec![1.0, 0.0])]).await.unwrap();
        let err = store
            .update(
                "docs",
                &[rec("a", "changed", vec![1.0, 0.0]), rec("zzz", "new", vec![0.0, 1.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
        let got = store.get("docs", &["a".to_string()]).await.unwrap();
        assert_eq!(got[0].content, "alpha");
    }

    #[tokio::test]
    async fn test_delete_and_get() {
        let store = store().await;
        store
            .upsert(
                "docs",
                &[rec("a", "alpha", vec![1.0, 0.0]), rec("b", "beta", vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        let removed = store
            .delete("docs", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let got = store
            .get("docs", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents_in_one_batch() {
        let store = store().await;
        store
            .upsert(
                "docs",
                &[rec("a", "alpha", vec![1.0, 0.0]), rec("b", "beta", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let removed = store
            .replace_all("docs", &[rec("c", "gamma", vec![0.0, 0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.ids("docs").await.unwrap(), vec!["c"]);

        let err = store
            .replace_all("docs", &[rec("d", "delta", vec![1.0]), rec("e", "eps", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
        assert_eq!(store.ids("docs").await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_storage_error() {
        let store = store().await;
        let err = store.ids("nope").await.unwrap_err();
        assert!(matches!(err, HarnessError::Storage(_)));
        assert!(store.info("nope").await.is_err());
    }
}
