//! Named vector collection handle.
//!
//! [`VectorCollection`] ties a [`VectorStore`] backend to an [`Embedder`]
//! and a collection name. Every operation except
//! [`create_or_get`](VectorCollection::create_or_get) fails with
//! [`HarnessError::NotInitialized`] until a name has been bound.
//!
//! Embeddings for a batch are computed before anything is written, so an
//! embedding failure never leaves a partial batch behind.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::embedding::{embed_one, Embedder};
use crate::error::{HarnessError, Result};
use crate::filter::MetadataFilter;
use crate::models::{validate_metadata, CollectionInfo, Document, Metadata, SearchResult, VectorRecord};
use crate::store::VectorStore;

/// Metadata key that names the similarity metric of a collection.
pub const SPACE_KEY: &str = "hnsw:space";
/// The only similarity metric collections use.
pub const COSINE_SPACE: &str = "cosine";

/// A handle on one named collection.
pub struct VectorCollection {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    name: Option<String>,
}

impl VectorCollection {
    /// Create an unbound handle. Call [`create_or_get`](Self::create_or_get)
    /// before anything else.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            name: None,
        }
    }

    /// Create the collection if it does not exist and bind this handle to
    /// it. Calling it again with the same name is a no-op.
    pub async fn create_or_get(&mut self, name: &str) -> Result<CollectionInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HarnessError::validation("collection name must be non-empty"));
        }

        let mut metadata = Metadata::new();
        metadata.insert(SPACE_KEY.into(), Value::from(COSINE_SPACE));
        self.store.get_or_create_collection(name, &metadata).await?;

        if self.name.as_deref() != Some(name) {
            info!(collection = name, "Collection ready");
        }
        self.name = Some(name.to_string());
        self.store.info(name).await
    }

    /// The bound collection name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn bound(&self) -> Result<&str> {
        self.name.as_deref().ok_or(HarnessError::NotInitialized)
    }

    /// Embed and insert-or-replace a batch of documents.
    pub async fn upsert(&self, docs: &[Document]) -> Result<usize> {
        let name = self.bound()?;
        let records = self.embed_documents(docs).await?;
        self.store.upsert(name, &records).await?;
        debug!(collection = name, count = records.len(), "Upserted records");
        Ok(records.len())
    }

    /// Insert-or-replace documents whose embeddings were computed elsewhere.
    pub async fn upsert_with_embeddings(
        &self,
        docs: &[Document],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize> {
        let name = self.bound()?;
        if docs.len() != embeddings.len() {
            return Err(HarnessError::validation(format!(
                "{} documents but {} embeddings",
                docs.len(),
                embeddings.len()
            )));
        }
        let records = docs
            .iter()
            .zip(embeddings)
            .map(|(doc, embedding)| to_record(doc, embedding))
            .collect::<Result<Vec<_>>>()?;
        self.store.upsert(name, &records).await?;
        Ok(records.len())
    }

    /// Replace existing records. Fails without writing if any id is unknown.
    pub async fn update(&self, docs: &[Document]) -> Result<usize> {
        let name = self.bound()?;
        let records = self.embed_documents(docs).await?;
        self.store.update(name, &records).await?;
        Ok(records.len())
    }

    /// Remove records by id, returning how many existed.
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let name = self.bound()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(name, ids).await?;
        debug!(collection = name, requested = ids.len(), removed, "Deleted records");
        Ok(removed)
    }

    /// Return up to `k` records most similar to `query`, ascending by
    /// distance, optionally restricted by a metadata filter.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let name = self.bound()?;
        if query.trim().is_empty() {
            return Err(HarnessError::validation("query must be non-empty"));
        }
        let empty = MetadataFilter::new();
        let filter = filter.unwrap_or(&empty);
        filter.validate()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = embed_one(self.embedder.as_ref(), query).await?;
        self.store.query(name, &embedding, k, filter).await
    }

    pub async fn info(&self) -> Result<CollectionInfo> {
        let name = self.bound()?;
        self.store.info(name).await
    }

    /// Fetch stored records by id as documents (embeddings omitted).
    pub async fn get(&self, ids: &[String]) -> Result<Vec<Document>> {
        let name = self.bound()?;
        let records = self.store.get(name, ids).await?;
        Ok(records.into_iter().map(to_document).collect())
    }

    pub async fn ids(&self) -> Result<Vec<String>> {
        let name = self.bound()?;
        self.store.ids(name).await
    }

    /// The first `limit` records ordered by id.
    pub async fn peek(&self, limit: usize) -> Result<Vec<Document>> {
        let mut ids = self.ids().await?;
        ids.truncate(limit);
        self.get(&ids).await
    }

    /// Replace the whole collection with `docs` and return how many old
    /// records were removed.
    ///
    /// The batch is embedded first. If embedding or writing fails, the
    /// previous contents are left untouched.
    pub async fn replace_all(&self, docs: &[Document]) -> Result<usize> {
        let name = self.bound()?;
        let records = self.embed_documents(docs).await?;
        let removed = self.store.replace_all(name, &records).await?;
        debug!(
            collection = name,
            removed,
            written = records.len(),
            "Replaced collection contents"
        );
        Ok(removed)
    }

    /// Delete every record, in batches of `batch_size` ids.
    pub async fn clear(&self, batch_size: usize) -> Result<usize> {
        let ids = self.ids().await?;
        let mut removed = 0;
        for batch in ids.chunks(batch_size.max(1)) {
            removed += self.delete(batch).await?;
        }
        Ok(removed)
    }

    async fn embed_documents(&self, docs: &[Document]) -> Result<Vec<VectorRecord>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let texts = docs
            .iter()
            .map(|doc| document_text(doc).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        for doc in docs {
            validate_metadata(&doc.id, &doc.metadata)?;
        }

        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != docs.len() {
            return Err(HarnessError::external(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                docs.len()
            )));
        }

        docs.iter()
            .zip(embeddings)
            .map(|(doc, embedding)| to_record(doc, embedding))
            .collect()
    }
}

fn document_text(doc: &Document) -> Result<&str> {
    if doc.id.trim().is_empty() {
        return Err(HarnessError::validation("record id must be non-empty"));
    }
    match doc.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(HarnessError::validation(format!(
            "record '{}' has no text content",
            doc.id
        ))),
    }
}

fn to_record(doc: &Document, embedding: Vec<f32>) -> Result<VectorRecord> {
    let content = document_text(doc)?.to_string();
    validate_metadata(&doc.id, &doc.metadata)?;
    Ok(VectorRecord {
        id: doc.id.clone(),
        content,
        metadata: doc.metadata.clone(),
        embedding,
    })
}

fn to_document(record: VectorRecord) -> Document {
    Document {
        id: record.id,
        content: Some(record.content),
        metadata: record.metadata,
    }
}
