//! Document ingestion: load, validate, chunk, embed, store.
//!
//! The external connector hands over a JSON array of
//! `{id, content, metadata}` objects. `kbh ingest` validates the whole
//! batch before touching the database, chunks long documents, and upserts
//! every chunk in a single atomic batch.
//!
//! ```text
//! docs.json ──▶ load_documents ──▶ chunk_documents ──▶ VectorCollection::upsert
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use kb_harness_core::chunk::chunk_documents;
use kb_harness_core::error::HarnessError;
use kb_harness_core::models::{parse_documents, Document};

use crate::collection::open_collection;
use crate::config::Config;

/// Read and validate a connector batch.
///
/// Malformed JSON or a non-array root is a [`HarnessError::Format`] naming
/// the file (and line/column for syntax errors); an invalid element
/// rejects the whole batch with [`HarnessError::Validation`].
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    Ok(parse_batch(&path.display().to_string(), &text)?)
}

fn parse_batch(source_name: &str, text: &str) -> kb_harness_core::Result<Vec<Document>> {
    let root: Value = serde_json::from_str(text).map_err(|e| {
        HarnessError::format(
            source_name,
            format!("line {}, column {}: {}", e.line(), e.column(), e),
        )
    })?;
    let values = root.as_array().ok_or_else(|| {
        HarnessError::format(source_name, "expected a JSON array of documents")
    })?;
    parse_documents(values)
}

/// Options for [`run_ingest`].
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Collection name overriding `[collection] name`.
    pub collection: Option<String>,
    /// Delete every existing record before writing.
    pub clear_existing: bool,
    /// Report counts without writing anything.
    pub dry_run: bool,
    /// Query to run against the collection after ingesting.
    pub test_search: Option<String>,
}

pub async fn run_ingest(config: &Config, file: &Path, options: &IngestOptions) -> Result<()> {
    let docs = load_documents(file)?;
    let doc_count = docs.len();
    let chunks = chunk_documents(docs, config.chunking.max_size, config.chunking.overlap);
    info!(
        documents = doc_count,
        chunks = chunks.len(),
        "Loaded documents"
    );

    if options.dry_run {
        println!("ingest {} (dry-run)", file.display());
        println!("  documents found: {}", doc_count);
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let collection = open_collection(config, options.collection.as_deref()).await?;

    // Clearing and writing happen in one batch: a failed ingest keeps the old index.
    let mut cleared = 0;
    if options.clear_existing {
        cleared = collection.replace_all(&chunks).await?;
        info!(removed = cleared, "Replaced existing records");
    } else {
        collection.upsert(&chunks).await?;
    }
    let written = chunks.len();
    let stats = collection.info().await?;

    println!("ingest {}", file.display());
    println!("  documents: {}", doc_count);
    if options.clear_existing {
        println!("  cleared records: {}", cleared);
    }
    println!("  chunks written: {}", written);
    println!("  collection: {} ({} records)", stats.name, stats.count);
    println!("ok");

    if let Some(query) = options.test_search.as_deref() {
        println!();
        println!("test search: \"{}\"", query);
        let hits = collection.search(query, 3, None).await?;
        if hits.is_empty() {
            println!("No results.");
        }
        for (i, hit) in hits.iter().enumerate() {
            let title = hit
                .metadata
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or(hit.id.as_str());
            let preview: String = hit.content.chars().take(100).collect();
            println!("{}. {}", i + 1, title);
            println!("    preview: \"{}...\"", preview.replace('\n', " ").trim());
            println!("    distance: {:.4}", hit.distance);
        }
    }

    Ok(())
}
