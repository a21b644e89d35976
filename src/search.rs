//! `kbh search`: similarity search over the configured collection.
//!
//! Prints hits ascending by distance (most similar first). `--where
//! key=value` pairs restrict results to records whose metadata matches
//! every pair.

use anyhow::{bail, Result};

use kb_harness_core::filter::MetadataFilter;
use kb_harness_core::models::SearchResult;

use crate::collection::open_collection;
use crate::config::Config;

pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    filters: &[String],
    collection_name: Option<&str>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query must be non-empty.");
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let filter = MetadataFilter::parse_pairs(filters)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let collection = open_collection(config, collection_name).await?;
    let hits = collection.search(query, k, Some(&filter)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[SearchResult]) {
    for (i, hit) in hits.iter().enumerate() {
        let title = hit
            .metadata
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("(untitled)");
        let excerpt: String = hit.content.chars().take(240).collect();

        println!("{}. [{:.4}] {}", i + 1, hit.distance, title);
        if let Some(url) = hit.metadata.get("url").and_then(|u| u.as_str()) {
            println!("    url: {}", url);
        }
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    id: {}", hit.id);
        println!();
    }
}
