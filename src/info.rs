//! `kbh info`, `kbh peek` and `kbh delete`: collection inspection and
//! maintenance.

use anyhow::{bail, Result};

use crate::collection::open_collection;
use crate::config::Config;

/// Print `{name, count, metadata}` as JSON.
pub async fn run_info(config: &Config, collection_name: Option<&str>) -> Result<()> {
    let collection = open_collection(config, collection_name).await?;
    let info = collection.info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// Print the first `limit` records ordered by id.
pub async fn run_peek(config: &Config, limit: usize, collection_name: Option<&str>) -> Result<()> {
    let collection = open_collection(config, collection_name).await?;
    let docs = collection.peek(limit).await?;
    if docs.is_empty() {
        println!("Collection is empty.");
        return Ok(());
    }
    for doc in docs {
        let preview: String = doc.text().unwrap_or_default().chars().take(120).collect();
        println!("{}", doc.id);
        println!("    metadata: {}", serde_json::Value::Object(doc.metadata));
        println!("    content: \"{}\"", preview.replace('\n', " ").trim());
    }
    Ok(())
}

pub async fn run_delete(
    config: &Config,
    ids: &[String],
    collection_name: Option<&str>,
) -> Result<()> {
    if ids.is_empty() {
        bail!("Give at least one record id to delete.");
    }
    let collection = open_collection(config, collection_name).await?;
    let removed = collection.delete(ids).await?;
    println!("deleted {} of {} records", removed, ids.len());
    Ok(())
}
