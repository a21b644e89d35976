//! Opening the configured collection.
//!
//! Wires the SQLite store, the configured embedder (with its cache) and a
//! collection name into a bound [`VectorCollection`]. Every command that
//! touches stored records goes through [`open_collection`].

use std::sync::Arc;

use anyhow::Result;

use kb_harness_core::collection::VectorCollection;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Connect, apply the schema and bind a collection handle.
///
/// `name` overrides `[collection] name` when given.
pub async fn open_collection(config: &Config, name: Option<&str>) -> Result<VectorCollection> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool));
    let embedder = create_embedder(&config.embedding)?;
    let mut collection = VectorCollection::new(store, embedder);
    collection
        .create_or_get(name.unwrap_or(&config.collection.name))
        .await?;
    Ok(collection)
}
