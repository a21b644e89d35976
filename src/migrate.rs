//! Database schema migrations.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running the
//! migrations repeatedly is safe. `kbh init` calls [`run_migrations`];
//! every command that opens the store calls [`apply`] on its pool first.
//!
//! # Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `collections` | One row per named collection with its metadata |
//! | `records` | Text, metadata and embedding BLOB per record id |

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embeddings are little-endian f32 BLOBs; `dims` is the vector length
    // and `hash` the SHA-256 of the content that was embedded.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Connect to the configured database and create the schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}
