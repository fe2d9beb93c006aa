use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per sketched file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tables (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            name TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            record_sample_json TEXT NOT NULL DEFAULT '[]',
            record_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source, name)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Signatures are little-endian u64 blobs, registers raw bytes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS column_sketches (
            id TEXT PRIMARY KEY,
            table_id TEXT NOT NULL,
            column_name TEXT NOT NULL,
            position INTEGER NOT NULL,
            seed INTEGER NOT NULL,
            signature BLOB NOT NULL,
            hll_registers BLOB NOT NULL,
            sample_json TEXT NOT NULL DEFAULT '[]',
            count INTEGER NOT NULL,
            empty_count INTEGER NOT NULL,
            numeric_count INTEGER NOT NULL,
            distinct_count INTEGER NOT NULL,
            is_numeric INTEGER NOT NULL,
            UNIQUE(table_id, column_name),
            FOREIGN KEY (table_id) REFERENCES tables(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_column_sketches_table_id ON column_sketches(table_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tables_source ON tables(source)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
