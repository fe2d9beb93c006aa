//! SQLite-backed [`SketchStore`] implementation.
//!
//! Maps each store operation onto the `tables` and `column_sketches`
//! schema created by [`migrate`](crate::migrate). Signatures are stored as
//! little-endian `u64` blobs; seeds and counters as `INTEGER` (bit-cast
//! from `u64`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use findopendata_core::column::ColumnSketchRecord;
use findopendata_core::minhash::MinHashSignature;
use findopendata_core::store::{ColumnMetadata, SketchEntry, SketchStore, TableRecord};
use findopendata_core::value::Record;

/// SQLite implementation of the [`SketchStore`] trait.
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
}

pub fn signature_to_blob(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_signature(blob: &[u8]) -> Result<Vec<u64>> {
    if blob.len() % 8 != 0 {
        bail!("signature blob length {} is not a multiple of 8", blob.len());
    }
    Ok(blob
        .chunks_exact(8)
        .map(|c| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(c);
            u64::from_le_bytes(bytes)
        })
        .collect())
}

const ENTRY_COLUMNS: &str = "id, table_id, seed, signature, distinct_count, count, empty_count";

fn row_to_entry(row: &SqliteRow) -> Result<SketchEntry> {
    let id: String = row.get("id");
    let blob: Vec<u8> = row.get("signature");
    let values = blob_to_signature(&blob).with_context(|| format!("column sketch {}", id))?;
    Ok(SketchEntry {
        table_id: row.get("table_id"),
        signature: MinHashSignature::new(row.get::<i64, _>("seed") as u64, values),
        distinct_count: row.get::<i64, _>("distinct_count") as u64,
        count: row.get::<i64, _>("count") as u64,
        empty_count: row.get::<i64, _>("empty_count") as u64,
        id,
    })
}

fn row_to_table(row: &SqliteRow) -> Result<TableRecord> {
    let sample_json: String = row.get("record_sample_json");
    let record_sample: Vec<Record> =
        serde_json::from_str(&sample_json).context("malformed record_sample_json")?;
    Ok(TableRecord {
        id: row.get("id"),
        source: row.get("source"),
        name: row.get("name"),
        content_hash: row.get("content_hash"),
        record_sample,
        record_count: row.get::<i64, _>("record_count") as u64,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl SketchStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<SketchEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM column_sketches WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<SketchEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM column_sketches WHERE (? IS NULL OR id > ?) ORDER BY id LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(after)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<ColumnMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.column_name, c.sample_json, t.id AS table_id, t.name AS table_name, t.source
            FROM column_sketches c
            JOIN tables t ON t.id = c.table_id
            WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let sample_json: String = row.get("sample_json");
                Ok(Some(ColumnMetadata {
                    id: row.get("id"),
                    column_name: row.get("column_name"),
                    table_id: row.get("table_id"),
                    table_name: row.get("table_name"),
                    source: row.get("source"),
                    sample: serde_json::from_str(&sample_json)
                        .context("malformed sample_json")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn get_table(&self, source: &str, name: &str) -> Result<Option<TableRecord>> {
        let row = sqlx::query("SELECT * FROM tables WHERE source = ? AND name = ?")
            .bind(source)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_table).transpose()
    }

    async fn upsert_table(&self, table: &TableRecord) -> Result<String> {
        let sample_json = serde_json::to_string(&table.record_sample)?;
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO tables (id, source, name, content_hash, record_sample_json,
                                record_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, name) DO UPDATE SET
                content_hash = excluded.content_hash,
                record_sample_json = excluded.record_sample_json,
                record_count = excluded.record_count,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&table.id)
        .bind(&table.source)
        .bind(&table.name)
        .bind(&table.content_hash)
        .bind(&sample_json)
        .bind(table.record_count as i64)
        .bind(table.created_at)
        .bind(table.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn replace_columns(
        &self,
        table_id: &str,
        columns: &[ColumnSketchRecord],
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let names: Vec<&str> = columns.iter().map(|c| c.column_name.as_str()).collect();
        let names_json = serde_json::to_string(&names)?;
        sqlx::query(
            "DELETE FROM column_sketches WHERE table_id = ? AND column_name NOT IN (SELECT value FROM json_each(?))",
        )
        .bind(table_id)
        .bind(&names_json)
        .execute(&mut *tx)
        .await?;

        let mut ids = Vec::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            let id: String = sqlx::query_scalar(
                r#"
                INSERT INTO column_sketches (id, table_id, column_name, position, seed, signature,
                                             hll_registers, sample_json, count, empty_count,
                                             numeric_count, distinct_count, is_numeric)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(table_id, column_name) DO UPDATE SET
                    position = excluded.position,
                    seed = excluded.seed,
                    signature = excluded.signature,
                    hll_registers = excluded.hll_registers,
                    sample_json = excluded.sample_json,
                    count = excluded.count,
                    empty_count = excluded.empty_count,
                    numeric_count = excluded.numeric_count,
                    distinct_count = excluded.distinct_count,
                    is_numeric = excluded.is_numeric
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(table_id)
            .bind(&column.column_name)
            .bind(position as i64)
            .bind(column.signature.seed as i64)
            .bind(signature_to_blob(&column.signature.values))
            .bind(&column.hll_registers)
            .bind(serde_json::to_string(&column.sample)?)
            .bind(column.count as i64)
            .bind(column.empty_count as i64)
            .bind(column.numeric_count as i64)
            .bind(column.distinct_count as i64)
            .bind(column.is_numeric)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }
}
