//! Database statistics.
//!
//! `fod stats` summarizes what has been sketched: table and column counts,
//! how many column sketches pass the index cardinality filter, and a
//! per-source breakdown.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Same rule as `findopendata_core::query::is_indexable`, in SQL.
const INDEXABLE: &str = "count > empty_count AND (distinct_count >= 50 OR \
     (distinct_count >= 10 AND CAST(distinct_count AS REAL) / (count - empty_count) >= 0.9))";

struct SourceStats {
    source: String,
    table_count: i64,
    column_count: i64,
    indexable_count: i64,
    last_sketch_ts: Option<i64>,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tables")
        .fetch_one(&pool)
        .await?;

    let total_columns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM column_sketches")
        .fetch_one(&pool)
        .await?;

    let total_indexable: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM column_sketches WHERE {}",
        INDEXABLE
    ))
    .fetch_one(&pool)
    .await?;

    let total_records: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(record_count), 0) FROM tables")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Find Open Data — Sketch Stats");
    println!("=============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Tables:      {}", total_tables);
    println!("  Records:     {}", total_records);
    println!("  Columns:     {}", total_columns);
    println!(
        "  Indexable:   {} / {} ({}%)",
        total_indexable,
        total_columns,
        if total_columns > 0 {
            (total_indexable * 100) / total_columns
        } else {
            0
        }
    );

    let source_rows = sqlx::query(&format!(
        r#"
        SELECT
            t.source,
            COUNT(DISTINCT t.id) AS table_count,
            COUNT(c.id) AS column_count,
            COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) AS indexable_count,
            MAX(t.updated_at) AS last_sketch_ts
        FROM tables t
        LEFT JOIN column_sketches c ON c.table_id = t.id
        GROUP BY t.source
        ORDER BY table_count DESC, t.source
        "#,
        INDEXABLE
    ))
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            table_count: row.get("table_count"),
            column_count: row.get("column_count"),
            indexable_count: row.get("indexable_count"),
            last_sketch_ts: row.get("last_sketch_ts"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<24} {:>6} {:>8} {:>10}   {}",
            "SOURCE", "TABLES", "COLUMNS", "INDEXABLE", "LAST SKETCH"
        );
        println!("  {}", "-".repeat(76));

        for s in &source_stats {
            let sketch_display = match s.last_sketch_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>6} {:>8} {:>10}   {}",
                s.source, s.table_count, s.column_count, s.indexable_count, sketch_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Relative time for recent timestamps ("3 hours ago"), a date otherwise.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
