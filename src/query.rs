//! `fod query`: rank joinable columns for one column sketch id.
//!
//! Builds the LSH index from the sketch database, then delegates ranking to
//! [`JoinabilityService`].

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use findopendata_core::query::{JoinQuery, JoinabilityService, JoinableColumn};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Construct the service over `pool` and build its first index generation.
///
/// A bootstrap failure is returned as is; callers must not serve without an
/// index.
pub async fn build_service(
    config: &Config,
    pool: SqlitePool,
) -> Result<JoinabilityService<SqliteStore>> {
    let store = Arc::new(SqliteStore::new(pool));
    let service = JoinabilityService::new(store, config.service_config())?;
    service.rebuild().await?;
    Ok(service)
}

pub async fn query_columns(
    config: &Config,
    id: &str,
    source: Option<String>,
    limit: Option<usize>,
) -> Result<Vec<JoinableColumn>> {
    let pool = db::connect(config).await?;
    let result = async {
        let service = build_service(config, pool.clone()).await?;
        let results = service
            .query(&JoinQuery {
                id: id.to_string(),
                source_filter: source,
                limit,
            })
            .await?;
        Ok::<_, anyhow::Error>(results)
    }
    .await;
    pool.close().await;
    result
}

pub async fn run_query(
    config: &Config,
    id: &str,
    source: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let results = query_columns(config, id, source, limit).await?;

    if results.is_empty() {
        println!("No joinable columns.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {} / {}",
            i + 1,
            result.containment,
            result.source,
            result.table_name,
            result.column_name
        );
        println!("    jaccard: {:.3}", result.jaccard);
        if !result.sample.is_empty() {
            let preview: Vec<&str> = result.sample.iter().take(5).map(|s| s.as_str()).collect();
            println!("    sample: {}", preview.join(", "));
        }
        println!("    table: {}", result.table_id);
        println!("    id: {}", result.id);
        println!();
    }

    Ok(())
}
