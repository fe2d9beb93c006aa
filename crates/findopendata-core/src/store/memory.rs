//! In-memory [`SketchStore`] for tests and embedding.
//!
//! Tables and columns live in `BTreeMap`s behind `std::sync::RwLock`, so
//! `scan` gets id order for free. Column ids are sequential
//! (`col-00000001`, ...) and therefore sort in insertion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::column::ColumnSketchRecord;

use super::{ColumnMetadata, SketchEntry, SketchStore, TableRecord};

struct StoredColumn {
    table_id: String,
    record: ColumnSketchRecord,
}

impl StoredColumn {
    fn entry(&self, id: &str) -> SketchEntry {
        SketchEntry {
            id: id.to_string(),
            table_id: self.table_id.clone(),
            signature: self.record.signature.clone(),
            distinct_count: self.record.distinct_count,
            count: self.record.count,
            empty_count: self.record.empty_count,
        }
    }
}

pub struct InMemoryStore {
    tables: RwLock<BTreeMap<String, TableRecord>>,
    columns: RwLock<BTreeMap<String, StoredColumn>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            columns: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored column sketches.
    pub fn len(&self) -> usize {
        self.columns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SketchStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<SketchEntry>> {
        let columns = self.columns.read().unwrap_or_else(PoisonError::into_inner);
        Ok(columns.get(id).map(|c| c.entry(id)))
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<SketchEntry>> {
        use std::ops::Bound;

        let columns = self.columns.read().unwrap_or_else(PoisonError::into_inner);
        let lower = match after {
            Some(a) => Bound::Excluded(a.to_string()),
            None => Bound::Unbounded,
        };
        Ok(columns
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, c)| c.entry(id))
            .collect())
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<ColumnMetadata>> {
        let columns = self.columns.read().unwrap_or_else(PoisonError::into_inner);
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(columns.get(id).and_then(|c| {
            tables.get(&c.table_id).map(|t| ColumnMetadata {
                id: id.to_string(),
                column_name: c.record.column_name.clone(),
                table_id: t.id.clone(),
                table_name: t.name.clone(),
                source: t.source.clone(),
                sample: c.record.sample.clone(),
            })
        }))
    }

    async fn get_table(&self, source: &str, name: &str) -> Result<Option<TableRecord>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .values()
            .find(|t| t.source == source && t.name == name)
            .cloned())
    }

    async fn upsert_table(&self, table: &TableRecord) -> Result<String> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let existing = tables
            .values()
            .find(|t| t.source == table.source && t.name == table.name)
            .cloned();
        let stored = match existing {
            Some(prev) => TableRecord {
                id: prev.id,
                created_at: prev.created_at,
                ..table.clone()
            },
            None => table.clone(),
        };
        let id = stored.id.clone();
        tables.insert(id.clone(), stored);
        Ok(id)
    }

    async fn replace_columns(
        &self,
        table_id: &str,
        columns: &[ColumnSketchRecord],
    ) -> Result<Vec<String>> {
        let mut stored = self.columns.write().unwrap_or_else(PoisonError::into_inner);
        let previous: BTreeMap<String, String> = stored
            .iter()
            .filter(|(_, c)| c.table_id == table_id)
            .map(|(id, c)| (c.record.column_name.clone(), id.clone()))
            .collect();
        for id in previous.values() {
            stored.remove(id);
        }

        let mut ids = Vec::with_capacity(columns.len());
        for record in columns {
            let id = match previous.get(&record.column_name) {
                Some(id) => id.clone(),
                None => format!("col-{:08}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            };
            stored.insert(
                id.clone(),
                StoredColumn {
                    table_id: table_id.to_string(),
                    record: record.clone(),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }
}
