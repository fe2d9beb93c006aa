//! Storage abstraction for persisted sketches.
//!
//! The [`SketchStore`] trait is everything the index bootstrap and the
//! joinability query service need from a backend: point lookups, an
//! id-ordered keyset scan, and persistence of freshly built table sketches.
//! The SQLite backend lives in the application crate; [`memory`] provides
//! an in-process implementation for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::column::ColumnSketchRecord;
use crate::minhash::MinHashSignature;
use crate::value::Record;

/// The slice of a persisted column sketch used for indexing and ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct SketchEntry {
    /// Column sketch id.
    pub id: String,
    /// Owning table id.
    pub table_id: String,
    pub signature: MinHashSignature,
    pub distinct_count: u64,
    pub count: u64,
    pub empty_count: u64,
}

impl SketchEntry {
    pub fn seed(&self) -> u64 {
        self.signature.seed
    }

    pub fn non_empty_count(&self) -> u64 {
        self.count.saturating_sub(self.empty_count)
    }
}

/// Display metadata for a column, joined with its table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMetadata {
    pub id: String,
    pub column_name: String,
    pub table_id: String,
    pub table_name: String,
    pub source: String,
    pub sample: Vec<String>,
}

/// A persisted table: identity, provenance and its verbatim row sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRecord {
    pub id: String,
    /// Publishing host or other origin label.
    pub source: String,
    pub name: String,
    /// SHA-256 hex digest of the sketched file.
    pub content_hash: String,
    pub record_sample: Vec<Record>,
    pub record_count: u64,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Abstract sketch store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](SketchStore::get) | Fetch one column sketch by id |
/// | [`scan`](SketchStore::scan) | Keyset page of sketches in id order |
/// | [`get_metadata`](SketchStore::get_metadata) | Column + table display fields |
/// | [`get_table`](SketchStore::get_table) | Look up a table by `(source, name)` |
/// | [`upsert_table`](SketchStore::upsert_table) | Insert or update a table |
/// | [`replace_columns`](SketchStore::replace_columns) | Replace a table's column sketches |
#[async_trait]
pub trait SketchStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SketchEntry>>;

    /// Up to `limit` sketches with id strictly greater than `after`, in
    /// ascending id order. `after = None` starts from the beginning.
    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<SketchEntry>>;

    async fn get_metadata(&self, id: &str) -> Result<Option<ColumnMetadata>>;

    async fn get_table(&self, source: &str, name: &str) -> Result<Option<TableRecord>>;

    /// Insert or update a table keyed on `(source, name)`.
    ///
    /// Returns the stored table id: the existing one on update, otherwise
    /// `table.id`.
    async fn upsert_table(&self, table: &TableRecord) -> Result<String>;

    /// Replace every column sketch of `table_id`.
    ///
    /// Columns are matched by name, so a re-sketched column keeps its id;
    /// columns absent from `columns` are removed. Returns the column ids in
    /// the order given.
    async fn replace_columns(
        &self,
        table_id: &str,
        columns: &[ColumnSketchRecord],
    ) -> Result<Vec<String>>;
}
