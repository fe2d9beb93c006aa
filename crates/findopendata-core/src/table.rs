//! Table-level sketch composed of column sketches.
//!
//! The key order of the first record fixes the column order. Keys that show
//! up later get a fresh [`ColumnSketch`] appended after the existing ones;
//! keys missing from a record simply do not update their column.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::column::{ColumnSketch, ColumnSketchRecord, SketchParams};
use crate::minhash::Permutations;
use crate::value::Record;

pub const DEFAULT_RECORD_SAMPLE_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct TableSketch {
    params: SketchParams,
    perms: Arc<Permutations>,
    columns: IndexMap<String, ColumnSketch>,
    record_sample: Vec<Record>,
    record_sample_size: usize,
    record_count: u64,
}

impl TableSketch {
    pub fn new(params: SketchParams, record_sample_size: usize) -> Self {
        let perms = Arc::new(Permutations::new(params.num_perm, params.seed));
        Self {
            params,
            perms,
            columns: IndexMap::new(),
            record_sample: Vec::new(),
            record_sample_size,
            record_count: 0,
        }
    }

    pub fn update(&mut self, record: &Record) {
        for (name, value) in record {
            if !self.columns.contains_key(name) {
                let sketch =
                    ColumnSketch::with_permutations(name.clone(), self.perms.clone(), &self.params);
                self.columns.insert(name.clone(), sketch);
            }
            if let Some(sketch) = self.columns.get_mut(name) {
                sketch.update(value);
            }
        }
        if self.record_sample.len() < self.record_sample_size {
            self.record_sample.push(record.clone());
        }
        self.record_count += 1;
    }

    /// Feed a fallible record stream, stopping after `limit` records if
    /// set. Nothing past the limit is pulled from the stream.
    pub fn try_extend<I, E>(&mut self, records: I, limit: Option<u64>) -> Result<(), E>
    where
        I: IntoIterator<Item = Result<Record, E>>,
    {
        let mut records = records.into_iter();
        while !limit.is_some_and(|l| self.record_count >= l) {
            match records.next() {
                Some(record) => self.update(&record?),
                None => break,
            }
        }
        Ok(())
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Column sketches in column order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSketch> {
        self.columns.values()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSketch> {
        self.columns.get(name)
    }

    pub fn record_sample(&self) -> &[Record] {
        &self.record_sample
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Freeze all columns, in column order.
    pub fn to_records(&self) -> Vec<ColumnSketchRecord> {
        self.columns.values().map(ColumnSketch::to_record).collect()
    }
}
