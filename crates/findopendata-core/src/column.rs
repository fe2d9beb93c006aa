//! Per-column streaming summary.
//!
//! A [`ColumnSketch`] is created empty when a table scan starts, fed one
//! value per row through [`ColumnSketch::update`], and frozen into a
//! [`ColumnSketchRecord`] when the scan completes.
//!
//! # Update steps
//!
//! 1. Count the row.
//! 2. Normalize the value; an empty result only counts as empty.
//! 3. Count it as numeric if it parses as a float.
//! 4. Add it to the first-seen sample while the sample has room.
//! 5. Fold it into the MinHash signature.
//! 6. Fold it into the HyperLogLog registers.

use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::hll::HyperLogLog;
use crate::minhash::{MinHash, MinHashSignature, Permutations};
use crate::value::{normalize, FieldValue};

pub const DEFAULT_NUM_PERM: usize = 256;
pub const DEFAULT_MINHASH_SEED: u64 = 43;
pub const DEFAULT_HLL_PRECISION: u8 = 8;
pub const DEFAULT_SAMPLE_CAPACITY: usize = 100;

/// Sketch construction parameters shared by every column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchParams {
    pub num_perm: usize,
    pub seed: u64,
    pub hll_precision: u8,
    pub sample_capacity: usize,
}

impl Default for SketchParams {
    fn default() -> Self {
        Self {
            num_perm: DEFAULT_NUM_PERM,
            seed: DEFAULT_MINHASH_SEED,
            hll_precision: DEFAULT_HLL_PRECISION,
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSketch {
    column_name: String,
    minhash: MinHash,
    hll: HyperLogLog,
    sample: IndexSet<String>,
    sample_capacity: usize,
    count: u64,
    empty_count: u64,
    numeric_count: u64,
}

impl ColumnSketch {
    pub fn new(column_name: impl Into<String>, params: &SketchParams) -> Self {
        let perms = Arc::new(Permutations::new(params.num_perm, params.seed));
        Self::with_permutations(column_name, perms, params)
    }

    /// Build over a permutation table shared with sibling columns.
    pub fn with_permutations(
        column_name: impl Into<String>,
        perms: Arc<Permutations>,
        params: &SketchParams,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            minhash: MinHash::with_permutations(perms),
            hll: HyperLogLog::new(params.hll_precision),
            sample: IndexSet::new(),
            sample_capacity: params.sample_capacity,
            count: 0,
            empty_count: 0,
            numeric_count: 0,
        }
    }

    pub fn update(&mut self, value: &FieldValue) {
        self.count += 1;

        let value = normalize(value);
        if value.is_empty() {
            self.empty_count += 1;
            return;
        }

        if value.parse::<f64>().is_ok() {
            self.numeric_count += 1;
        }

        if self.sample.len() < self.sample_capacity {
            self.sample.insert(value.clone());
        }

        self.minhash.update(&value);
        self.hll.update(&value);
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn empty_count(&self) -> u64 {
        self.empty_count
    }

    pub fn non_empty_count(&self) -> u64 {
        self.count - self.empty_count
    }

    pub fn numeric_count(&self) -> u64 {
        self.numeric_count
    }

    pub fn seed(&self) -> u64 {
        self.minhash.seed()
    }

    /// Sample values in first-seen order.
    pub fn sample(&self) -> impl Iterator<Item = &str> {
        self.sample.iter().map(|s| s.as_str())
    }

    pub fn signature(&self) -> MinHashSignature {
        self.minhash.signature()
    }

    pub fn hll(&self) -> &HyperLogLog {
        &self.hll
    }

    /// Distinct values: exact while the sample has room, otherwise the
    /// larger of the sample size and the HyperLogLog estimate.
    pub fn distinct_count(&self) -> u64 {
        let sampled = self.sample.len() as u64;
        if self.sample.len() < self.sample_capacity {
            return sampled;
        }
        sampled.max(self.hll.count().round() as u64)
    }

    /// At least half of the non-empty values are numeric.
    pub fn is_numeric(&self) -> bool {
        let non_empty = self.non_empty_count();
        if non_empty == 0 {
            return false;
        }
        self.numeric_count as f64 / non_empty as f64 >= 0.5
    }

    /// Freeze the sketch into its persisted form.
    pub fn to_record(&self) -> ColumnSketchRecord {
        ColumnSketchRecord {
            column_name: self.column_name.clone(),
            signature: self.signature(),
            hll_registers: self.hll.registers().to_vec(),
            sample: self.sample.iter().cloned().collect(),
            count: self.count,
            empty_count: self.empty_count,
            numeric_count: self.numeric_count,
            distinct_count: self.distinct_count(),
            is_numeric: self.is_numeric(),
        }
    }
}

/// The immutable, persisted form of a finished [`ColumnSketch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSketchRecord {
    pub column_name: String,
    pub signature: MinHashSignature,
    pub hll_registers: Vec<u8>,
    pub sample: Vec<String>,
    pub count: u64,
    pub empty_count: u64,
    pub numeric_count: u64,
    pub distinct_count: u64,
    pub is_numeric: bool,
}
