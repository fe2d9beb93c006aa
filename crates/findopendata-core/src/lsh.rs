//! Banded LSH over MinHash signatures.
//!
//! The index has two phases, expressed as two types:
//!
//! - [`LshIndexBuilder`]: single-threaded bulk insertion.
//! - [`LshIndex`]: frozen by [`LshIndexBuilder::build`]; only `query`
//!   exists, so concurrent readers need no locks.
//!
//! There is no delete or update. A changed sketch means building a new
//! index from the sketch store.
//!
//! # Banding
//!
//! A signature of length N is cut into `b` contiguous bands of `r` values
//! (`b * r <= N`, trailing values unused). Each band is hashed to a bucket
//! key; two signatures collide when any band lands in the same bucket. For
//! true Jaccard `s` the collision probability is `1 - (1 - s^r)^b`.
//!
//! `(b, r)` is chosen once per index by minimizing the weighted area of
//! false positives below the threshold and false negatives above it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};
use crate::minhash::MinHashSignature;

/// Intervals for Simpson integration of the collision curve.
const INTEGRATION_STEPS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    pub bands: usize,
    pub rows: usize,
}

/// Index construction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LshConfig {
    pub threshold: f64,
    pub num_perm: usize,
    pub fp_weight: f64,
    pub fn_weight: f64,
}

impl LshConfig {
    pub fn new(threshold: f64, num_perm: usize) -> Self {
        Self {
            threshold,
            num_perm,
            fp_weight: 0.5,
            fn_weight: 0.5,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::Input(format!(
                "threshold must be in (0, 1), got {}",
                self.threshold
            )));
        }
        if self.num_perm == 0 {
            return Err(Error::Input("num_perm must be >= 1".into()));
        }
        if self.fp_weight < 0.0 || self.fn_weight < 0.0 {
            return Err(Error::Input("weights must be non-negative".into()));
        }
        if (self.fp_weight + self.fn_weight - 1.0).abs() > 1e-9 {
            return Err(Error::Input(format!(
                "weights must sum to 1.0, got {} + {}",
                self.fp_weight, self.fn_weight
            )));
        }
        Ok(())
    }
}

/// Probability that two signatures with Jaccard `s` share a bucket.
pub fn collision_probability(s: f64, params: LshParams) -> f64 {
    1.0 - (1.0 - s.powi(params.rows as i32)).powi(params.bands as i32)
}

/// Area under the collision curve on `[0, threshold)`.
pub fn false_positive_area(threshold: f64, params: LshParams) -> f64 {
    simpson(|s| collision_probability(s, params), 0.0, threshold)
}

/// Area above the collision curve on `[threshold, 1]`.
pub fn false_negative_area(threshold: f64, params: LshParams) -> f64 {
    simpson(|s| 1.0 - collision_probability(s, params), threshold, 1.0)
}

fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let n = INTEGRATION_STEPS;
    let h = (b - a) / n as f64;
    let mut total = f(a) + f(b);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        total += weight * f(a + i as f64 * h);
    }
    total * h / 3.0
}

/// Pick `(b, r)` with `b * r <= num_perm` minimizing the weighted error.
///
/// Ties keep the first candidate in `(b, r)` ascending order.
pub fn optimal_params(config: &LshConfig) -> LshParams {
    let mut best = LshParams { bands: 1, rows: 1 };
    let mut best_error = f64::INFINITY;
    for bands in 1..=config.num_perm {
        for rows in 1..=config.num_perm / bands {
            let params = LshParams { bands, rows };
            let error = config.fp_weight * false_positive_area(config.threshold, params)
                + config.fn_weight * false_negative_area(config.threshold, params);
            if error < best_error {
                best_error = error;
                best = params;
            }
        }
    }
    best
}

fn band_key(band: &[u64]) -> u64 {
    let mut bytes = Vec::with_capacity(band.len() * 8);
    for v in band {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    xxh64(&bytes, 0)
}

type Buckets = HashMap<u64, BTreeSet<Arc<str>>>;

/// Mutable build phase of the index.
#[derive(Debug)]
pub struct LshIndexBuilder {
    config: LshConfig,
    params: LshParams,
    seed: Option<u64>,
    tables: Vec<Buckets>,
    ids: HashSet<Arc<str>>,
}

impl LshIndexBuilder {
    pub fn new(config: LshConfig) -> Result<Self> {
        config.validate()?;
        let params = optimal_params(&config);
        Self::with_params(config, params)
    }

    /// Skip parameter selection and use explicit `(b, r)`.
    ///
    /// The bands must fit in the signature: `bands * rows <= num_perm`.
    pub fn with_params(config: LshConfig, params: LshParams) -> Result<Self> {
        config.validate()?;
        let fits = params
            .bands
            .checked_mul(params.rows)
            .is_some_and(|n| n <= config.num_perm);
        if params.bands == 0 || params.rows == 0 || !fits {
            return Err(Error::Input(format!(
                "{} bands of {} rows do not fit a signature of length {}",
                params.bands, params.rows, config.num_perm
            )));
        }
        Ok(Self {
            tables: (0..params.bands).map(|_| HashMap::new()).collect(),
            config,
            params,
            seed: None,
            ids: HashSet::new(),
        })
    }

    /// Require every inserted signature to use `seed`.
    pub fn expect_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn insert(&mut self, id: &str, signature: &MinHashSignature) -> Result<()> {
        if signature.len() != self.config.num_perm {
            return Err(Error::Input(format!(
                "signature for {} has length {}, expected {}",
                id,
                signature.len(),
                self.config.num_perm
            )));
        }
        match self.seed {
            Some(seed) if seed != signature.seed => {
                return Err(Error::Input(format!(
                    "signature for {} has seed {}, expected {}",
                    id, signature.seed, seed
                )));
            }
            Some(_) => {}
            None => self.seed = Some(signature.seed),
        }
        if self.ids.contains(id) {
            return Err(Error::Input(format!("duplicate id {}", id)));
        }

        let id: Arc<str> = Arc::from(id);
        let rows = self.params.rows;
        for (band, table) in self.tables.iter_mut().enumerate() {
            let key = band_key(&signature.values[band * rows..(band + 1) * rows]);
            table.entry(key).or_default().insert(id.clone());
        }
        self.ids.insert(id);
        Ok(())
    }

    /// Freeze into a read-only index.
    pub fn build(self) -> LshIndex {
        LshIndex {
            config: self.config,
            params: self.params,
            seed: self.seed,
            tables: self.tables,
            len: self.ids.len(),
        }
    }
}

/// Read-only LSH index.
#[derive(Debug, PartialEq)]
pub struct LshIndex {
    config: LshConfig,
    params: LshParams,
    seed: Option<u64>,
    tables: Vec<Buckets>,
    len: usize,
}

impl LshIndex {
    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn num_perm(&self) -> usize {
        self.config.num_perm
    }

    /// Seed shared by every indexed signature; `None` for an empty index.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ids sharing at least one band bucket with `signature`, ascending.
    ///
    /// The query's own id is not excluded. Callers re-score candidates,
    /// since ids below the threshold can still collide.
    pub fn query(&self, signature: &MinHashSignature) -> Result<Vec<String>> {
        if signature.len() != self.config.num_perm {
            return Err(Error::Input(format!(
                "signature has length {}, expected {}",
                signature.len(),
                self.config.num_perm
            )));
        }
        if let Some(seed) = self.seed {
            if seed != signature.seed {
                return Err(Error::Input(format!(
                    "signature has seed {}, expected {}",
                    signature.seed, seed
                )));
            }
        }

        let rows = self.params.rows;
        let mut candidates: BTreeSet<&Arc<str>> = BTreeSet::new();
        for (band, table) in self.tables.iter().enumerate() {
            let key = band_key(&signature.values[band * rows..(band + 1) * rows]);
            if let Some(ids) = table.get(&key) {
                candidates.extend(ids.iter());
            }
        }
        Ok(candidates.into_iter().map(|id| id.to_string()).collect())
    }
}
