//! MinHash signatures for Jaccard similarity estimation.
//!
//! A signature holds, for each of N permutations, the minimum permuted hash
//! of all values seen. Two signatures built with the same `(seed, N)` agree
//! at a given slot with probability equal to the Jaccard similarity of the
//! underlying sets.
//!
//! Permutation `i` is the affine map
//! `h_i(x) = ((a_i * x + b_i) mod (2^61 - 1)) & (2^32 - 1)`, applied to a
//! 32-bit xxHash of the value. The `(a_i, b_i)` pairs come from a ChaCha8
//! stream seeded with `seed`, so every process derives the same family.

use std::sync::Arc;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh32::xxh32;

use crate::error::{Error, Result};

/// Mersenne prime `2^61 - 1`, the modulus of the permutation field.
pub const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Largest value a permuted hash can take; empty slots start here.
pub const MAX_HASH: u64 = (1 << 32) - 1;

/// The `(a, b)` coefficients of N permutations for one seed.
#[derive(Debug, Clone)]
pub struct Permutations {
    seed: u64,
    a: Vec<u64>,
    b: Vec<u64>,
}

impl Permutations {
    pub fn new(num_perm: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut a = Vec::with_capacity(num_perm);
        let mut b = Vec::with_capacity(num_perm);
        for _ in 0..num_perm {
            a.push(rng.next_u64() % (MERSENNE_PRIME - 1) + 1);
            b.push(rng.next_u64() % MERSENNE_PRIME);
        }
        Self { seed, a, b }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    #[inline]
    fn apply(&self, i: usize, hv: u64) -> u64 {
        let x = (self.a[i] as u128 * hv as u128 + self.b[i] as u128) % MERSENNE_PRIME as u128;
        (x as u64) & MAX_HASH
    }
}

/// Streaming MinHash builder.
///
/// Cloning is cheap for the permutation table, which is shared.
#[derive(Debug, Clone)]
pub struct MinHash {
    perms: Arc<Permutations>,
    hashvalues: Vec<u64>,
}

impl MinHash {
    /// Create an empty MinHash with its own permutation table.
    pub fn new(num_perm: usize, seed: u64) -> Self {
        Self::with_permutations(Arc::new(Permutations::new(num_perm, seed)))
    }

    /// Create an empty MinHash over a shared permutation table.
    pub fn with_permutations(perms: Arc<Permutations>) -> Self {
        let hashvalues = vec![MAX_HASH; perms.len()];
        Self { perms, hashvalues }
    }

    /// Feed one normalized value into the signature.
    pub fn update(&mut self, value: &str) {
        let hv = base_hash(value);
        for (i, slot) in self.hashvalues.iter_mut().enumerate() {
            let phv = self.perms.apply(i, hv);
            if phv < *slot {
                *slot = phv;
            }
        }
    }

    pub fn seed(&self) -> u64 {
        self.perms.seed()
    }

    pub fn num_perm(&self) -> usize {
        self.hashvalues.len()
    }

    /// True while no value has been fed.
    pub fn is_empty(&self) -> bool {
        self.hashvalues.iter().all(|&v| v == MAX_HASH)
    }

    /// Snapshot the current minima as an immutable signature.
    pub fn signature(&self) -> MinHashSignature {
        MinHashSignature {
            seed: self.perms.seed(),
            values: self.hashvalues.clone(),
        }
    }
}

/// 32-bit base hash of a normalized value.
#[inline]
pub fn base_hash(value: &str) -> u64 {
    xxh32(value.as_bytes(), 0) as u64
}

/// A materialized MinHash signature, as persisted and queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinHashSignature {
    pub seed: u64,
    pub values: Vec<u64>,
}

impl MinHashSignature {
    pub fn new(seed: u64, values: Vec<u64>) -> Self {
        Self { seed, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail unless `other` was built with the same seed and length.
    pub fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.seed != other.seed || self.values.len() != other.values.len() {
            return Err(Error::IncompatibleSignature {
                expected_seed: self.seed,
                expected_len: self.values.len(),
                actual_seed: other.seed,
                actual_len: other.values.len(),
            });
        }
        Ok(())
    }

    /// Fraction of slots where the two signatures agree.
    pub fn jaccard(&self, other: &Self) -> Result<f64> {
        self.check_compatible(other)?;
        if self.values.is_empty() {
            return Ok(0.0);
        }
        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();
        Ok(matches as f64 / self.values.len() as f64)
    }
}
