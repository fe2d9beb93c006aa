//! HyperLogLog cardinality estimator.
//!
//! Memory is `2^p` one-byte registers; standard error is about
//! `1.04 / sqrt(2^p)` (6.5% at the default `p = 8`).

use xxhash_rust::xxh64::xxh64;

/// Smallest and largest accepted precision.
pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    /// Create an empty estimator. `precision` is clamped to `4..=16`.
    pub fn new(precision: u8) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
        Self {
            precision,
            registers: vec![0; 1 << precision],
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Feed one normalized value.
    pub fn update(&mut self, value: &str) {
        self.update_hash(xxh64(value.as_bytes(), 0));
    }

    fn update_hash(&mut self, hash: u64) {
        let p = self.precision as u32;
        let index = (hash >> (64 - p)) as usize;
        let rest = hash << p;
        // rank is capped at 64 - p + 1 when the remaining bits are all zero
        let rank = (rest.leading_zeros().min(64 - p) + 1) as u8;
        let reg = &mut self.registers[index];
        if rank > *reg {
            *reg = rank;
        }
    }

    /// Current cardinality estimate.
    pub fn count(&self) -> f64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-(r as i32)))
            .sum();
        let raw = alpha(self.registers.len()) * m * m / sum;

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                return -m * (zeros as f64 / m).ln();
            }
        }
        raw
    }
}

/// Bias-correction constant for `m` registers.
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}
