//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/fod.sqlite"
//!
//! [sketch]
//! num_perm = 256
//! minhash_seed = 43
//!
//! [index]
//! lsh_threshold = 0.5
//!
//! [server]
//! bind = "127.0.0.1:8081"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use findopendata_core::column::{
    SketchParams, DEFAULT_HLL_PRECISION, DEFAULT_MINHASH_SEED, DEFAULT_NUM_PERM,
    DEFAULT_SAMPLE_CAPACITY,
};
use findopendata_core::hll::{MAX_PRECISION, MIN_PRECISION};
use findopendata_core::lsh::LshConfig;
use findopendata_core::query::{ServiceConfig, DEFAULT_TOP_K};
use findopendata_core::table::DEFAULT_RECORD_SAMPLE_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sketch: SketchConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SketchConfig {
    #[serde(default = "default_num_perm")]
    pub num_perm: usize,
    #[serde(default = "default_minhash_seed")]
    pub minhash_seed: u64,
    #[serde(default = "default_hll_precision")]
    pub hll_precision: u8,
    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,
    #[serde(default = "default_record_sample_size")]
    pub record_sample_size: usize,
    /// Stop reading a table after this many records.
    #[serde(default)]
    pub max_records: Option<u64>,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            num_perm: DEFAULT_NUM_PERM,
            minhash_seed: DEFAULT_MINHASH_SEED,
            hll_precision: DEFAULT_HLL_PRECISION,
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            record_sample_size: DEFAULT_RECORD_SAMPLE_SIZE,
            max_records: None,
        }
    }
}

impl SketchConfig {
    pub fn params(&self) -> SketchParams {
        SketchParams {
            num_perm: self.num_perm,
            seed: self.minhash_seed,
            hll_precision: self.hll_precision,
            sample_capacity: self.sample_capacity,
        }
    }
}

fn default_num_perm() -> usize {
    DEFAULT_NUM_PERM
}
fn default_minhash_seed() -> u64 {
    DEFAULT_MINHASH_SEED
}
fn default_hll_precision() -> u8 {
    DEFAULT_HLL_PRECISION
}
fn default_sample_capacity() -> usize {
    DEFAULT_SAMPLE_CAPACITY
}
fn default_record_sample_size() -> usize {
    DEFAULT_RECORD_SAMPLE_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_threshold")]
    pub lsh_threshold: f64,
    #[serde(default = "default_weight")]
    pub fp_weight: f64,
    #[serde(default = "default_weight")]
    pub fn_weight: f64,
    #[serde(default = "default_true")]
    pub filter_low_cardinality: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lsh_threshold: default_threshold(),
            fp_weight: default_weight(),
            fn_weight: default_weight(),
            filter_low_cardinality: true,
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}
fn default_weight() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k_limit: DEFAULT_TOP_K,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8081".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Index and ranking settings for the query service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            lsh: LshConfig {
                threshold: self.index.lsh_threshold,
                num_perm: self.sketch.num_perm,
                fp_weight: self.index.fp_weight,
                fn_weight: self.index.fn_weight,
            },
            top_k: self.query.top_k_limit,
            filter_low_cardinality: self.index.filter_low_cardinality,
            minhash_seed: Some(self.sketch.minhash_seed),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let sketch = &config.sketch;
    if sketch.num_perm == 0 {
        bail!("sketch.num_perm must be >= 1");
    }
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&sketch.hll_precision) {
        bail!(
            "sketch.hll_precision must be in [{}, {}]",
            MIN_PRECISION,
            MAX_PRECISION
        );
    }
    if sketch.sample_capacity == 0 {
        bail!("sketch.sample_capacity must be >= 1");
    }

    let index = &config.index;
    if !(index.lsh_threshold > 0.0 && index.lsh_threshold < 1.0) {
        bail!("index.lsh_threshold must be in (0.0, 1.0)");
    }
    if index.fp_weight < 0.0 || index.fn_weight < 0.0 {
        bail!("index.fp_weight and index.fn_weight must be non-negative");
    }
    if index.fp_weight == 0.0 && index.fn_weight == 0.0 {
        bail!("index.fp_weight and index.fn_weight cannot both be zero");
    }
    if (index.fp_weight + index.fn_weight - 1.0).abs() > 1e-9 {
        bail!("index.fp_weight + index.fn_weight must equal 1.0");
    }

    if config.query.top_k_limit == 0 {
        bail!("query.top_k_limit must be >= 1");
    }
    Ok(())
}
