//! # Find Open Data
//!
//! Column sketching and joinable column search over open data tables.
//!
//! JSON Lines files are sketched into per-column MinHash signatures,
//! HyperLogLog registers and value samples, persisted in SQLite, and
//! indexed with banded LSH to find columns that join with a given one.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ JSONL file │──▶│ TableSketch  │──▶│    SQLite     │
//! │  (ingest)  │   │ MinHash+HLL  │   │ sketch store  │
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ keyset scan
//!                                     ┌──────▼───────┐
//!                                     │  LSH index   │
//!                                     │ + ranking    │
//!                                     └──────┬───────┘
//!                                ┌───────────┤
//!                                ▼           ▼
//!                           ┌────────┐  ┌────────┐
//!                           │  CLI   │  │  HTTP  │
//!                           │ (fod)  │  │        │
//!                           └────────┘  └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite sketch store |
//! | [`ingest`] | Sketching jobs |
//! | [`progress`] | Sketch progress on stderr |
//! | [`query`] | Joinable column search command |
//! | [`stats`] | Database statistics |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod query;
pub mod server;
pub mod sqlite_store;
pub mod stats;

