//! # Find Open Data Core
//!
//! Sketching, indexing and ranking logic for joinable column search:
//! value normalization, MinHash and HyperLogLog column sketches, a banded
//! LSH index, and the joinability query service.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Persistence is
//! reached through the [`store::SketchStore`] trait.

pub mod column;
pub mod error;
pub mod hll;
pub mod lsh;
pub mod minhash;
pub mod query;
pub mod store;
pub mod table;
pub mod value;

pub use error::{Error, Result};
