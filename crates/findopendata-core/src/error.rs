//! Error taxonomy shared by the index and the query service.

use thiserror::Error;

/// Errors raised by the LSH index and the joinability query service.
///
/// Store failures arrive as `anyhow::Error` from [`SketchStore`](crate::store::SketchStore)
/// implementations and are wrapped in [`Error::Store`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or undersized signature, or a length/seed mismatch at the
    /// index boundary.
    #[error("invalid input: {0}")]
    Input(String),

    /// Unknown sketch id.
    #[error("sketch not found: {0}")]
    NotFound(String),

    /// Two signatures built with different permutation families.
    #[error("incompatible signature: expected seed {expected_seed} (len {expected_len}), got seed {actual_seed} (len {actual_len})")]
    IncompatibleSignature {
        expected_seed: u64,
        expected_len: usize,
        actual_seed: u64,
        actual_len: usize,
    },

    /// The index has not been built, or its bootstrap scan failed.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// The backing sketch store failed.
    #[error("sketch store error: {0:#}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Store(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
