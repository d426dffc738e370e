//! Error types
//!
//! Every failure the rotor can hit is recovered locally; these variants
//! exist so the recovery sites can log something precise.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotorError {
    /// Reading or writing the flat term list failed
    #[error("term store I/O failed for {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker process could not be spawned
    #[error("failed to launch worker `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid output noise pattern: {0}")]
    NoisePattern(#[from] regex::Error),
}

pub type RotorResult<T> = Result<T, RotorError>;

impl RotorError {
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RotorError::Store { path: path.into(), source }
    }
}
