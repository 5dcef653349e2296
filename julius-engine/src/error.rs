//! Error types for julius-engine
//!
//! Two tiers:
//! - [`ValidationError`] is fatal: the input cannot be processed until the caller fixes it.
//! - Row-level problems never surface here; stages repair them and count them in
//!   their reports instead.

use crate::pipeline::types::Platform;
use thiserror::Error;

/// Fatal schema validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required column (and every alternative name for it) absent from the header row
    #[error("{platform} export is missing required column(s): {}", .missing.join(", "))]
    MissingColumns {
        platform: Platform,
        missing: Vec<String>,
    },
}

impl ValidationError {
    pub fn platform(&self) -> Platform {
        match self {
            Self::MissingColumns { platform, .. } => *platform,
        }
    }
}

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing required schema columns (aborts the run)
    #[error("Schema validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// CSV read/write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON report serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input loading was cancelled before the pipeline started
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// julius-common error
    #[error("Common error: {0}")]
    Common(#[from] julius_common::Error),
}

impl EngineError {
    /// True when the caller has to fix the input data before retrying
    pub fn is_fatal_input_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
