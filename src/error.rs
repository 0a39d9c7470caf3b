// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Every way a refinement run can fail. None of these are retried.
#[derive(Debug, Error)]
pub enum RefineError {
    /// Archive or a required extracted file is missing.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt archive {}: {reason}", .path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// Owner identity field absent (or not a non-empty string).
    #[error("missing field `{field}` in {source_name}")]
    MissingField { field: String, source_name: String },

    #[error("invalid identity file {}: {reason}", .path.display())]
    InvalidIdentity { path: PathBuf, reason: String },

    /// `row` is the zero-based data row index, header excluded.
    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("schema write failed: {0}")]
    SchemaWrite(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// A failed run: the stage whose transition failed, plus the cause.
#[derive(Debug, Error)]
#[error("refinement failed entering stage {stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: RefineError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: RefineError) -> Self {
        Self { stage, source }
    }
}
