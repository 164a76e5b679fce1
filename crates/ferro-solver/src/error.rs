//! Configuration and contract errors of the solver framework.
//!
//! Numerical results travel through [`crate::outcome::Outcome`]; this enum
//! covers everything that is *not* a numerical outcome: unknown factory
//! keys, storage mismatches, unavailable external backends, checkpoint
//! stream failures, and model-contract violations.

use thiserror::Error;

use ferro_model::MatrixKind;
use ferro_model::model::ModelError;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("no solver registered under key \"{0}\"")]
    UnknownSolver(String),

    #[error("solver expects {expected:?} storage, matrix provides {got:?}")]
    StorageMismatch {
        expected: MatrixKind,
        got: MatrixKind,
    },

    #[error("external backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("checkpoint schema {got} not readable (expected {expected})")]
    CheckpointSchema { expected: u32, got: u32 },

    #[error("checkpoint written by \"{got}\" restored into \"{expected}\"")]
    CheckpointKind { expected: String, got: String },

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
