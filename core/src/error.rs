use crate::investigation::{InvestigationStatus, LifecycleStage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Investigation '{investigation_id}' already exists")]
    AlreadyExists { investigation_id: String },

    #[error("Version conflict: expected {expected}, stored {actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleStage,
        to:   LifecycleStage,
    },

    #[error("Investigation is terminal ({status}); no further mutation permitted")]
    TerminalState { status: InvestigationStatus },

    /// Unknown id and unauthorized caller collapse into this one variant
    /// so a caller cannot probe for the existence of other owners' work.
    #[error("Investigation not found")]
    NotFound,

    #[error("Results not available: investigation is {status}")]
    NotCompleted { status: InvestigationStatus },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
