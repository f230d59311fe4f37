//! Run Log Store error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("run log '{0}' not found")]
    RunLogNotFound(String),

    #[error("step log '{0}' not found")]
    StepLogNotFound(String),

    #[error("branch log '{0}' not found")]
    BranchLogNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
