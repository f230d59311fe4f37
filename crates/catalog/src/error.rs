//! Catalog-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern '{0}': {1}")]
    Pattern(String, glob::PatternError),

    #[error("catalog handler only accepts 'get'/'put' as a stage, got '{0}'")]
    InvalidStage(String),
}
