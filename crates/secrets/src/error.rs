//! Secrets-handler error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secret '{0}' not found")]
    NotFound(String),
}
