//! Environment-variable-backed `SecretsHandler`.
//!
//! The secrets module itself wasn't part of the retrieved source set; this
//! follows the convention its sibling modules assume elsewhere in the
//! codebase — a secret named `API_KEY` is read from `{prefix}API_KEY`.

use async_trait::async_trait;
use tracing::debug;

use crate::error::SecretsError;
use crate::handler::SecretsHandler;

pub struct EnvSecretsHandler {
    prefix: String,
}

impl EnvSecretsHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvSecretsHandler {
    fn default() -> Self {
        Self::new("RAT_SECRET_")
    }
}

#[async_trait]
impl SecretsHandler for EnvSecretsHandler {
    async fn get(&self, name: &str) -> Result<String, SecretsError> {
        let env_name = format!("{}{}", self.prefix, name.to_uppercase());
        debug!("resolving secret '{name}' from env var '{env_name}'");
        std::env::var(&env_name).map_err(|_| SecretsError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_prefixed_env_var() {
        std::env::set_var("RAT_SECRET_DB_PASSWORD", "hunter2");
        let handler = EnvSecretsHandler::default();
        assert_eq!(handler.get("db_password").await.unwrap(), "hunter2");
        std::env::remove_var("RAT_SECRET_DB_PASSWORD");
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let handler = EnvSecretsHandler::default();
        assert!(matches!(
            handler.get("does_not_exist").await,
            Err(SecretsError::NotFound(_))
        ));
    }
}
