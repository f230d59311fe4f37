//! `SecretsHandler` — the provider contract §6 specifies for supplying
//! secrets to task nodes ahead of execution.

use async_trait::async_trait;

use crate::error::SecretsError;

#[async_trait]
pub trait SecretsHandler: Send + Sync {
    async fn get(&self, name: &str) -> Result<String, SecretsError>;
}
