//! Errors surfaced by the orchestrator to its callers.

use mercabot_core::error::{ConfigError, StoreError};
use mercabot_providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad input shape; rejected before any provider call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChatError {
    /// Whether the caller sent something wrong (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::NotFound(_))
    }
}
