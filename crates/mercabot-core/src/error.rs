//! Error types shared by the stores, the tools and the configuration layer.

use thiserror::Error;

use crate::conversation::StatusTransitionError;

/// Failures of the conversation and ledger stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored document is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

/// A configuration that must not be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no provider has an API key configured")]
    NoProviderConfigured,

    #[error("{field} refers to unknown provider '{id}'")]
    UnknownProvider { field: String, id: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// A tool could not reach its backing source.
///
/// "Nothing found" is not an error; tools return an empty result for that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("catalog store failed: {0}")]
    Store(String),

    #[error("business config source failed: {0}")]
    Http(String),
}
