//! Error types for the outreach engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Shorthand for a NotFound on a UUID-keyed entity.
    pub fn not_found(entity: &str, id: Uuid) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// Outbound relay / mailbox poller errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to send to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Credential refresh failed for account {account}: {reason}")]
    RefreshFailed { account: String, reason: String },

    #[error("Mailbox fetch failed: {0}")]
    FetchFailed(String),

    #[error("Mail operation timed out after {0:?}")]
    Timeout(Duration),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

/// Orchestration-level errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Campaign {0} has no step with order {1}")]
    StepNotFound(Uuid, i32),

    #[error("Campaign {0} has an invalid schedule: {1}")]
    InvalidSchedule(Uuid, String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid lead transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
