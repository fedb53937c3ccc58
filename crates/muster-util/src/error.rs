//! Error types for musterd

use thiserror::Error;

/// Core error type for musterd operations
///
/// Variants follow the caller-facing taxonomy: malformed input, unknown
/// objects, user-visible conflicts, and infrastructure failures.
#[derive(Debug, Error)]
pub enum MusterError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already signed up for this activity")]
    AlreadySignedUp,

    #[error("Activity is full")]
    CapacityFull,

    #[error("Cannot move signup from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MusterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for rejections a user caused and can act on
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadySignedUp | Self::CapacityFull | Self::Conflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MusterError>;
