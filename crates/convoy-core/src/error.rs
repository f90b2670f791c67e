// SPDX-FileCopyrightText: 2026 Convoy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Convoy resilience layer.

use thiserror::Error;

/// The primary error type used across all Convoy components.
#[derive(Debug, Error)]
pub enum ConvoyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport errors (connection failure, send failure, closed channel).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The circuit breaker is open; the operation was rejected without being attempted.
    #[error("circuit open: retry after {retry_after:?}")]
    CircuitOpen { retry_after: std::time::Duration },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The channel does not support a required agent event type. Fatal at startup.
    #[error("integration error: unsupported event types: {missing:?}")]
    Integration { missing: Vec<String> },

    /// Persisted state failed validation.
    #[error("state validation failed: {0}")]
    Validation(String),

    /// Serialized state exceeds the persistence size cap.
    #[error("state too large to persist: {size} bytes (limit {limit})")]
    Capacity { size: usize, limit: usize },

    /// Storage tier errors (filesystem, serialization of durable records).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvoyError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        ConvoyError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Clones the error, stringifying any boxed source.
    ///
    /// Used where an error outcome must be handed to several waiters of one
    /// shared in-flight operation; boxed sources are not `Clone`, so they are
    /// flattened into the message.
    pub fn clone_flattened(&self) -> Self {
        match self {
            ConvoyError::Config(m) => ConvoyError::Config(m.clone()),
            ConvoyError::Transport { message, source } => ConvoyError::Transport {
                message: match source {
                    Some(s) => format!("{message}: {s}"),
                    None => message.clone(),
                },
                source: None,
            },
            ConvoyError::CircuitOpen { retry_after } => ConvoyError::CircuitOpen {
                retry_after: *retry_after,
            },
            ConvoyError::Timeout { duration } => ConvoyError::Timeout {
                duration: *duration,
            },
            ConvoyError::Integration { missing } => ConvoyError::Integration {
                missing: missing.clone(),
            },
            ConvoyError::Validation(m) => ConvoyError::Validation(m.clone()),
            ConvoyError::Capacity { size, limit } => ConvoyError::Capacity {
                size: *size,
                limit: *limit,
            },
            ConvoyError::Storage { source } => {
                ConvoyError::Internal(format!("storage error: {source}"))
            }
            ConvoyError::Internal(m) => ConvoyError::Internal(m.clone()),
        }
    }

    /// True for errors that a retry loop may reasonably attempt again.
    ///
    /// Circuit-open errors are excluded: retrying while the breaker is open
    /// only burns attempts that are guaranteed to be rejected.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConvoyError::Transport { .. } | ConvoyError::Timeout { .. }
        )
    }
}
