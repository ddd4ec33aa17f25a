// SPDX-License-Identifier: MIT OR Apache-2.0

//! AlertFlux Core Error Types
//!
//! Error handling for detector evaluation and state-store operations.

use thiserror::Error;

/// Result type for AlertFlux operations
pub type AlertFluxResult<T> = Result<T, AlertFluxError>;

/// AlertFlux error types
///
/// Missing durable entities (condition groups, detector state rows) are not
/// errors: callers fall back to default state. Only store failures and
/// malformed stored payloads surface here.
#[derive(Error, Debug)]
pub enum AlertFluxError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    #[error("Ephemeral store error: {message}")]
    EphemeralStore {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Durable store error: {message}")]
    DurableStore {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed state value for key '{key}': {message}")]
    MalformedStateValue { key: String, message: String },

    #[error("Evaluation failed for detector {detector_id}: {message}")]
    Evaluation { detector_id: u64, message: String },
}

impl AlertFluxError {
    /// Create a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        AlertFluxError::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Create an ephemeral store error with a message only
    pub fn ephemeral_store(message: impl Into<String>) -> Self {
        AlertFluxError::EphemeralStore {
            message: message.into(),
            source: None,
        }
    }

    /// Create a durable store error with a message only
    pub fn durable_store(message: impl Into<String>) -> Self {
        AlertFluxError::DurableStore {
            message: message.into(),
            source: None,
        }
    }
}

impl From<redis::RedisError> for AlertFluxError {
    fn from(err: redis::RedisError) -> Self {
        AlertFluxError::EphemeralStore {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<rusqlite::Error> for AlertFluxError {
    fn from(err: rusqlite::Error) -> Self {
        AlertFluxError::DurableStore {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
