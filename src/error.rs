// src/error.rs

//! Unified error handling for the jail watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request exceeded its configured deadline
    #[error("Timed out while {context}")]
    Timeout { context: String },

    /// Network or HTTP-layer failure other than a timeout
    #[error("Transport error while {context}: {message}")]
    Transport { context: String, message: String },

    /// Report page no longer matches the known layout
    #[error("Parse error: {0}")]
    Parse(String),

    /// Durable state could not be read or written
    #[error("Persistence error while {context}: {message}")]
    Persistence { context: String, message: String },

    /// Announcement could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl AppError {
    /// Create a timeout error with context.
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::Timeout {
            context: context.into(),
        }
    }

    /// Create a transport error with context.
    pub fn transport(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a persistence error with context.
    pub fn persistence(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification error.
    pub fn notification(message: impl fmt::Display) -> Self {
        Self::Notification(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
