// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error type shared by every dripcast crate.

use thiserror::Error;

/// The primary error type used across dripcast traits and core operations.
#[derive(Debug, Error)]
pub enum DripcastError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Protocol client errors (transport failure, rejected send, upload failure).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No logged-in client is available for the device.
    ///
    /// Callers treat this as "not ready", never as a hard failure.
    #[error("device {device_id} has no live session")]
    SessionNotReady { device_id: String },

    /// Pairing could not produce a code or the transport refused to connect.
    #[error("pairing failed: {0}")]
    Pairing(String),

    /// A referenced entity does not exist (or is not owned by the caller).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before reaching storage or the protocol client.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DripcastError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the error only means "device not ready yet".
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::SessionNotReady { .. })
    }
}
