// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by all backends

use thiserror::Error;

/// Result type alias for backend operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of an external collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing file could not be read
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },

    /// Stored data could not be decoded
    #[error("failed to parse {source_name}: {message}")]
    Parse {
        /// File or key that failed to parse
        source_name: String,
        /// Error message
        message: String,
    },

    /// Stored data decoded but is inconsistent
    #[error("invalid data: {message}")]
    Invalid {
        /// Error message
        message: String,
    },

    /// Backend is temporarily unreachable
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
}

impl StoreError {
    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
