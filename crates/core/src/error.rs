// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for rv-core operations.

use thiserror::Error;

/// All possible errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("document not found in cache: {0}")]
    NotFound(String),

    #[error("invalid document key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid document kind: '{0}'\n  hint: valid kinds are: story, prd, epic")]
    InvalidKind(String),

    #[error("invalid status: '{0}'\n  hint: valid statuses are: draft, feedback, synthesis, signoff, approved")]
    InvalidStatus(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for rv-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
