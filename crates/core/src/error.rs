//! Core error model.

use thiserror::Error;

/// Errors raised while validating core values.
///
/// Keep this focused on deterministic input failures. I/O and scheduling
/// failures belong to the crates that perform them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
