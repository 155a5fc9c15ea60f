//! Error types for the permission engine.

use std::time::Duration;

/// Errors produced while gating a command.
///
/// Allow, Deny and Ask are never errors. Only [`GateError::Aborted`] escapes
/// the engine; oracle failures are folded into an Ask before returning.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Cancellation was observed while waiting on the prefix classifier.
    /// The command must neither run nor be offered to a human.
    #[error("permission check aborted")]
    Aborted,

    #[error("prefix classifier failed: {0}")]
    Oracle(String),

    #[error("prefix classifier timed out after {0:?}")]
    OracleTimeout(Duration),
}

impl GateError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Result type for gate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;
