//! Domain error types.

use thiserror::Error;

/// Errors raised when parsing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown enumeration value.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// Progress outside 0..=100.
    #[error("Invalid progress: {0}")]
    InvalidProgress(u32),
}
