//! Error types for atomstore
//!
//! Provides a unified error type for all fatal and state errors, plus the
//! non-fatal verification error reported by a rejected expansion.

use thiserror::Error;

/// Result type alias using AtomError
pub type Result<T> = std::result::Result<T, AtomError>;

/// Unified error type for atomstore operations
#[derive(Debug, Error)]
pub enum AtomError {
    // -------------------------------------------------------------------------
    // Arena Errors
    // -------------------------------------------------------------------------
    #[error("Arena capacity exceeded: requested {requested} bytes, capacity {capacity} bytes")]
    CapacityExceeded { requested: u64, capacity: u64 },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data File Errors
    // -------------------------------------------------------------------------
    #[error("Data file corrupt at offset {offset}: {reason}")]
    LogCorruption { offset: u64, reason: String },

    #[error("Unsupported data file version: {0}")]
    UnsupportedVersion(u16),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Universe has failed and is no longer usable")]
    UniverseFailed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtomError {
    /// Whether this error leaves the universe unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AtomError::CapacityExceeded { .. }
                | AtomError::Io(_)
                | AtomError::LogCorruption { .. }
                | AtomError::UniverseFailed
        )
    }
}

impl From<bincode::Error> for AtomError {
    fn from(err: bincode::Error) -> Self {
        AtomError::Serialization(err.to_string())
    }
}

/// Raised by a verifier to reject an expansion
///
/// Only the expansion that registered the verifier is rolled back; the
/// universe stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expansion verification failed: {reason}")]
pub struct VerificationError {
    pub reason: String,
}

impl VerificationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
