// ============================================
// File: crates/burrow-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides the base error enum and result alias used across all burrow
//! crates, so the transport, crypto and tunnel layers can wrap a shared
//! foundation instead of inventing incompatible variants.
//!
//! ## Main Functionality
//! - `CommonError`: base error enum for validation, I/O and state errors
//! - `Result<T>`: type alias using `CommonError`
//!
//! ## Design Philosophy
//! - `thiserror` struct variants with convenience constructors
//! - Errors carry enough context to be actionable in logs
//! - Never include secret material (keys, passwords) in error messages
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Base error types shared across burrow crates.
///
/// # Categories
/// - **Validation**: bad input or configuration values
/// - **IO**: system I/O failures with context
/// - **State**: timeouts and invalid lifecycle transitions
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the offending field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },

    /// Data length doesn't match the expected size.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// System I/O error occurred.
    #[error("I/O error: {context}")]
    Io {
        /// What operation was being performed
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Operation timed out.
    #[error("operation timed out: {operation} after {duration_ms}ms")]
    Timeout {
        /// What operation timed out
        operation: String,
        /// How long we waited
        duration_ms: u64,
    },

    /// Internal error (bug or unexpected condition).
    #[error("internal error: {message}")]
    Internal {
        /// Description of what went wrong
        message: String,
    },
}

impl CommonError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidLength` error.
    pub const fn invalid_length(expected: usize, actual: usize) -> Self {
        Self::InvalidLength { expected, actual }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for CommonError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified I/O operation".into(),
            source: err,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_input("netmask", "not an IPv4 mask");
        assert!(err.to_string().contains("netmask"));
        assert!(err.to_string().contains("IPv4"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CommonError::timeout("handshake", 10_000).is_retryable());

        let interrupted = CommonError::io(
            "socket read",
            io::Error::new(io::ErrorKind::Interrupted, "interrupted"),
        );
        assert!(interrupted.is_retryable());

        assert!(!CommonError::internal("bug").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let common: CommonError = io_err.into();
        assert!(matches!(common, CommonError::Io { .. }));
    }
}
