// ============================================
// File: crates/burrow-tunnel/src/error.rs
// ============================================
//! # Tunnel Error Types
//!
//! ## Creation Reason
//! Top-level error enum for the supervisors and the binary, wrapping
//! the transport and crypto layers' errors and adding the few kinds
//! only the supervisors produce.
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use burrow_common::error::CommonError;
use burrow_core::error::CoreError;
use burrow_transport::error::TransportError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

// ============================================
// TunnelError
// ============================================

/// Supervisor-level error types.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Transport layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Crypto or authentication failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration problem.
    #[error("configuration error: {field} - {reason}")]
    Config {
        /// Offending configuration field
        field: String,
        /// Why it's invalid
        reason: String,
    },

    /// Every candidate transport was tried; none produced an
    /// authenticated session.
    #[error("no transport could establish an authenticated session")]
    NoTransport,

    /// This platform has no TUN device support compiled in.
    #[error("TUN devices are not supported on this platform")]
    UnsupportedPlatform,

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TunnelError {
    /// Creates a `Config` error.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the peer explicitly rejected authentication.
    #[must_use]
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Core(CoreError::AuthRejected))
    }

    /// Returns `true` if a handshake deadline elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Core(CoreError::AuthTimeout))
    }
}

// ============================================
// Tests
// ============================================
