// ============================================
// File: crates/burrow-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines the crypto- and authentication-specific error kinds so callers
//! can distinguish "drop this packet" from "tear down this connection".
//!
//! ## Error Categories
//! 1. **Key errors**: derivation or cipher construction failed
//! 2. **Per-packet errors**: `DecryptFailure` (swallowed at packet
//!    granularity by the receive path)
//! 3. **Handshake errors**: liveness exchange and authentication outcomes
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use burrow_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core crypto operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Crypto and authentication error types.
///
/// `DecryptFailure` is the only variant handled at packet granularity:
/// the receive path drops the packet and continues. Every other variant
/// terminates the containing endpoint.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key derivation failed.
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    /// Cipher construction failed.
    #[error("cipher initialization failed: {reason}")]
    CipherInit {
        /// Why initialization failed
        reason: String,
    },

    /// Per-packet authentication tag or MAC did not verify.
    ///
    /// The packet is dropped; the endpoint continues.
    #[error("packet failed decryption")]
    DecryptFailure,

    /// The liveness exchange after wrapping failed (mismatch or timeout).
    #[error("crypto handshake failed: {reason}")]
    CryptoHandshakeFailed {
        /// Why the handshake failed
        reason: String,
    },

    /// The peer rejected our authentication, or our peer's response was
    /// wrong.
    #[error("authentication rejected")]
    AuthRejected,

    /// The 10-second authentication deadline elapsed.
    #[error("authentication timed out")]
    AuthTimeout,

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `KeyDerivation` error.
    pub fn key_derivation(reason: impl Into<String>) -> Self {
        Self::KeyDerivation {
            reason: reason.into(),
        }
    }

    /// Creates a `CipherInit` error.
    pub fn cipher_init(reason: impl Into<String>) -> Self {
        Self::CipherInit {
            reason: reason.into(),
        }
    }

    /// Creates a `CryptoHandshakeFailed` error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::CryptoHandshakeFailed {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the error is recoverable at packet granularity.
    ///
    /// Only decrypt failures are; they reflect the spoofable nature of
    /// unreliable carriers.
    #[must_use]
    pub const fn is_packet_level(&self) -> bool {
        matches!(self, Self::DecryptFailure)
    }

    /// Returns `true` if the error is an authentication outcome rather
    /// than an I/O or crypto fault.
    #[must_use]
    pub const fn is_auth_outcome(&self) -> bool {
        matches!(self, Self::AuthRejected | Self::AuthTimeout)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CoreError::DecryptFailure.is_packet_level());
        assert!(!CoreError::AuthRejected.is_packet_level());

        assert!(CoreError::AuthRejected.is_auth_outcome());
        assert!(CoreError::AuthTimeout.is_auth_outcome());
        assert!(!CoreError::handshake_failed("probe mismatch").is_auth_outcome());
    }

    #[test]
    fn test_display_has_no_secrets() {
        let err = CoreError::key_derivation("output length");
        let text = err.to_string();
        assert!(text.contains("output length"));
    }
}
