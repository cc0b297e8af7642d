// ============================================
// File: crates/burrow-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines the error kinds the packet plane produces, keeping the
//! classes the rest of the system needs to tell apart distinguishable:
//! carrier I/O failures close endpoints, framing errors close stream
//! endpoints, oversized packets are rejected at the send call, TUN
//! write errors are logged and survived.
//!
//! ## Error Categories
//! 1. **Carrier errors**: socket I/O, connect/bind failures
//! 2. **Framing errors**: malformed or truncated stream frames
//! 3. **Endpoint errors**: oversized packets, use-after-close
//! 4. **TUN errors**: device creation, configuration, read/write
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

use burrow_common::error::CommonError;
use burrow_common::types::MAX_PACKET;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Carrier Errors
    // ========================================

    /// Network read/write failed; the endpoint is closed.
    #[error("carrier I/O failed: {context}")]
    CarrierIo {
        /// What operation was being performed
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to bind a listener or socket.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind
        addr: String,
        /// Why binding failed
        reason: String,
    },

    /// Failed to connect to the peer.
    #[error("failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Address we dialed
        addr: String,
        /// Why the dial failed
        reason: String,
    },

    /// An address string did not parse or resolve.
    #[error("invalid address: {addr}")]
    InvalidAddress {
        /// The offending address
        addr: String,
    },

    // ========================================
    // Framing / Endpoint Errors
    // ========================================

    /// Malformed length prefix or truncated read on a stream.
    #[error("framing error: {reason}")]
    Framing {
        /// What was wrong with the frame
        reason: String,
    },

    /// A send attempt exceeded `MAX_PACKET`.
    #[error("packet of {size} bytes exceeds the {MAX_PACKET}-byte limit")]
    OversizedPacket {
        /// Size of the rejected packet
        size: usize,
    },

    /// The endpoint was closed; both packet sequences have terminated.
    #[error("endpoint closed")]
    EndpointClosed,

    /// The listener is shutting down; no further endpoints will arrive.
    #[error("listener shut down")]
    ShuttingDown,

    // ========================================
    // TUN Device Errors
    // ========================================

    /// Failed to create the TUN device.
    #[error("failed to create TUN device '{name}': {reason}")]
    TunCreateFailed {
        /// Requested device name
        name: String,
        /// Why creation failed
        reason: String,
    },

    /// Failed to configure the TUN device.
    #[error("failed to configure TUN device '{name}': {reason}")]
    TunConfigFailed {
        /// Device name
        name: String,
        /// Why configuration failed
        reason: String,
    },

    /// TUN device read failed.
    #[error("TUN read failed: {reason}")]
    TunReadFailed {
        /// Why the read failed
        reason: String,
    },

    /// TUN device write failed. Logged by the pump, not fatal.
    #[error("TUN write failed: {reason}")]
    TunWriteFailed {
        /// Why the write failed
        reason: String,
    },

    /// Operation requires privileges this process lacks.
    #[error("permission denied: {operation}")]
    PermissionDenied {
        /// What operation was denied
        operation: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `CarrierIo` error with context.
    pub fn carrier_io(context: impl Into<String>, source: io::Error) -> Self {
        Self::CarrierIo {
            context: context.into(),
            source,
        }
    }

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::BindFailed {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Framing` error.
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }

    /// Creates a `TunCreateFailed` error.
    pub fn tun_create_failed(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::TunCreateFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `TunConfigFailed` error.
    pub fn tun_config_failed(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::TunConfigFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error terminates its endpoint.
    ///
    /// Everything except a TUN write failure does; the pump logs TUN
    /// write errors and keeps forwarding.
    #[must_use]
    pub const fn is_fatal_to_endpoint(&self) -> bool {
        !matches!(self, Self::TunWriteFailed { .. })
    }

    /// Returns `true` if this is a TUN device error.
    #[must_use]
    pub const fn is_tun_error(&self) -> bool {
        matches!(
            self,
            Self::TunCreateFailed { .. }
                | Self::TunConfigFailed { .. }
                | Self::TunReadFailed { .. }
                | Self::TunWriteFailed { .. }
        )
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::CarrierIo {
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
        let err = TransportError::bind_failed("0.0.0.0:44461", "address in use");
        assert!(err.to_string().contains("0.0.0.0:44461"));
        assert!(err.to_string().contains("address in use"));

        let err = TransportError::OversizedPacket { size: 70_000 };
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn test_fatality_classification() {
        assert!(TransportError::framing("truncated frame").is_fatal_to_endpoint());
        assert!(TransportError::EndpointClosed.is_fatal_to_endpoint());
        assert!(!TransportError::TunWriteFailed {
            reason: "no buffer space".into()
        }
        .is_fatal_to_endpoint());
    }

    #[test]
    fn test_tun_classification() {
        assert!(TransportError::tun_create_failed("tun0", "EPERM").is_tun_error());
        assert!(!TransportError::EndpointClosed.is_tun_error());
    }
}
