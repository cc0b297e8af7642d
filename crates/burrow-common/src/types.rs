// ============================================
// File: crates/burrow-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the fundamental tunnel vocabulary: what a packet is, how
//! large it may be, which port the tunnel speaks on, and which carrier
//! transports exist.
//!
//! ## Main Functionality
//! - `Packet`: one whole opaque message carried through the tunnel
//! - `MAX_PACKET`: upper bound on packet size (matches the u16 framing)
//! - `TransportKind`: the carrier transports a client may try
//!
//! ## Main Logical Flow
//! 1. The TUN device or a peer produces a `Packet`
//! 2. Transports move whole packets; no internal structure is imposed
//! 3. `TransportKind::expand` turns the user's method list into candidates
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

// ============================================
// Constants
// ============================================

/// Maximum size of a single tunnel packet in bytes.
///
/// This is the largest value representable in the stream transport's
/// `u16` length prefix, and also the largest UDP payload we will read.
pub const MAX_PACKET: usize = 65_535;

/// Default port used by both the stream and datagram transports.
pub const DEFAULT_PORT: u16 = 44_461;

// ============================================
// Packet
// ============================================

/// One whole message carried through the tunnel.
///
/// A packet read from the TUN device is an IP datagram; a packet received
/// from the peer is written verbatim to the TUN device. The transport
/// layer treats the contents as opaque.
pub type Packet = Vec<u8>;

// ============================================
// TransportKind
// ============================================

/// The carrier transports a tunnel can ride on.
///
/// Only `Tcp` and `Udp` are currently implemented; `Icmp` and `Dns` are
/// declared so the candidate list and CLI accept them, and are skipped
/// with a log message when tried.
///
/// # Example
/// ```
/// use burrow_common::types::TransportKind;
///
/// let methods = TransportKind::expand("all").unwrap();
/// assert_eq!(methods.len(), 4);
/// assert_eq!(methods[0], TransportKind::Tcp);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Reliable byte stream (length-framed packets).
    Tcp,
    /// Connectionless datagrams (one packet per datagram).
    Udp,
    /// ICMP echo carrier (declared, not implemented).
    Icmp,
    /// DNS carrier (declared, not implemented).
    Dns,
}

impl TransportKind {
    /// All transports, in the order a client tries them by default.
    pub const ALL: [Self; 4] = [Self::Tcp, Self::Udp, Self::Icmp, Self::Dns];

    /// Returns the lowercase name used on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Dns => "dns",
        }
    }

    /// Returns `true` if this transport preserves ordering and delivery.
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        matches!(self, Self::Tcp)
    }

    /// Parses a comma-separated method list into an ordered candidate list.
    ///
    /// The token `all` expands in place to `tcp,udp,icmp,dns`.
    ///
    /// # Errors
    /// Returns `InvalidInput` for an unknown token or an empty list.
    pub fn expand(list: &str) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if token == "all" {
                out.extend(Self::ALL);
            } else {
                out.push(token.parse()?);
            }
        }

        if out.is_empty() {
            return Err(CommonError::invalid_input(
                "methods",
                "no transport methods given",
            ));
        }
        Ok(out)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            "dns" => Ok(Self::Dns),
            other => Err(CommonError::invalid_input(
                "method",
                format!("unknown transport '{other}' (expected tcp/udp/icmp/dns/all)"),
            )),
        }
    }
}

// ============================================
// Tests
// ============================================
