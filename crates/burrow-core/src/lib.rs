// ============================================
// File: crates/burrow-core/src/lib.rs
// ============================================
//! # Burrow Core
//!
//! ## Creation Reason
//! Pure cryptographic core of the burrow tunnel: key derivation from the
//! shared secret, the two per-carrier packet cipher modes, and the
//! challenge/response authentication primitives. No I/O lives here.
//!
//! ## Main Functionality
//! - [`crypto`]: `TunnelKey`, KDF, `PacketCipher` and both cipher modes
//! - [`auth`]: challenge nonce and HMAC response computation
//! - [`error`]: `CoreError` covering crypto and authentication failures
//!
//! ## Design Philosophy
//! - All primitives come from audited RustCrypto crates
//! - Key material is zeroized on drop and never logged
//! - Everything that compares secrets does so in constant time
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto core

pub mod auth;
pub mod crypto;
pub mod error;

pub use crypto::{cipher_pair, PacketCipher, Role, TunnelKey};
pub use error::{CoreError, Result};
