// ============================================
// File: crates/burrow-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the tunnel's cryptography: deriving keys from the shared
//! secret and sealing/opening packets with the mode that matches the
//! carrier's semantics.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`kdf`]: PBKDF2 master key + HKDF per-direction keys
//! - [`stream`]: AES-256-CTR + HMAC-SHA256 for reliable carriers
//! - [`sealed`]: XSalsa20-Poly1305 secret-box for unreliable carriers
//!
//! ## Mode Selection
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ reliable carrier (ordered, lossless)                         │
//! │   per-direction AES-256-CTR keystream, zero IV               │
//! │   wire: ciphertext || HMAC-SHA256(ciphertext)   (32-byte tag)│
//! ├──────────────────────────────────────────────────────────────┤
//! │ unreliable carrier (drops, reorders, duplicates)             │
//! │   stateless secret-box, fresh random nonce per packet        │
//! │   wire: sealed_box || nonce                     (24-byte nonce)│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The CTR mode is only sound because each direction runs on its own
//! HKDF-derived key and the carrier preserves per-direction ordering;
//! the send and receive keystream positions must never be shared.
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL implementations use RustCrypto (audited)
//! - Key material implements Zeroize and is never logged
//! - There is no replay protection on unreliable carriers; a nonce
//!   window would slot into the sealed mode if that ever changes
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;

pub mod kdf;
pub mod sealed;
pub mod stream;

pub use sealed::SecretboxCipher;
pub use stream::CtrHmacCipher;

// ============================================
// Constants
// ============================================

/// Size of a derived tunnel key in bytes (AES-256 and secret-box).
pub const KEY_SIZE: usize = 32;

/// PBKDF2 iteration count for the master key.
pub const PBKDF2_ITERATIONS: u32 = 16_384;

/// Size of the HMAC-SHA256 tag appended in reliable mode.
pub const HMAC_TAG_SIZE: usize = 32;

/// Size of the per-packet random nonce appended in unreliable mode.
pub const SECRETBOX_NONCE_SIZE: usize = 24;

/// Size of the Poly1305 tag inside a sealed box.
pub const SECRETBOX_TAG_SIZE: usize = 16;

/// Literal probe exchanged (encrypted) right after wrapping to confirm
/// both sides derived the same keys.
pub const LIVENESS_PROBE: &[u8] = b"this is a test string";

// ============================================
// Role
// ============================================

/// Which side of the tunnel this process is.
///
/// Determines which HKDF direction label feeds the send path and which
/// feeds the receive path; the two sides make mirrored choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The dialing side.
    Client,
    /// The listening side.
    Server,
}

// ============================================
// TunnelKey
// ============================================

/// A derived 32-byte symmetric key.
///
/// # Security
/// - Zeroed on drop
/// - Never printed; `Debug` redacts the material
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TunnelKey([u8; KEY_SIZE]);

impl TunnelKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    ///
    /// # Security Warning
    /// Feed the reference straight into a cipher constructor; do not log
    /// or persist it.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelKey([REDACTED])")
    }
}

// ============================================
// PacketCipher
// ============================================

/// Seals and opens whole packets.
///
/// Implementations may be stateful (the CTR keystream advances on every
/// sealed/opened packet) so sealing takes `&mut self`. One instance
/// serves exactly one direction of one connection.
pub trait PacketCipher: Send {
    /// Encrypts a plaintext packet, producing the wire payload.
    fn seal(&mut self, plaintext: &[u8]) -> Vec<u8>;

    /// Decrypts a wire payload back into a plaintext packet.
    ///
    /// # Errors
    /// Returns `DecryptFailure` if the tag does not verify; the caller
    /// drops the packet and continues.
    fn open(&mut self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Bytes of overhead this cipher adds to each packet.
    fn overhead(&self) -> usize;
}

// ============================================
// Cipher Pair Factory
// ============================================

/// Builds the (send, receive) cipher pair for one connection.
///
/// The mode is selected by the carrier's reliability; the keys are
/// derived from `secret` with one key per direction, assigned by `role`
/// so the two ends make mirrored choices.
///
/// # Errors
/// Returns `KeyDerivation`/`CipherInit` if the primitives reject the
/// derived material (which indicates a bug, not bad input).
pub fn cipher_pair(
    secret: &str,
    role: Role,
    reliable: bool,
) -> Result<(Box<dyn PacketCipher>, Box<dyn PacketCipher>)> {
    let master = kdf::derive_master_key(secret);
    let (send_key, recv_key) = kdf::derive_direction_keys(&master, role)?;

    if reliable {
        Ok((
            Box::new(CtrHmacCipher::new(&send_key)?),
            Box::new(CtrHmacCipher::new(&recv_key)?),
        ))
    } else {
        Ok((
            Box::new(SecretboxCipher::new(&send_key)?),
            Box::new(SecretboxCipher::new(&recv_key)?),
        ))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_key_debug_redacts() {
        let key = TunnelKey::from_bytes([0x42; KEY_SIZE]);
        let text = format!("{key:?}");
        assert!(!text.contains("42"));
        assert!(text.contains("REDACTED"));
    }

    #[test]
    fn test_cipher_pair_roundtrip_reliable() {
        let (mut client_send, _client_recv) =
            cipher_pair("swordfish", Role::Client, true).unwrap();
        let (_server_send, mut server_recv) =
            cipher_pair("swordfish", Role::Server, true).unwrap();

        let sealed = client_send.seal(b"over the wire");
        let opened = server_recv.open(&sealed).unwrap();
        assert_eq!(opened, b"over the wire");
    }

    #[test]
    fn test_cipher_pair_roundtrip_unreliable() {
        let (mut client_send, _client_recv) =
            cipher_pair("swordfish", Role::Client, false).unwrap();
        let (_server_send, mut server_recv) =
            cipher_pair("swordfish", Role::Server, false).unwrap();

        let sealed = client_send.seal(b"datagram payload");
        let opened = server_recv.open(&sealed).unwrap();
        assert_eq!(opened, b"datagram payload");
    }

    #[test]
    fn test_cipher_pair_directions_are_independent() {
        // A packet sealed by the client's send cipher must not open with
        // the client's own receive cipher; directions use distinct keys.
        let (mut send, mut recv) = cipher_pair("swordfish", Role::Client, false).unwrap();
        let sealed = send.seal(b"one way only");
        assert!(recv.open(&sealed).is_err());
    }

    #[test]
    fn test_cipher_pair_wrong_secret_fails() {
        let (mut client_send, _) = cipher_pair("right", Role::Client, false).unwrap();
        let (_, mut server_recv) = cipher_pair("wrong", Role::Server, false).unwrap();

        let sealed = client_send.seal(b"payload");
        assert!(server_recv.open(&sealed).is_err());
    }

    #[test]
    fn test_overhead_by_mode() {
        let (send, _) = cipher_pair("k", Role::Client, true).unwrap();
        assert_eq!(send.overhead(), HMAC_TAG_SIZE);

        let (send, _) = cipher_pair("k", Role::Client, false).unwrap();
        assert_eq!(send.overhead(), SECRETBOX_NONCE_SIZE + SECRETBOX_TAG_SIZE);
    }
}
