// ============================================
// File: crates/burrow-core/src/crypto/sealed.rs
// ============================================
//! # Unreliable-Carrier Cipher (Secret-Box)
//!
//! ## Creation Reason
//! Implements the stateless cipher mode used when the carrier may drop,
//! reorder or duplicate packets: every packet is an independent
//! XSalsa20-Poly1305 secret-box under a fresh random nonce.
//!
//! ## Wire Format
//! ```text
//! ┌────────────────────────────────────┬─────────────────────┐
//! │ sealed box (plaintext + 16 B tag)  │ nonce (24 B, random)│
//! └────────────────────────────────────┴─────────────────────┘
//! ```
//!
//! The nonce travels with the packet because nothing about an
//! unreliable carrier lets the receiver predict it.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nonces come from the OS RNG; never derive them from a counter
//!   here, packets are not ordered
//! - There is deliberately no replay protection; a nonce-window scheme
//!   would be layered on top of this mode if that ever changes
//!
//! ## Last Modified
//! v0.1.0 - Initial unreliable-mode cipher

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;
use rand::RngCore;

use super::{PacketCipher, TunnelKey, SECRETBOX_NONCE_SIZE, SECRETBOX_TAG_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// SecretboxCipher
// ============================================

/// One direction of an unreliable-carrier connection.
///
/// Stateless apart from the key: sealing N packets in any order opens
/// in any order (or not at all, if the network dropped them).
pub struct SecretboxCipher {
    cipher: XSalsa20Poly1305,
}

impl SecretboxCipher {
    /// Creates a cipher for one direction from its derived key.
    ///
    /// # Errors
    /// Returns `CipherInit` if the key length is rejected.
    pub fn new(key: &TunnelKey) -> Result<Self> {
        let cipher = XSalsa20Poly1305::new_from_slice(key.as_bytes())
            .map_err(|_| CoreError::cipher_init("secret-box key rejected"))?;
        Ok(Self { cipher })
    }
}

impl PacketCipher for SecretboxCipher {
    fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = Nonce::default();
        OsRng.fill_bytes(&mut nonce);

        // Sealing only fails on astronomically oversized inputs, which
        // MAX_PACKET rules out upstream.
        let mut out = self
            .cipher
            .encrypt(&nonce, plaintext)
            .unwrap_or_default();
        out.extend_from_slice(&nonce);
        out
    }

    fn open(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < SECRETBOX_NONCE_SIZE + SECRETBOX_TAG_SIZE {
            return Err(CoreError::DecryptFailure);
        }
        let (sealed, nonce_bytes) = payload.split_at(payload.len() - SECRETBOX_NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, sealed)
            .map_err(|_| CoreError::DecryptFailure)
    }

    fn overhead(&self) -> usize {
        SECRETBOX_NONCE_SIZE + SECRETBOX_TAG_SIZE
    }
}

impl std::fmt::Debug for SecretboxCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretboxCipher").finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
