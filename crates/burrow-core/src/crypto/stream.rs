// ============================================
// File: crates/burrow-core/src/crypto/stream.rs
// ============================================
//! # Reliable-Carrier Cipher (AES-CTR + HMAC)
//!
//! ## Creation Reason
//! Implements the stateful cipher mode used when the carrier preserves
//! ordering and delivery: a running AES-256-CTR keystream per direction
//! with an HMAC-SHA256 tag authenticating each packet's ciphertext.
//!
//! ## Wire Format
//! ```text
//! ┌───────────────────────────────┬──────────────────────────┐
//! │ ciphertext (len == plaintext) │ HMAC-SHA256 tag (32 B)   │
//! └───────────────────────────────┴──────────────────────────┘
//! ```
//!
//! ## Main Logical Flow
//! 1. `seal`: XOR plaintext with the next keystream bytes, append the
//!    tag computed over the ciphertext
//! 2. `open`: split the trailing 32 bytes, verify in constant time,
//!    only then XOR with the receive keystream
//!
//! ## ⚠️ Important Note for Next Developer
//! - The IV is fixed all-zero; this is only sound because each
//!   direction runs on its own derived key (see `kdf`)
//! - A failed tag check MUST NOT advance the keystream, otherwise one
//!   forged packet would desynchronize the whole direction
//! - Ordering is load-bearing: this mode is never paired with an
//!   unreliable carrier
//!
//! ## Last Modified
//! v0.1.0 - Initial reliable-mode cipher

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{PacketCipher, TunnelKey, HMAC_TAG_SIZE};
use crate::error::{CoreError, Result};

/// AES-256 in CTR mode with a big-endian 128-bit counter.
type Aes256Ctr = Ctr128BE<Aes256>;

/// HMAC-SHA256 keyed with the direction key.
type HmacSha256 = Hmac<Sha256>;

// ============================================
// CtrHmacCipher
// ============================================

/// One direction of a reliable-carrier connection.
///
/// Holds the running keystream position and an HMAC prototype that is
/// cloned per packet. Create one instance for sending and an
/// independent one for receiving; their positions advance separately.
pub struct CtrHmacCipher {
    /// Running CTR keystream.
    stream: Aes256Ctr,
    /// HMAC prototype, cloned for each packet.
    mac: HmacSha256,
}

impl CtrHmacCipher {
    /// Creates a cipher for one direction from its derived key.
    ///
    /// The IV is all zeroes; see the module notes for why that is
    /// acceptable here.
    ///
    /// # Errors
    /// Returns `CipherInit` if the HMAC rejects the key (it accepts any
    /// length, so this indicates a bug).
    pub fn new(key: &TunnelKey) -> Result<Self> {
        let iv = [0u8; 16];
        let stream = Aes256Ctr::new(key.as_bytes().into(), &iv.into());
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|_| CoreError::cipher_init("HMAC key rejected"))?;
        Ok(Self { stream, mac })
    }
}

impl PacketCipher for CtrHmacCipher {
    fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(plaintext.len() + HMAC_TAG_SIZE);
        out.extend_from_slice(plaintext);
        self.stream.apply_keystream(&mut out);

        let mut mac = self.mac.clone();
        mac.update(&out);
        out.extend_from_slice(&mac.finalize().into_bytes());
        out
    }

    fn open(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < HMAC_TAG_SIZE {
            return Err(CoreError::DecryptFailure);
        }
        let (ciphertext, tag) = payload.split_at(payload.len() - HMAC_TAG_SIZE);

        // Verify before touching the keystream; `verify_slice` compares
        // in constant time.
        let mut mac = self.mac.clone();
        mac.update(ciphertext);
        mac.verify_slice(tag).map_err(|_| CoreError::DecryptFailure)?;

        let mut out = ciphertext.to_vec();
        self.stream.apply_keystream(&mut out);
        Ok(out)
    }

    fn overhead(&self) -> usize {
        HMAC_TAG_SIZE
    }
}

impl std::fmt::Debug for CtrHmacCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrHmacCipher").finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
