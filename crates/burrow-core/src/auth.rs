// ============================================
// File: crates/burrow-core/src/auth.rs
// ============================================
//! # Authentication Primitives
//!
//! ## Creation Reason
//! Provides the pure pieces of the challenge/response handshake: nonce
//! generation, response computation and constant-time verification. The
//! drivers that move these values over an endpoint (with their 10 s
//! deadlines) live in the tunnel crate.
//!
//! ## Handshake Sequence
//! ```text
//! S → C : nonce (32 bytes, random)
//! C → S : hex_lower(HMAC-SHA256(password, nonce))   // 64 ASCII bytes
//! S → C : "success"  or  "failure"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The nonce MUST come from the OS RNG. Do not substitute anything
//!   seeded from the clock or restricted to a printable charset.
//! - Response comparison MUST stay constant-time; an early-exit compare
//!   leaks how many leading bytes of the HMAC an attacker got right.
//!
//! ## Last Modified
//! v0.1.0 - Initial challenge/response primitives

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

// ============================================
// Constants
// ============================================

/// Size of the server's challenge nonce in bytes.
pub const AUTH_NONCE_SIZE: usize = 32;

/// Size of the hex-encoded challenge response in bytes.
pub const AUTH_RESPONSE_SIZE: usize = 64;

/// Literal verdict packet sent by the server on success.
pub const AUTH_SUCCESS: &[u8] = b"success";

/// Literal verdict packet sent by the server on failure.
pub const AUTH_FAILURE: &[u8] = b"failure";

// ============================================
// Challenge / Response
// ============================================

/// Generates a fresh 32-byte challenge nonce from the OS RNG.
#[must_use]
pub fn generate_nonce() -> [u8; AUTH_NONCE_SIZE] {
    let mut nonce = [0u8; AUTH_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Computes the expected response to a challenge.
///
/// Returns the lowercase hex encoding of `HMAC-SHA256(password, nonce)`:
/// 64 ASCII bytes, sent as one packet.
#[must_use]
pub fn challenge_response(password: &str, nonce: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(password.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(nonce);
    hex::encode(mac.finalize().into_bytes()).into_bytes()
}

/// Verifies a received response against the expected one.
///
/// The comparison is constant-time in the response contents. The length
/// check short-circuits, which is fine: the expected length is public.
#[must_use]
pub fn verify_response(password: &str, nonce: &[u8], response: &[u8]) -> bool {
    let expected = challenge_response(password, nonce);
    if response.len() != expected.len() {
        return false;
    }
    expected.ct_eq(response).into()
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_random_and_sized() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), AUTH_NONCE_SIZE);
        // 2^-256 false-failure probability.
        assert_ne!(a, b);
    }

    #[test]
    fn test_response_is_64_lowercase_hex() {
        let nonce = [0xAA; AUTH_NONCE_SIZE];
        let resp = challenge_response("s3cret", &nonce);

        assert_eq!(resp.len(), AUTH_RESPONSE_SIZE);
        assert!(resp
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)));
    }

    #[test]
    fn test_response_matches_independent_hmac() {
        let nonce = [0xAA; AUTH_NONCE_SIZE];
        let resp = challenge_response("s3cret", &nonce);

        let mut mac = HmacSha256::new_from_slice(b"s3cret").unwrap();
        mac.update(&nonce);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(resp, expected.as_bytes());
    }

    #[test]
    fn test_verify_accepts_correct_response() {
        let nonce = generate_nonce();
        let resp = challenge_response("s3cret", &nonce);
        assert!(verify_response("s3cret", &nonce, &resp));
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let nonce = generate_nonce();
        let resp = challenge_response("wrong", &nonce);
        assert!(!verify_response("s3cret", &nonce, &resp));
    }

    #[test]
    fn test_verify_rejects_wrong_nonce() {
        let resp = challenge_response("s3cret", &generate_nonce());
        assert!(!verify_response("s3cret", &generate_nonce(), &resp));
    }

    #[test]
    fn test_verify_rejects_bad_lengths() {
        let nonce = generate_nonce();
        assert!(!verify_response("s3cret", &nonce, b""));
        assert!(!verify_response("s3cret", &nonce, b"deadbeef"));
    }
}
