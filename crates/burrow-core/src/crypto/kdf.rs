// ============================================
// File: crates/burrow-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation
//!
//! ## Creation Reason
//! Turns the human-chosen shared secret into the symmetric keys the
//! packet ciphers need, with one key per direction.
//!
//! ## Main Functionality
//! - `derive_master_key`: PBKDF2-HMAC-SHA256 over the shared secret
//! - `derive_direction_keys`: HKDF-SHA256 expansion into per-direction
//!   keys, selected by role
//!
//! ## Derivation
//! ```text
//! master = PBKDF2-HMAC-SHA256(secret, salt = "", iterations = 16384, 32)
//! k_c2s  = HKDF-SHA256(master, info = "burrow client-to-server")
//! k_s2c  = HKDF-SHA256(master, info = "burrow server-to-client")
//!
//! client: send = k_c2s, recv = k_s2c
//! server: send = k_s2c, recv = k_c2s
//! ```
//!
//! Separate direction keys are what make the zero-IV CTR mode sound:
//! the two keystreams can never collide even though both start at zero.
//!
//! ## Last Modified
//! v0.1.0 - Initial KDF implementation

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::{Role, TunnelKey, KEY_SIZE, PBKDF2_ITERATIONS};
use crate::error::{CoreError, Result};

/// HKDF info label for the client-to-server direction.
const INFO_CLIENT_TO_SERVER: &[u8] = b"burrow client-to-server";

/// HKDF info label for the server-to-client direction.
const INFO_SERVER_TO_CLIENT: &[u8] = b"burrow server-to-client";

// ============================================
// Key Derivation
// ============================================

/// Derives the 32-byte master key from the shared secret.
///
/// Both ends must be configured with the same secret; the salt is empty
/// and the iteration count fixed so the two derivations agree.
#[must_use]
pub fn derive_master_key(secret: &str) -> TunnelKey {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), b"", PBKDF2_ITERATIONS, &mut out);
    TunnelKey::from_bytes(out)
}

/// Expands the master key into `(send, recv)` keys for this `role`.
///
/// The client's send key equals the server's receive key and vice versa.
///
/// # Errors
/// Returns `KeyDerivation` if HKDF expansion fails (output length out of
/// range, which cannot happen for 32 bytes; kept as an error rather
/// than a panic to match the calling convention).
pub fn derive_direction_keys(master: &TunnelKey, role: Role) -> Result<(TunnelKey, TunnelKey)> {
    let client_to_server = expand_label(master, INFO_CLIENT_TO_SERVER)?;
    let server_to_client = expand_label(master, INFO_SERVER_TO_CLIENT)?;

    match role {
        Role::Client => Ok((client_to_server, server_to_client)),
        Role::Server => Ok((server_to_client, client_to_server)),
    }
}

/// Runs one HKDF-SHA256 expansion with the given info label.
fn expand_label(master: &TunnelKey, info: &[u8]) -> Result<TunnelKey> {
    let hk = Hkdf::<Sha256>::new(None, master.as_bytes());
    let mut out = [0u8; KEY_SIZE];
    hk.expand(info, &mut out)
        .map_err(|_| CoreError::key_derivation("HKDF expansion failed"))?;
    Ok(TunnelKey::from_bytes(out))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_deterministic() {
        let a = derive_master_key("hunter2");
        let b = derive_master_key("hunter2");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_master_key_depends_on_secret() {
        let a = derive_master_key("hunter2");
        let b = derive_master_key("hunter3");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_direction_keys_differ() {
        let master = derive_master_key("hunter2");
        let (send, recv) = derive_direction_keys(&master, Role::Client).unwrap();
        assert_ne!(send.as_bytes(), recv.as_bytes());
        assert_ne!(send.as_bytes(), master.as_bytes());
    }

    #[test]
    fn test_roles_mirror() {
        let master = derive_master_key("hunter2");
        let (client_send, client_recv) =
            derive_direction_keys(&master, Role::Client).unwrap();
        let (server_send, server_recv) =
            derive_direction_keys(&master, Role::Server).unwrap();

        assert_eq!(client_send.as_bytes(), server_recv.as_bytes());
        assert_eq!(client_recv.as_bytes(), server_send.as_bytes());
    }
}
