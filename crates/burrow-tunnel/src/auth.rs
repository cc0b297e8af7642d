// ============================================
// File: crates/burrow-tunnel/src/auth.rs
// ============================================
//! # Authentication Drivers
//!
//! ## Creation Reason
//! Runs the challenge/response handshake over an established (already
//! encrypted) endpoint: the server issues and judges the challenge, the
//! client answers it. The pure computations live in
//! `burrow_core::auth`; this module owns the packet exchange and the
//! 10-second deadlines.
//!
//! ## Protocol
//! ```text
//! S → C : nonce (32 bytes, random)
//! C → S : hex_lower(HMAC-SHA256(password, nonce))   // 64 ASCII bytes
//! S → C : "success"  or  "failure"
//! ```
//! On a wrong response the server says `"failure"` and closes. On a
//! timeout it closes without a verdict: silence, so a prober learns
//! nothing.
//!
//! ## Last Modified
//! v0.1.0 - Initial authentication drivers

use tokio::time::timeout;
use tracing::{debug, info, warn};

use burrow_core::auth::{
    challenge_response, generate_nonce, verify_response, AUTH_FAILURE, AUTH_SUCCESS,
};
use burrow_core::error::CoreError;
use burrow_transport::endpoint::PacketEndpoint;
use burrow_transport::error::TransportError;

use crate::error::Result;
use crate::secure::HANDSHAKE_TIMEOUT;

// ============================================
// Server Side
// ============================================

/// Challenges the peer and judges its response.
///
/// # Errors
/// - `AuthTimeout` if no response arrives within 10 s (the endpoint is
///   closed without a verdict)
/// - `AuthRejected` if the response is wrong (after sending "failure")
/// - Transport errors if the carrier dies mid-handshake
pub async fn authenticate_server(
    endpoint: &mut PacketEndpoint,
    password: &str,
) -> Result<()> {
    let nonce = generate_nonce();
    endpoint.send(nonce.to_vec()).await?;

    let response = match timeout(HANDSHAKE_TIMEOUT, endpoint.recv()).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            return Err(TransportError::EndpointClosed.into());
        }
        Err(_) => {
            debug!(endpoint = %endpoint.describe(), "authentication timed out, closing silently");
            endpoint.close();
            return Err(CoreError::AuthTimeout.into());
        }
    };

    if verify_response(password, &nonce, &response) {
        endpoint.send(AUTH_SUCCESS.to_vec()).await?;
        info!(endpoint = %endpoint.describe(), "peer authenticated");
        Ok(())
    } else {
        warn!(endpoint = %endpoint.describe(), "peer failed authentication");
        // Best effort; the peer may already be gone.
        let _ = endpoint.send(AUTH_FAILURE.to_vec()).await;
        endpoint.close();
        Err(CoreError::AuthRejected.into())
    }
}

// ============================================
// Client Side
// ============================================

/// Waits for the server's challenge, answers it, and waits for the
/// verdict.
///
/// # Errors
/// - `AuthTimeout` if the nonce or the verdict fails to arrive in 10 s
/// - `AuthRejected` on a "failure" verdict (wrong password) or an
///   unrecognized one
/// - Transport errors if the carrier dies mid-handshake
pub async fn authenticate_client(
    endpoint: &mut PacketEndpoint,
    password: &str,
) -> Result<()> {
    let nonce = match timeout(HANDSHAKE_TIMEOUT, endpoint.recv()).await {
        Ok(Some(nonce)) => nonce,
        Ok(None) => return Err(TransportError::EndpointClosed.into()),
        Err(_) => {
            endpoint.close();
            return Err(CoreError::AuthTimeout.into());
        }
    };

    endpoint
        .send(challenge_response(password, &nonce))
        .await?;

    let verdict = match timeout(HANDSHAKE_TIMEOUT, endpoint.recv()).await {
        Ok(Some(verdict)) => verdict,
        Ok(None) => return Err(TransportError::EndpointClosed.into()),
        Err(_) => {
            endpoint.close();
            return Err(CoreError::AuthTimeout.into());
        }
    };

    if verdict == AUTH_SUCCESS {
        info!(endpoint = %endpoint.describe(), "authenticated with server");
        Ok(())
    } else if verdict == AUTH_FAILURE {
        warn!("server rejected authentication (wrong password?)");
        endpoint.close();
        Err(CoreError::AuthRejected.into())
    } else {
        warn!("unexpected authentication verdict ({} bytes)", verdict.len());
        endpoint.close();
        Err(CoreError::AuthRejected.into())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TunnelError;
    use burrow_transport::endpoint::memory_pair;

    #[tokio::test]
    async fn test_matching_passwords_authenticate() {
        let (mut server_side, mut client_side) = memory_pair(true);

        let (server, client) = tokio::join!(
            authenticate_server(&mut server_side, "s3cret"),
            authenticate_client(&mut client_side, "s3cret"),
        );

        server.unwrap();
        client.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_password_rejected_on_both_sides() {
        let (mut server_side, mut client_side) = memory_pair(true);

        let (server, client) = tokio::join!(
            authenticate_server(&mut server_side, "s3cret"),
            authenticate_client(&mut client_side, "wrong"),
        );

        assert!(matches!(
            server,
            Err(TunnelError::Core(CoreError::AuthRejected))
        ));
        assert!(matches!(
            client,
            Err(TunnelError::Core(CoreError::AuthRejected))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_times_out_on_silent_client() {
        let (mut server_side, mut client_side) = memory_pair(true);

        let server = tokio::spawn(async move {
            authenticate_server(&mut server_side, "s3cret").await
        });

        // Consume the nonce, then say nothing.
        let nonce = client_side.recv().await.unwrap();
        assert_eq!(nonce.len(), 32);

        let result = server.await.unwrap();
        assert!(matches!(
            result,
            Err(TunnelError::Core(CoreError::AuthTimeout))
        ));

        // The server closed silently: no verdict packet arrived, the
        // endpoint just ended.
        assert!(client_side.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_times_out_waiting_for_nonce() {
        let (_server_side, mut client_side) = memory_pair(true);

        let result = authenticate_client(&mut client_side, "s3cret").await;
        assert!(matches!(
            result,
            Err(TunnelError::Core(CoreError::AuthTimeout))
        ));
    }

    #[tokio::test]
    async fn test_client_rejects_unexpected_verdict() {
        let (mut server_side, mut client_side) = memory_pair(true);

        let driver = tokio::spawn(async move {
            // Act like a server up to the verdict, then say something
            // neither "success" nor "failure".
            server_side.send(vec![0xAA; 32]).await.unwrap();
            let _response = server_side.recv().await.unwrap();
            server_side.send(b"maybe".to_vec()).await.unwrap();
            server_side
        });

        let result = authenticate_client(&mut client_side, "s3cret").await;
        assert!(matches!(
            result,
            Err(TunnelError::Core(CoreError::AuthRejected))
        ));
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_nonce_is_32_random_bytes_per_handshake() {
        let (mut server_a, mut client_a) = memory_pair(true);
        let (mut server_b, mut client_b) = memory_pair(true);

        let driver_a =
            tokio::spawn(async move { authenticate_server(&mut server_a, "p").await });
        let driver_b =
            tokio::spawn(async move { authenticate_server(&mut server_b, "p").await });

        let nonce_a = client_a.recv().await.unwrap();
        let nonce_b = client_b.recv().await.unwrap();
        assert_eq!(nonce_a.len(), 32);
        assert_eq!(nonce_b.len(), 32);
        assert_ne!(nonce_a, nonce_b);

        // Let the servers time out in the background.
        client_a.close();
        client_b.close();
        let _ = driver_a.await;
        let _ = driver_b.await;
    }
}
