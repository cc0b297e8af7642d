// ============================================
// File: crates/burrow-tunnel/src/client.rs
// ============================================
//! # Client Supervisor
//!
//! ## Creation Reason
//! The dialing side of the tunnel: tries the candidate transports in
//! order, commits to the first one that produces an authenticated
//! session, and pumps until the session or the device ends.
//!
//! ## Candidate Walk
//! ```text
//! for method in methods:          # default: tcp, udp, icmp, dns
//!     dial          ── error? next candidate
//!     crypto wrap   ── mismatch/timeout? next candidate
//!     authenticate  ── rejected/timeout? next candidate
//!     commit        ── pump until the session ends
//! ```
//! A rejection means the password is wrong and later transports will
//! fail the same way, but the walk continues anyway so a transient
//! server-side hiccup on one transport cannot strand the client.
//!
//! ## Last Modified
//! v0.1.0 - Initial client supervisor

use std::sync::Arc;

use tracing::{info, warn};

use burrow_common::types::TransportKind;
use burrow_core::crypto::Role;
use burrow_transport::endpoint::{CloseSignal, PacketEndpoint};
use burrow_transport::tun::{self, TunDevice};
use burrow_transport::{datagram, stream};

use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::{auth, pump, secure};

// ============================================
// Client
// ============================================

/// The dialing-side supervisor.
pub struct Client {
    config: TunnelConfig,
    server_host: String,
    methods: Vec<TransportKind>,
    shutdown: Arc<CloseSignal>,
}

impl Client {
    /// Creates a client.
    ///
    /// # Arguments
    /// * `config` - shared tunnel configuration
    /// * `server_host` - host name or address of the server
    /// * `methods` - candidate transports, in the order to try
    #[must_use]
    pub fn new(
        config: TunnelConfig,
        server_host: impl Into<String>,
        methods: Vec<TransportKind>,
    ) -> Self {
        Self {
            config,
            server_host: server_host.into(),
            methods,
            shutdown: Arc::new(CloseSignal::new()),
        }
    }

    /// Triggers a graceful shutdown: the TUN device closes and the
    /// pump exits.
    pub fn shutdown(&self) {
        self.shutdown.close();
    }

    /// Runs the tunnel on the given device until the session ends.
    ///
    /// # Errors
    /// Returns `NoTransport` if no candidate produced an authenticated
    /// session.
    pub async fn run(&self, device: Arc<dyn TunDevice>) -> Result<()> {
        if self.config.password_is_default() {
            warn!("running with the default password; change it");
        }

        let endpoint = self.establish_session().await?;
        info!(
            "tunnel up via {} (reliable = {})",
            endpoint.describe(),
            endpoint.is_reliable()
        );

        let mut tun = tun::start(device);

        // A shutdown signal closes the device, which ends the pump.
        let handle = tun.handle.clone();
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            shutdown.wait().await;
            handle.close();
        });

        pump::run(endpoint, &mut tun).await;
        tun.handle.close();
        Ok(())
    }

    /// Walks the candidate transports until one authenticates.
    async fn establish_session(&self) -> Result<PacketEndpoint> {
        let host = self.server_host.as_str();
        let port = self.config.network.port;
        let secret = self.config.crypto_secret();
        let password = &self.config.auth.password;

        for &method in &self.methods {
            info!("trying {method} transport to {host}:{port}");

            let raw = match method {
                TransportKind::Tcp => stream::connect(host, port).await,
                TransportKind::Udp => datagram::connect(host, port).await,
                TransportKind::Icmp | TransportKind::Dns => {
                    warn!("{method} transport is not implemented, skipping");
                    continue;
                }
            };
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("{method} connect failed: {e}");
                    continue;
                }
            };

            let mut secured =
                match secure::establish(raw, secret, Role::Client).await {
                    Ok(secured) => secured,
                    Err(e) => {
                        warn!("{method} crypto handshake failed: {e}");
                        continue;
                    }
                };

            match auth::authenticate_client(&mut secured, password).await {
                Ok(()) => return Ok(secured),
                Err(e) if e.is_auth_rejected() => {
                    warn!("{method} authentication rejected; trying next transport");
                    secured.close();
                }
                Err(e) => {
                    warn!("{method} authentication failed: {e}");
                    secured.close();
                }
            }
        }

        Err(TunnelError::NoTransport)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_host", &self.server_host)
            .field("methods", &self.methods)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
