// ============================================
// File: crates/burrow-tunnel/src/server.rs
// ============================================
//! # Server Supervisor
//!
//! ## Creation Reason
//! The listening side of the tunnel: owns the TUN device, runs both
//! listeners on the tunnel port, and walks every accepted endpoint
//! through crypto wrap → authentication → pump.
//!
//! ## Server Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Server                             │
//! │                                                           │
//! │  StreamListener ──┐                                       │
//! │                   ├── accept merge ──► session task       │
//! │  DatagramListener ┘                      │                │
//! │                                          ▼                │
//! │                         secure::establish (10 s)          │
//! │                         auth::authenticate_server (10 s)  │
//! │                         pump::run  (holds the TUN slot)   │
//! │                                                           │
//! │  TUN device ── tun::start ──► one TunChannels slot        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single Active Session
//! The TUN device has one inbound consumer, so exactly one session may
//! pump at a time. The `TunChannels` live in a `try_lock`-guarded
//! slot: the session that wins the lock runs; any endpoint accepted
//! while the slot is taken is closed with a logged reason.
//!
//! ## Last Modified
//! v0.1.0 - Initial server supervisor

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use burrow_core::crypto::Role;
use burrow_transport::datagram::DatagramListener;
use burrow_transport::endpoint::{CloseSignal, PacketEndpoint, PacketListener};
use burrow_transport::stream::StreamListener;
use burrow_transport::tun::{self, TunChannels, TunDevice};

use crate::config::TunnelConfig;
use crate::error::Result;
use crate::{auth, pump, secure};

/// Accepted endpoints queued across both listeners.
const ACCEPT_MERGE_DEPTH: usize = 8;

// ============================================
// Server
// ============================================

/// The listening-side supervisor.
///
/// # Lifecycle
/// 1. `Server::new(config)`
/// 2. `server.bind()` to open the listeners
/// 3. `server.serve(device, listeners)` until `shutdown()`
pub struct Server {
    config: TunnelConfig,
    shutdown: Arc<CloseSignal>,
}

/// Both listeners, bound but not yet serving.
pub struct ServerListeners {
    /// The reliable transport's listener.
    pub stream: StreamListener,
    /// The unreliable transport's listener.
    pub datagram: DatagramListener,
}

impl Server {
    /// Creates a server from its configuration.
    #[must_use]
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(CloseSignal::new()),
        }
    }

    /// Triggers a graceful shutdown: the serve loop stops, the TUN
    /// device closes, the active pump (if any) exits.
    pub fn shutdown(&self) {
        self.shutdown.close();
    }

    /// Binds both transports on the configured port.
    ///
    /// # Errors
    /// Returns bind failures from either transport.
    pub async fn bind(&self) -> Result<ServerListeners> {
        let bind_addr = &self.config.network.bind_addr;
        let port = self.config.network.port;

        let stream = StreamListener::bind(bind_addr, port).await?;
        // The datagram listener reuses the stream listener's actual
        // port so a port-zero bind lands both transports together.
        let datagram =
            DatagramListener::bind(bind_addr, stream.local_addr().port()).await?;

        Ok(ServerListeners { stream, datagram })
    }

    /// Serves accepted clients until shutdown.
    ///
    /// # Errors
    /// Currently only startup-time errors; per-client failures are
    /// logged and the loop continues.
    pub async fn serve(
        &self,
        device: Arc<dyn TunDevice>,
        listeners: ServerListeners,
    ) -> Result<()> {
        if self.config.password_is_default() {
            warn!("running with the default password; anyone can authenticate");
        }

        let tun = tun::start(device);
        let tun_handle = tun.handle.clone();
        let tun_slot = Arc::new(Mutex::new(tun));

        let (accept_tx, mut accept_rx) = mpsc::channel(ACCEPT_MERGE_DEPTH);
        spawn_accept_loop(
            Box::new(listeners.stream),
            accept_tx.clone(),
            Arc::clone(&self.shutdown),
        );
        spawn_accept_loop(
            Box::new(listeners.datagram),
            accept_tx,
            Arc::clone(&self.shutdown),
        );

        info!("server ready on port {}", self.config.network.port);

        loop {
            tokio::select! {
                () = self.shutdown.wait() => {
                    info!("server shutting down");
                    break;
                }
                accepted = accept_rx.recv() => match accepted {
                    Some(endpoint) => self.dispatch(endpoint, &tun_slot),
                    None => break,
                },
            }
        }

        tun_handle.close();
        Ok(())
    }

    /// Starts a session for an accepted endpoint, or rejects it if a
    /// session is already active.
    fn dispatch(&self, endpoint: PacketEndpoint, tun_slot: &Arc<Mutex<TunChannels>>) {
        info!("accepted {}", endpoint.describe());

        match Arc::clone(tun_slot).try_lock_owned() {
            Ok(tun) => {
                let secret = self.config.crypto_secret().to_string();
                let password = self.config.auth.password.clone();
                tokio::spawn(run_session(endpoint, tun, secret, password));
            }
            Err(_) => {
                warn!(
                    "closing {}: another session is active",
                    endpoint.describe()
                );
                endpoint.close();
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_addr", &self.config.network.bind_addr)
            .field("port", &self.config.network.port)
            .finish()
    }
}

// ============================================
// Session
// ============================================

/// One accepted client's whole lifecycle: wrap, authenticate, pump.
///
/// Holds the TUN slot for its duration; failures release it for the
/// next client.
async fn run_session(
    endpoint: PacketEndpoint,
    mut tun: OwnedMutexGuard<TunChannels>,
    secret: String,
    password: String,
) {
    let label = endpoint.describe().to_string();

    let mut secured = match secure::establish(endpoint, &secret, Role::Server).await {
        Ok(secured) => secured,
        Err(e) => {
            warn!(endpoint = %label, "crypto handshake failed: {e}");
            return;
        }
    };

    if let Err(e) = auth::authenticate_server(&mut secured, &password).await {
        warn!(endpoint = %label, "authentication failed: {e}");
        secured.close();
        return;
    }

    pump::run(secured, &mut tun).await;
}

/// Feeds one listener's accepted endpoints into the merged queue until
/// shutdown, then drops the listener so its port is released.
fn spawn_accept_loop(
    mut listener: Box<dyn PacketListener>,
    accept_tx: mpsc::Sender<PacketEndpoint>,
    shutdown: Arc<CloseSignal>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok(endpoint) => {
                        if let Err(rejected) = accept_tx.send(endpoint).await {
                            rejected.0.close();
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("{} stopped accepting: {e}", listener.describe());
                        break;
                    }
                },
            }
        }
    });
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use burrow_transport::stream;
    use burrow_transport::tun::{MockTun, TunConfig};

    use crate::config::TunnelConfig;

    /// The 20-byte IPv4 datagram header used by the forwarding tests.
    const IP_PACKET: [u8; 20] = [
        0x45, 0x00, 0x00, 0x1C, 0x00, 0x01, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 0x0A,
        0x5D, 0x00, 0x02, 0x0A, 0x5D, 0x00, 0x01,
    ];

    struct Harness {
        server: Arc<Server>,
        device: Arc<MockTun>,
        port: u16,
    }

    /// Boots a full server on loopback with a mock TUN device.
    ///
    /// The crypto secret is pinned separately from the password so the
    /// authentication outcomes can be observed on their own.
    async fn boot(password: &str) -> Harness {
        let mut config = TunnelConfig::default();
        config.network.bind_addr = "127.0.0.1".into();
        config.network.port = 0;
        config.auth.password = password.into();
        config.auth.secret = Some("shared-tunnel-secret".into());

        let server = Arc::new(Server::new(config));
        let listeners = server.bind().await.unwrap();
        let port = listeners.stream.local_addr().port();

        let device = Arc::new(MockTun::new(TunConfig::new("mock0")));
        let serve_server = Arc::clone(&server);
        let serve_device = Arc::clone(&device) as Arc<dyn TunDevice>;
        tokio::spawn(async move { serve_server.serve(serve_device, listeners).await });

        Harness {
            server,
            device,
            port,
        }
    }

    /// Dials, wraps and authenticates a stream client.
    async fn connect_client(port: u16, password: &str) -> Result<PacketEndpoint> {
        let raw = stream::connect("127.0.0.1", port).await?;
        let mut secured =
            secure::establish(raw, "shared-tunnel-secret", Role::Client).await?;
        auth::authenticate_client(&mut secured, password).await?;
        Ok(secured)
    }

    /// Polls the mock device until `count` packets were written or the
    /// deadline passes.
    async fn wait_for(device: &MockTun, count: usize) -> Vec<Vec<u8>> {
        for _ in 0..100 {
            if device.written_count() >= count {
                return device.take_written_packets();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("TUN device never received {count} packet(s)");
    }

    #[tokio::test]
    async fn test_stream_happy_path_forwards_to_tun() {
        let harness = boot("s3cret").await;

        let client = connect_client(harness.port, "s3cret").await.unwrap();
        client.send(IP_PACKET.to_vec()).await.unwrap();

        let written = wait_for(&harness.device, 1).await;
        assert_eq!(written, vec![IP_PACKET.to_vec()]);

        // Exactly once: nothing else trickles in afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.device.written_count(), 0);

        harness.server.shutdown();
    }

    #[tokio::test]
    async fn test_tun_packets_reach_authenticated_client() {
        let harness = boot("s3cret").await;

        let mut client = connect_client(harness.port, "s3cret").await.unwrap();
        // Session must be pumping before the packet is injected.
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.device.inject_packet(IP_PACKET.to_vec());
        let received = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .expect("client never received the TUN packet")
            .unwrap();
        assert_eq!(received, IP_PACKET);

        harness.server.shutdown();
    }

    #[tokio::test]
    async fn test_wrong_password_rejected_then_server_still_serves() {
        let harness = boot("s3cret").await;

        let result = connect_client(harness.port, "wrong").await;
        assert!(matches!(result, Err(e) if e.is_auth_rejected()));

        // The failed attempt released the session slot.
        let client = connect_client(harness.port, "s3cret").await.unwrap();
        client.send(IP_PACKET.to_vec()).await.unwrap();
        wait_for(&harness.device, 1).await;

        harness.server.shutdown();
    }

    #[tokio::test]
    async fn test_second_session_rejected_while_first_active() {
        let harness = boot("s3cret").await;

        let first = connect_client(harness.port, "s3cret").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The supervisor closes the second endpoint instead of letting
        // it handshake, so the wrap fails quickly.
        let raw = stream::connect("127.0.0.1", harness.port).await.unwrap();
        let second =
            secure::establish(raw, "shared-tunnel-secret", Role::Client).await;
        assert!(second.is_err());

        // The first session is unaffected.
        first.send(IP_PACKET.to_vec()).await.unwrap();
        wait_for(&harness.device, 1).await;

        harness.server.shutdown();
    }

    #[tokio::test]
    async fn test_tun_eof_ends_session_promptly() {
        let harness = boot("s3cret").await;

        let mut client = connect_client(harness.port, "s3cret").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.device.signal_eof();

        // Within 500 ms the pump exits and the client's endpoint
        // terminates.
        let observed = tokio::time::timeout(Duration::from_millis(500), client.recv())
            .await
            .expect("session did not end after TUN EOF");
        assert!(observed.is_none());

        harness.server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let harness = boot("s3cret").await;

        harness.server.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // New handshakes fail once the server has stopped dispatching.
        let result = connect_client(harness.port, "s3cret").await;
        assert!(result.is_err());
    }
}
