// ============================================
// File: crates/burrow-transport/src/datagram.rs
// ============================================
//! # Datagram Transport (UDP)
//!
//! ## Creation Reason
//! The unreliable carrier: one UDP payload per packet, no framing. A
//! single bound socket serves many peers, so the server side
//! demultiplexes by remote address into per-peer endpoints.
//!
//! ## Main Functionality
//! - `connect`: client-side dial with stray-datagram filtering
//! - `DatagramListener`: server-side demultiplexer and accept sequence
//! - Client map: remote address → per-peer inbound queue, guarded by a
//!   readers-writer lock
//!
//! ## Demultiplexing Flow
//! ```text
//! socket reader ──recv_from──► lookup addr (shared lock)
//!      │                            │hit            │miss
//!      │                            ▼               ▼
//!      │                    peer inbound     create endpoint,
//!      │                        queue        insert (exclusive lock),
//!      │                                     announce on accept queue,
//!      │                                     deliver first packet
//! per-peer outbound ──(addr, pkt)──► single writer ──send_to──► socket
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Lookup takes the shared lock; insert/remove take the exclusive
//!   lock. Existence check and insert happen under ONE exclusive lock
//!   so two endpoints can never coexist for one address.
//! - Closing a per-peer endpoint removes its map entry via the
//!   endpoint's cleanup callback; do not remove it anywhere else.
//! - No lock is ever held across an await point.
//!
//! ## Last Modified
//! v0.1.0 - Initial UDP transport

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use burrow_common::types::{Packet, MAX_PACKET};

use crate::endpoint::{
    endpoint_channel, CloseSignal, EndpointDriver, EndpointShared, PacketEndpoint,
    PacketListener,
};
use crate::error::{Result, TransportError};

/// Outbound datagrams queued across all peers before senders drop.
const SEND_QUEUE_DEPTH: usize = 64;

/// Accepted-but-unclaimed endpoints queued before the reader stalls.
const ACCEPT_QUEUE_DEPTH: usize = 8;

/// Remote address → per-peer inbound queue.
type ClientMap = Arc<RwLock<HashMap<SocketAddr, mpsc::Sender<Packet>>>>;

// ============================================
// Client Side
// ============================================

/// Dials the server's datagram transport.
///
/// The socket is left unconnected; the reader drops any datagram whose
/// source is not the dialed server, so strays cannot be injected into
/// the tunnel (they would fail decryption anyway, but never reach it).
///
/// # Errors
/// Returns `InvalidAddress` if the host does not resolve, `BindFailed`
/// if no local socket is available.
pub async fn connect(host: &str, port: u16) -> Result<PacketEndpoint> {
    let target = format!("{host}:{port}");
    let remote = tokio::net::lookup_host(&target)
        .await
        .map_err(|_| TransportError::InvalidAddress {
            addr: target.clone(),
        })?
        .next()
        .ok_or(TransportError::InvalidAddress {
            addr: target.clone(),
        })?;

    let bind_addr = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| TransportError::bind_failed(bind_addr, e))?;
    let socket = Arc::new(socket);

    info!("datagram transport ready for {remote}");

    let (endpoint, driver) = endpoint_channel(false, format!("udp:{remote}"));
    let EndpointDriver {
        inbound_tx,
        mut outbound_rx,
        shared,
    } = driver;

    // Reader: accept only datagrams from the dialed server.
    let reader_socket = Arc::clone(&socket);
    let reader_shared = Arc::clone(&shared);
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET];
        loop {
            tokio::select! {
                () = reader_shared.closed() => break,
                received = reader_socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        if from != remote {
                            debug!("dropping stray datagram from {from}");
                            continue;
                        }
                        if len == 0 {
                            continue;
                        }
                        if inbound_tx.try_send(buf[..len].to_vec()).is_err() {
                            trace!("inbound queue full, dropping datagram");
                        }
                    }
                    Err(e) => {
                        warn!("datagram receive failed: {e}");
                        break;
                    }
                },
            }
        }
        reader_shared.close();
    });

    // Writer: outbound queue onto the socket.
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shared.closed() => break,
                packet = outbound_rx.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = socket.send_to(&packet, remote).await {
                            warn!("datagram send failed: {e}");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        shared.close();
    });

    Ok(endpoint)
}

// ============================================
// Server Side
// ============================================

/// Accepts datagram-transport peers from one shared socket.
///
/// Every distinct remote address becomes one `PacketEndpoint`,
/// announced on the accept sequence when its first datagram arrives.
pub struct DatagramListener {
    accept_rx: mpsc::Receiver<PacketEndpoint>,
    clients: ClientMap,
    local_addr: SocketAddr,
    signal: Arc<CloseSignal>,
}

impl DatagramListener {
    /// Binds the shared socket and starts the demultiplexer.
    ///
    /// # Socket Options
    /// `SO_REUSEADDR`, non-blocking, as for the stream listener.
    ///
    /// # Errors
    /// Returns `InvalidAddress` or `BindFailed`.
    pub async fn bind(bind_addr: &str, port: u16) -> Result<Self> {
        let addr: SocketAddr = format!("{bind_addr}:{port}")
            .parse()
            .map_err(|_| TransportError::InvalidAddress {
                addr: format!("{bind_addr}:{port}"),
            })?;

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::carrier_io("creating UDP socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::carrier_io("setting SO_REUSEADDR", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::carrier_io("setting non-blocking", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::bind_failed(addr.to_string(), e))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| TransportError::carrier_io("registering socket", e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| TransportError::carrier_io("reading local address", e))?;
        let socket = Arc::new(socket);

        info!("datagram transport listening on {local_addr}");

        let clients: ClientMap = Arc::new(RwLock::new(HashMap::new()));
        let signal = Arc::new(CloseSignal::new());
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let (accept_tx, accept_rx) = mpsc::channel(ACCEPT_QUEUE_DEPTH);

        Self::spawn_writer(Arc::clone(&socket), send_rx, Arc::clone(&signal));
        Self::spawn_reader(
            socket,
            Arc::clone(&clients),
            accept_tx,
            send_tx,
            Arc::clone(&signal),
        );

        Ok(Self {
            accept_rx,
            clients,
            local_addr,
            signal,
        })
    }

    /// Number of live per-peer endpoints.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Stops the demultiplexer; existing endpoints keep draining until
    /// closed individually.
    pub fn shutdown(&self) {
        self.signal.close();
    }

    /// Writer task: drains address-tagged packets onto the socket.
    fn spawn_writer(
        socket: Arc<UdpSocket>,
        mut send_rx: mpsc::Receiver<(SocketAddr, Packet)>,
        signal: Arc<CloseSignal>,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = signal.wait() => break,
                    item = send_rx.recv() => match item {
                        Some((addr, packet)) => {
                            if let Err(e) = socket.send_to(&packet, addr).await {
                                warn!("datagram send to {addr} failed: {e}");
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }

    /// Reader task: receives datagrams and routes them by source
    /// address, creating endpoints for first-seen peers.
    fn spawn_reader(
        socket: Arc<UdpSocket>,
        clients: ClientMap,
        accept_tx: mpsc::Sender<PacketEndpoint>,
        send_tx: mpsc::Sender<(SocketAddr, Packet)>,
        signal: Arc<CloseSignal>,
    ) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_PACKET];
            loop {
                tokio::select! {
                    () = signal.wait() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok((len, from)) => {
                            if len == 0 {
                                continue;
                            }
                            let packet = buf[..len].to_vec();

                            let existing = { clients.read().get(&from).cloned() };
                            match existing {
                                Some(inbound) => {
                                    if inbound.try_send(packet).is_err() {
                                        trace!("peer {from} queue full, dropping datagram");
                                    }
                                }
                                None => {
                                    let endpoint = register_peer(
                                        &clients,
                                        from,
                                        send_tx.clone(),
                                        packet,
                                    );
                                    if accept_tx.send(endpoint).await.is_err() {
                                        // Listener dropped; stop demultiplexing.
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            error!("datagram receive failed: {e}");
                            break;
                        }
                    },
                }
            }
            signal.close();
        });
    }
}

#[async_trait]
impl PacketListener for DatagramListener {
    async fn accept(&mut self) -> Result<PacketEndpoint> {
        self.accept_rx
            .recv()
            .await
            .ok_or(TransportError::ShuttingDown)
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn describe(&self) -> String {
        format!("udp-listener:{}", self.local_addr)
    }
}

impl Drop for DatagramListener {
    fn drop(&mut self) {
        self.signal.close();
    }
}

// ============================================
// Peer Registration
// ============================================

/// Creates, wires and registers the endpoint for a first-seen peer,
/// then queues its first packet.
fn register_peer(
    clients: &ClientMap,
    addr: SocketAddr,
    send_tx: mpsc::Sender<(SocketAddr, Packet)>,
    first_packet: Packet,
) -> PacketEndpoint {
    info!("new datagram peer {addr}");

    let (endpoint, driver) = endpoint_channel(false, format!("udp:{addr}"));
    let EndpointDriver {
        inbound_tx,
        outbound_rx,
        shared,
    } = driver;

    // Closing the endpoint removes its map entry.
    let map = Arc::clone(clients);
    shared.set_on_close(Box::new(move || {
        map.write().remove(&addr);
        debug!("removed datagram peer {addr}");
    }));

    spawn_peer_forwarder(outbound_rx, send_tx, addr, Arc::clone(&shared));

    // Existence check and insert under one exclusive lock: if another
    // entry appeared meanwhile, this later insert wins and the old
    // sender is dropped.
    clients.write().insert(addr, inbound_tx.clone());

    // First packet is delivered after the endpoint is registered, so
    // the accept-side owner never sees an empty, already-failed peer.
    let _ = inbound_tx.try_send(first_packet);

    endpoint
}

/// Forwards one peer's outbound packets, tagged with its address, onto
/// the listener's shared send queue.
fn spawn_peer_forwarder(
    mut outbound_rx: mpsc::Receiver<Packet>,
    send_tx: mpsc::Sender<(SocketAddr, Packet)>,
    addr: SocketAddr,
    shared: Arc<EndpointShared>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shared.closed() => break,
                packet = outbound_rx.recv() => match packet {
                    Some(packet) => {
                        if send_tx.send((addr, packet)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        shared.close();
    });
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn bound_listener() -> (DatagramListener, SocketAddr) {
        let listener = DatagramListener::bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_demux_one_endpoint_per_address() {
        let (mut listener, server_addr) = bound_listener().await;

        let peer_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        peer_a.send_to(b"from a", server_addr).await.unwrap();
        let mut endpoint_a = listener.accept().await.unwrap();
        assert_eq!(endpoint_a.recv().await.unwrap(), b"from a");

        peer_b.send_to(b"from b", server_addr).await.unwrap();
        let mut endpoint_b = listener.accept().await.unwrap();
        assert_eq!(endpoint_b.recv().await.unwrap(), b"from b");

        assert_eq!(listener.peer_count(), 2);

        // A follow-up datagram from A routes to A's endpoint, not B's
        // and not a new one.
        peer_a.send_to(b"a again", server_addr).await.unwrap();
        assert_eq!(endpoint_a.recv().await.unwrap(), b"a again");
        assert_eq!(listener.peer_count(), 2);
    }

    #[tokio::test]
    async fn test_endpoints_are_unreliable_and_labelled() {
        let (mut listener, server_addr) = bound_listener().await;

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hi", server_addr).await.unwrap();

        let endpoint = listener.accept().await.unwrap();
        assert!(!endpoint.is_reliable());
        assert!(endpoint.describe().starts_with("udp:"));
    }

    #[tokio::test]
    async fn test_close_removes_map_entry() {
        let (mut listener, server_addr) = bound_listener().await;

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hi", server_addr).await.unwrap();
        let endpoint = listener.accept().await.unwrap();
        assert_eq!(listener.peer_count(), 1);

        endpoint.close();
        // The cleanup callback runs synchronously inside close().
        assert_eq!(listener.peer_count(), 0);

        // The same address sending again becomes a fresh endpoint.
        peer.send_to(b"again", server_addr).await.unwrap();
        let mut fresh = listener.accept().await.unwrap();
        assert_eq!(fresh.recv().await.unwrap(), b"again");
        assert_eq!(listener.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_server_replies_reach_the_right_peer() {
        let (mut listener, server_addr) = bound_listener().await;

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hello", server_addr).await.unwrap();
        let endpoint = listener.accept().await.unwrap();

        endpoint.send(b"welcome".to_vec()).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"welcome");
        assert_eq!(from, server_addr);
    }

    #[tokio::test]
    async fn test_client_connect_roundtrip() {
        let (mut listener, server_addr) = bound_listener().await;

        let mut endpoint = connect("127.0.0.1", server_addr.port()).await.unwrap();
        endpoint.send(b"ping".to_vec()).await.unwrap();

        let mut server_side = listener.accept().await.unwrap();
        assert_eq!(server_side.recv().await.unwrap(), b"ping");

        server_side.send(b"pong".to_vec()).await.unwrap();
        assert_eq!(endpoint.recv().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_bind_rejects_garbage_address() {
        assert!(matches!(
            DatagramListener::bind("nonsense", 0).await,
            Err(TransportError::InvalidAddress { .. })
        ));
    }
}
