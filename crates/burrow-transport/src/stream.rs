// ============================================
// File: crates/burrow-transport/src/stream.rs
// ============================================
//! # Stream Transport (TCP)
//!
//! ## Creation Reason
//! The reliable carrier: packets ride a TCP connection as
//! length-prefixed frames (see [`crate::framing`]). This is the first
//! transport a client tries and the one the server always runs.
//!
//! ## Main Functionality
//! - `connect`: client-side dial returning a `PacketEndpoint`
//! - `StreamListener`: server-side accept sequence
//! - Reader/writer tasks translating between the socket and the
//!   endpoint's packet queues
//!
//! ## Failure Semantics
//! Any read error, including a malformed frame, is fatal to the
//! endpoint: the inbound sequence terminates and the connection is
//! closed. There is no per-packet recovery on a corrupted stream.
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP transport

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::endpoint::{
    endpoint_channel, EndpointDriver, PacketEndpoint, PacketListener,
};
use crate::error::{Result, TransportError};
use crate::framing;

// ============================================
// Client Side
// ============================================

/// Dials the server's stream transport.
///
/// # Arguments
/// * `host` - server host name or address
/// * `port` - server port (44461 by default, see config)
///
/// # Errors
/// Returns `ConnectFailed` if the dial fails.
pub async fn connect(host: &str, port: u16) -> Result<PacketEndpoint> {
    let addr = format!("{host}:{port}");
    debug!("dialing stream transport at {addr}");

    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| TransportError::connect_failed(&addr, e))?;
    stream.set_nodelay(true).ok();

    let peer = stream
        .peer_addr()
        .map_err(|e| TransportError::carrier_io("resolving peer address", e))?;
    info!("stream transport connected to {peer}");

    Ok(spawn_stream_endpoint(stream, peer))
}

// ============================================
// Server Side
// ============================================

/// Accepts stream-transport clients.
///
/// # Example
/// ```ignore
/// let mut listener = StreamListener::bind("0.0.0.0", 44461).await?;
/// loop {
///     let endpoint = listener.accept().await?;
///     handle_client(endpoint);
/// }
/// ```
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl StreamListener {
    /// Binds the listener.
    ///
    /// # Socket Options
    /// `SO_REUSEADDR` is set so a restarted server can rebind without
    /// waiting out TIME_WAIT.
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
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::carrier_io("creating TCP socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::carrier_io("setting SO_REUSEADDR", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::carrier_io("setting non-blocking", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::bind_failed(addr.to_string(), e))?;
        socket
            .listen(128)
            .map_err(|e| TransportError::bind_failed(addr.to_string(), e))?;

        let listener = TcpListener::from_std(socket.into())
            .map_err(|e| TransportError::carrier_io("registering listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::carrier_io("reading local address", e))?;

        info!("stream transport listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
        })
    }
}

#[async_trait]
impl PacketListener for StreamListener {
    async fn accept(&mut self) -> Result<PacketEndpoint> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::carrier_io("accepting client", e))?;
        stream.set_nodelay(true).ok();

        info!("accepted stream client {peer}");
        Ok(spawn_stream_endpoint(stream, peer))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn describe(&self) -> String {
        format!("tcp-listener:{}", self.local_addr)
    }
}

// ============================================
// Endpoint Wiring
// ============================================

/// Wraps a connected socket in a `PacketEndpoint`, spawning the reader
/// and writer tasks.
fn spawn_stream_endpoint(stream: TcpStream, peer: SocketAddr) -> PacketEndpoint {
    let (endpoint, driver) = endpoint_channel(true, format!("tcp:{peer}"));
    let EndpointDriver {
        inbound_tx,
        mut outbound_rx,
        shared,
    } = driver;
    let (mut read_half, mut write_half) = stream.into_split();

    // Reader: frames off the wire into the inbound queue. Any error is
    // fatal to the endpoint.
    let reader_shared = std::sync::Arc::clone(&shared);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = reader_shared.closed() => break,
                frame = framing::read_frame(&mut read_half) => match frame {
                    Ok(Some(packet)) => {
                        if inbound_tx.send(packet).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(endpoint = %reader_shared.label(), "peer closed stream");
                        break;
                    }
                    Err(e) => {
                        warn!(endpoint = %reader_shared.label(), "stream read failed: {e}");
                        break;
                    }
                },
            }
        }
        reader_shared.close();
    });

    // Writer: outbound queue onto the wire.
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shared.closed() => break,
                packet = outbound_rx.recv() => match packet {
                    Some(packet) => {
                        if let Err(e) = framing::write_frame(&mut write_half, &packet).await {
                            warn!(endpoint = %shared.label(), "stream write failed: {e}");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = write_half.shutdown().await;
        shared.close();
    });

    endpoint
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (PacketEndpoint, PacketEndpoint) {
        let mut listener = StreamListener::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().port();

        let (dialed, accepted) =
            tokio::join!(connect("127.0.0.1", port), listener.accept());
        (dialed.unwrap(), accepted.unwrap())
    }

    #[tokio::test]
    async fn test_connect_and_accept() {
        let (client, server) = loopback_pair().await;
        assert!(client.is_reliable());
        assert!(server.is_reliable());
        assert!(client.describe().starts_with("tcp:"));
    }

    #[tokio::test]
    async fn test_packets_roundtrip_both_directions() {
        let (client, server) = loopback_pair().await;
        let (client_sink, mut client_stream) = client.split();
        let (server_sink, mut server_stream) = server.split();

        client_sink.send(b"from client".to_vec()).await.unwrap();
        assert_eq!(server_stream.recv().await.unwrap(), b"from client");

        server_sink.send(b"from server".to_vec()).await.unwrap();
        assert_eq!(client_stream.recv().await.unwrap(), b"from server");
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let (client, mut server) = loopback_pair().await;

        for i in 0u16..100 {
            client.send(i.to_le_bytes().to_vec()).await.unwrap();
        }
        for i in 0u16..100 {
            assert_eq!(server.recv().await.unwrap(), i.to_le_bytes());
        }
    }

    #[tokio::test]
    async fn test_peer_close_terminates_inbound() {
        let (client, mut server) = loopback_pair().await;

        client.close();
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_bind_rejects_garbage_address() {
        assert!(matches!(
            StreamListener::bind("not an address", 0).await,
            Err(TransportError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then immediately drop to get a port nothing listens on.
        let listener = StreamListener::bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().port();
        drop(listener);

        assert!(matches!(
            connect("127.0.0.1", port).await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }
}
