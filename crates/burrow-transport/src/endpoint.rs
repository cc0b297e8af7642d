// ============================================
// File: crates/burrow-transport/src/endpoint.rs
// ============================================
//! # Packet Endpoint Abstraction
//!
//! ## Creation Reason
//! Every carrier (TCP, UDP, and whatever gets plugged in later) is
//! presented to the rest of the system as the same thing: an owned,
//! bidirectional, message-oriented packet channel with a reliability
//! flag. This module defines that uniform surface.
//!
//! ## Main Functionality
//! - `PacketEndpoint`: the handle an owner drives (send / recv / close)
//! - `PacketSink` / `PacketStream`: split halves so both directions can
//!   be driven from one `select!` loop
//! - `EndpointDriver`: the transport-facing side (inbound sender,
//!   outbound receiver, shared close state)
//! - `PacketListener`: the accept-sequence trait server transports
//!   implement
//! - `memory_pair`: two endpoints wired back-to-back in memory, used by
//!   tests and available for loopback wiring
//!
//! ## Ownership Model
//! ```text
//!  owner side                      transport side
//! ┌──────────────────┐   mpsc    ┌──────────────────────────┐
//! │ PacketSink.send ─┼──────────►│ outbound_rx → socket     │
//! │ PacketStream.recv◄┼──────────┼─ inbound_tx ← socket     │
//! └──────────────────┘           └──────────────────────────┘
//!          └────── shared CloseSignal + cleanup callback ───┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `close()` is idempotent and runs the cleanup callback exactly once
//! - Carrier tasks must call `shared.close()` on exit so cleanup (e.g.
//!   datagram client-map removal) happens even when the peer vanishes
//! - Reliable sends block on backpressure; unreliable sends drop on a
//!   full queue, mirroring what the carrier itself would do
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint abstraction

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::trace;

use burrow_common::types::{Packet, MAX_PACKET};

use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

/// Packets queued per direction before backpressure (reliable) or
/// dropping (unreliable) kicks in.
pub const PACKET_QUEUE_DEPTH: usize = 64;

// ============================================
// CloseSignal
// ============================================

/// One-way "this is shutting down" latch shared between tasks.
///
/// Waiters observe the transition exactly once; `close()` may be called
/// from anywhere, any number of times.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    /// Creates an open signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches the signal. Returns `true` on the first call.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    /// Returns `true` once `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until the signal is closed.
    pub async fn wait(&self) {
        loop {
            if self.is_closed() {
                return;
            }
            // Register interest before re-checking so a close between
            // the check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================
// EndpointShared
// ============================================

/// State shared between an endpoint's owner halves and its carrier
/// tasks.
pub struct EndpointShared {
    reliable: bool,
    label: String,
    signal: CloseSignal,
    on_close: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl EndpointShared {
    fn new(reliable: bool, label: String) -> Self {
        Self {
            reliable,
            label,
            signal: CloseSignal::new(),
            on_close: Mutex::new(None),
        }
    }

    /// Installs a cleanup callback run exactly once, on close.
    ///
    /// The datagram transport uses this to remove the peer's client-map
    /// entry.
    pub fn set_on_close(&self, callback: Box<dyn FnOnce() + Send>) {
        *self.on_close.lock() = Some(callback);
    }

    /// Closes the endpoint: latches the signal and runs the cleanup
    /// callback. Idempotent.
    pub fn close(&self) {
        if self.signal.close() {
            let callback = self.on_close.lock().take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Returns `true` once the endpoint is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    /// Waits for the endpoint to close.
    pub async fn closed(&self) {
        self.signal.wait().await;
    }

    /// Returns the endpoint's log label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if the carrier preserves ordering and delivery.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.reliable
    }
}

impl std::fmt::Debug for EndpointShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointShared")
            .field("label", &self.label)
            .field("reliable", &self.reliable)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// PacketSink / PacketStream
// ============================================

/// The sending half of an endpoint. Cheap to clone.
#[derive(Clone)]
pub struct PacketSink {
    outbound: mpsc::Sender<Packet>,
    shared: Arc<EndpointShared>,
}

impl PacketSink {
    /// Submits one packet for transmission.
    ///
    /// On a reliable endpoint this blocks under backpressure; on an
    /// unreliable endpoint a full queue drops the packet silently, the
    /// same way the network would.
    ///
    /// # Errors
    /// - `OversizedPacket` if the packet exceeds `MAX_PACKET`
    /// - `EndpointClosed` if the endpoint has shut down
    pub async fn send(&self, packet: Packet) -> Result<()> {
        if packet.len() > MAX_PACKET {
            return Err(TransportError::OversizedPacket { size: packet.len() });
        }
        if self.shared.is_closed() {
            return Err(TransportError::EndpointClosed);
        }

        if self.shared.is_reliable() {
            self.outbound
                .send(packet)
                .await
                .map_err(|_| TransportError::EndpointClosed)
        } else {
            match self.outbound.try_send(packet) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(endpoint = %self.shared.label(), "send queue full, dropping packet");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(TransportError::EndpointClosed)
                }
            }
        }
    }

    /// Closes the whole endpoint.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns the endpoint's log label.
    #[must_use]
    pub fn describe(&self) -> &str {
        self.shared.label()
    }

    /// Returns the carrier's reliability flag.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.shared.is_reliable()
    }
}

/// The receiving half of an endpoint.
pub struct PacketStream {
    inbound: mpsc::Receiver<Packet>,
    shared: Arc<EndpointShared>,
}

impl PacketStream {
    /// Receives the next inbound packet.
    ///
    /// Returns `None` once the endpoint is closed or the carrier has
    /// failed; the inbound sequence never resumes after that.
    pub async fn recv(&mut self) -> Option<Packet> {
        if self.shared.is_closed() {
            return None;
        }
        tokio::select! {
            packet = self.inbound.recv() => packet,
            () = self.shared.closed() => None,
        }
    }

    /// Closes the whole endpoint.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns the endpoint's log label.
    #[must_use]
    pub fn describe(&self) -> &str {
        self.shared.label()
    }
}

// ============================================
// PacketEndpoint
// ============================================

/// An owned handle to one peer connection.
///
/// Exposes an outbound sequence (`send`) and an inbound sequence
/// (`recv`), a reliability flag, a log label and an idempotent `close`.
/// `split` yields independently-owned halves so a caller can wait on
/// both directions in one `select!` loop.
pub struct PacketEndpoint {
    sink: PacketSink,
    stream: PacketStream,
}

impl PacketEndpoint {
    /// Submits one packet. See [`PacketSink::send`].
    ///
    /// # Errors
    /// `OversizedPacket` or `EndpointClosed`.
    pub async fn send(&self, packet: Packet) -> Result<()> {
        self.sink.send(packet).await
    }

    /// Receives the next inbound packet. See [`PacketStream::recv`].
    pub async fn recv(&mut self) -> Option<Packet> {
        self.stream.recv().await
    }

    /// Closes the endpoint and unblocks both directions.
    pub fn close(&self) {
        self.sink.close();
    }

    /// Returns the carrier's reliability flag.
    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.sink.is_reliable()
    }

    /// Returns a short description for logs.
    #[must_use]
    pub fn describe(&self) -> &str {
        self.sink.describe()
    }

    /// Splits into independently-owned send and receive halves.
    #[must_use]
    pub fn split(self) -> (PacketSink, PacketStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for PacketEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEndpoint")
            .field("label", &self.describe())
            .field("reliable", &self.is_reliable())
            .finish()
    }
}

// ============================================
// EndpointDriver
// ============================================

/// The transport-facing side of an endpoint.
///
/// A transport's carrier tasks push received packets into `inbound_tx`,
/// drain `outbound_rx` onto the wire, and watch/trip `shared` for
/// shutdown.
pub struct EndpointDriver {
    /// Delivers carrier packets to the owner.
    pub inbound_tx: mpsc::Sender<Packet>,
    /// Yields packets the owner submitted.
    pub outbound_rx: mpsc::Receiver<Packet>,
    /// Shared close state.
    pub shared: Arc<EndpointShared>,
}

/// Creates a fresh endpoint and its driver side.
#[must_use]
pub fn endpoint_channel(
    reliable: bool,
    label: impl Into<String>,
) -> (PacketEndpoint, EndpointDriver) {
    let shared = Arc::new(EndpointShared::new(reliable, label.into()));
    let (inbound_tx, inbound_rx) = mpsc::channel(PACKET_QUEUE_DEPTH);
    let (outbound_tx, outbound_rx) = mpsc::channel(PACKET_QUEUE_DEPTH);

    let endpoint = PacketEndpoint {
        sink: PacketSink {
            outbound: outbound_tx,
            shared: Arc::clone(&shared),
        },
        stream: PacketStream {
            inbound: inbound_rx,
            shared: Arc::clone(&shared),
        },
    };
    let driver = EndpointDriver {
        inbound_tx,
        outbound_rx,
        shared,
    };
    (endpoint, driver)
}

// ============================================
// PacketListener
// ============================================

/// A server-side transport: a lazy sequence of freshly accepted
/// endpoints.
#[async_trait]
pub trait PacketListener: Send {
    /// Waits for and returns the next accepted endpoint.
    ///
    /// # Errors
    /// Returns `ShuttingDown` once the listener stops producing
    /// endpoints.
    async fn accept(&mut self) -> Result<PacketEndpoint>;

    /// Returns the local address the listener is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Returns a short description for logs.
    fn describe(&self) -> String;
}

// ============================================
// In-Memory Pair
// ============================================

/// Creates two endpoints wired back to back in memory.
///
/// Whatever one side sends, the other receives. Closing either side
/// terminates both. Used by tests in place of a loopback socket: no
/// privileges, no ports.
#[must_use]
pub fn memory_pair(reliable: bool) -> (PacketEndpoint, PacketEndpoint) {
    let (left, left_driver) = endpoint_channel(reliable, "memory:left");
    let (right, right_driver) = endpoint_channel(reliable, "memory:right");

    spawn_memory_forwarder(left_driver.outbound_rx, right_driver.inbound_tx,
        Arc::clone(&left_driver.shared), Arc::clone(&right_driver.shared));
    spawn_memory_forwarder(right_driver.outbound_rx, left_driver.inbound_tx,
        right_driver.shared, left_driver.shared);

    (left, right)
}

/// Moves packets from one side's outbound queue to the other side's
/// inbound queue until either endpoint closes.
fn spawn_memory_forwarder(
    mut from: mpsc::Receiver<Packet>,
    to: mpsc::Sender<Packet>,
    near: Arc<EndpointShared>,
    far: Arc<EndpointShared>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = near.closed() => break,
                () = far.closed() => break,
                packet = from.recv() => match packet {
                    Some(packet) => {
                        if to.send(packet).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        near.close();
        far.close();
    });
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_roundtrip() {
        let (a, mut b) = memory_pair(true);

        a.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), b"hello");

        b.send(b"world".to_vec()).await.unwrap();
        let (_, mut a_stream) = a.split();
        assert_eq!(a_stream.recv().await.unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_oversized_packet_rejected() {
        let (a, _b) = memory_pair(true);
        let result = a.send(vec![0u8; MAX_PACKET + 1]).await;
        assert!(matches!(
            result,
            Err(TransportError::OversizedPacket { size }) if size == MAX_PACKET + 1
        ));

        // Exactly MAX_PACKET is fine.
        a.send(vec![0u8; MAX_PACKET]).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_terminates_both_sequences() {
        let (a, mut b) = memory_pair(true);

        a.close();
        assert!(b.recv().await.is_none());
        assert!(matches!(
            a.send(b"late".to_vec()).await,
            Err(TransportError::EndpointClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_runs_callback_once() {
        use std::sync::atomic::AtomicUsize;

        let (endpoint, driver) = endpoint_channel(true, "test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        driver
            .shared
            .set_on_close(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        endpoint.close();
        endpoint.close();
        driver.shared.close();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreliable_send_drops_on_full_queue() {
        // No one drains the driver side, so the queue fills; sends must
        // keep returning Ok without blocking.
        let (endpoint, _driver) = endpoint_channel(false, "test");
        for _ in 0..PACKET_QUEUE_DEPTH * 2 {
            endpoint.send(b"x".to_vec()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_reliable_order_preserved() {
        let (a, mut b) = memory_pair(true);
        for i in 0u8..10 {
            a.send(vec![i]).await.unwrap();
        }
        for i in 0u8..10 {
            assert_eq!(b.recv().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn test_close_signal_wait_sees_prior_close() {
        let signal = CloseSignal::new();
        signal.close();
        // Must return immediately, not hang.
        signal.wait().await;
        assert!(signal.is_closed());
    }

    #[tokio::test]
    async fn test_labels_and_flags() {
        let (endpoint, _driver) = endpoint_channel(false, "udp:203.0.113.7:9000");
        assert!(!endpoint.is_reliable());
        assert_eq!(endpoint.describe(), "udp:203.0.113.7:9000");
    }
}
