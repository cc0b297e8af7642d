// ============================================
// File: crates/burrow-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device
//!
//! ## Creation Reason
//! Tests need a TUN device that requires no privileges and no kernel
//! interface: inject packets to be "read", capture what gets
//! "written", and simulate end-of-file on demand.
//!
//! ## Usage in Tests
//! ```
//! use std::sync::Arc;
//! use burrow_transport::tun::{MockTun, TunConfig, TunDevice};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let device = Arc::new(MockTun::new(TunConfig::new("mock0")));
//! device.inject_packet(b"ip datagram".to_vec());
//!
//! let mut buf = [0u8; 1500];
//! let len = device.read(&mut buf).await.unwrap();
//! assert_eq!(&buf[..len], b"ip datagram");
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Testing only; nothing here touches the network stack
//! - `signal_eof` lets queued packets drain first, then `read` returns
//!   zero, the same order a real device close produces
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{TunConfig, TunDevice};
use crate::error::{Result, TransportError};

/// Queue bound; tests overflowing this are broken tests.
const MAX_QUEUE: usize = 1024;

// ============================================
// MockTun
// ============================================

/// In-memory TUN device for tests.
pub struct MockTun {
    config: TunConfig,
    /// Packets waiting to be read.
    read_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Packets that were written, for assertions.
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Simulated end-of-file.
    eof: AtomicBool,
    is_up: AtomicBool,
    read_notify: Notify,
}

impl MockTun {
    /// Creates a mock device.
    #[must_use]
    pub fn new(config: TunConfig) -> Self {
        Self {
            config,
            read_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            eof: AtomicBool::new(false),
            is_up: AtomicBool::new(false),
            read_notify: Notify::new(),
        }
    }

    /// Queues a packet for the next `read`.
    ///
    /// # Panics
    /// Panics if the queue overflows `MAX_QUEUE`.
    pub fn inject_packet(&self, packet: Vec<u8>) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE, "mock TUN read queue overflow");
        queue.push_back(packet);
        drop(queue);
        self.read_notify.notify_waiters();
    }

    /// Makes `read` return 0 once the queue is drained, like a real
    /// device whose descriptor was closed.
    pub fn signal_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
        self.read_notify.notify_waiters();
    }

    /// Takes every packet written so far, clearing the capture queue.
    #[must_use]
    pub fn take_written_packets(&self) -> Vec<Vec<u8>> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Number of captured written packets.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let notified = self.read_notify.notified();
            tokio::pin!(notified);

            {
                let mut queue = self.read_queue.lock();
                if let Some(packet) = queue.pop_front() {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    return Ok(len);
                }
            }
            if self.eof.load(Ordering::SeqCst) {
                return Ok(0);
            }

            notified.await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut queue = self.write_queue.lock();
        if queue.len() >= MAX_QUEUE {
            return Err(TransportError::TunWriteFailed {
                reason: "mock write queue full".into(),
            });
        }
        queue.push_back(buf.to_vec());
        Ok(buf.len())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    async fn up(&self) -> Result<()> {
        self.is_up.store(true, Ordering::Release);
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.config.name)
            .field("pending_reads", &self.read_queue.lock().len())
            .field("written", &self.written_count())
            .field("eof", &self.eof.load(Ordering::SeqCst))
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_then_read() {
        let tun = MockTun::new(TunConfig::new("mock0"));
        tun.inject_packet(b"hello".to_vec());

        let mut buf = [0u8; 64];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[tokio::test]
    async fn test_read_blocks_until_injection() {
        use std::sync::Arc;

        let tun = Arc::new(MockTun::new(TunConfig::new("mock0")));
        let reader = Arc::clone(&tun);
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let len = reader.read(&mut buf).await.unwrap();
            buf[..len].to_vec()
        });

        tokio::task::yield_now().await;
        tun.inject_packet(b"late arrival".to_vec());

        assert_eq!(handle.await.unwrap(), b"late arrival");
    }

    #[tokio::test]
    async fn test_write_is_captured_in_order() {
        let tun = MockTun::new(TunConfig::new("mock0"));
        tun.write(b"one").await.unwrap();
        tun.write(b"two").await.unwrap();

        let written = tun.take_written_packets();
        assert_eq!(written, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(tun.written_count(), 0);
    }

    #[tokio::test]
    async fn test_eof_after_queue_drains() {
        let tun = MockTun::new(TunConfig::new("mock0"));
        tun.inject_packet(b"still there".to_vec());
        tun.signal_eof();

        let mut buf = [0u8; 64];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"still there");
        assert_eq!(tun.read(&mut buf).await.unwrap(), 0);
        assert_eq!(tun.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_up_down_state() {
        let tun = MockTun::new(TunConfig::new("mock0"));
        assert!(!tun.is_up());
        tun.up().await.unwrap();
        assert!(tun.is_up());
    }
}
