// ============================================
// File: crates/burrow-transport/src/tun/mod.rs
// ============================================
//! # TUN Device Abstraction
//!
//! ## Creation Reason
//! The tunnel's local end is a kernel virtual network interface. This
//! module defines the device trait, its configuration, and the runner
//! that turns a device into the channel surface the pump consumes.
//!
//! ## Main Functionality
//! - `TunDevice`: async read/write trait (Linux + mock implementations)
//! - `TunConfig`: name/address/netmask/peer/MTU with validation
//! - `start`: spawns the background reader and yields the inbound
//!   packet sequence, the one-shot EOF signal, and a write/close handle
//!
//! ## Reader Contract
//! - A zero-length read is EOF: exactly one signal is emitted on the
//!   EOF channel and the reader terminates
//! - Any other read error: log, sleep 100 ms, retry (avoids a busy
//!   loop on transient device errors)
//! - `close()` stops the reader promptly; no EOF signal is emitted for
//!   a local close, the inbound sequence just ends
//!
//! ## ⚠️ Important Note for Next Developer
//! - The inbound sequence has exactly one consumer; two pumps reading
//!   one device would race (the server enforces one active session)
//!
//! ## Last Modified
//! v0.1.0 - Initial TUN abstraction

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use burrow_common::types::{Packet, MAX_PACKET};

use crate::endpoint::CloseSignal;
use crate::error::{Result, TransportError};

#[cfg(target_os = "linux")]
pub mod linux;
pub mod mock;

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;
pub use mock::MockTun;

/// Pause between retries after a non-EOF read error.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Packets buffered between the device reader and the pump.
const TUN_QUEUE_DEPTH: usize = 64;

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface to a TUN device.
///
/// Data read from and written to the device is raw IP packets (no
/// Ethernet headers). Implementations must be `Send + Sync`; reads
/// must be cancellable, which on Linux means a non-blocking descriptor
/// behind the async reactor rather than a blocking `read(2)`.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP packet. A return of `Ok(0)` means end-of-file.
    ///
    /// # Errors
    /// Returns `TunReadFailed` on device errors.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one IP packet.
    ///
    /// # Errors
    /// Returns `TunWriteFailed` on device errors.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns the device name (e.g. "burrow0").
    fn name(&self) -> &str;

    /// Returns the configured MTU.
    fn mtu(&self) -> u16;

    /// Assigns the address and brings the interface up.
    ///
    /// # Errors
    /// Returns `TunConfigFailed` if platform tooling rejects the
    /// configuration.
    async fn up(&self) -> Result<()>;

    /// Returns `true` once the device is up.
    fn is_up(&self) -> bool;
}

// ============================================
// TunConfig
// ============================================

/// Configuration for TUN device creation.
///
/// # Example
/// ```
/// use burrow_transport::tun::TunConfig;
/// use std::net::Ipv4Addr;
///
/// let config = TunConfig::new("burrow0")
///     .with_address(Ipv4Addr::new(10, 93, 0, 2))
///     .with_peer(Ipv4Addr::new(10, 93, 0, 1))
///     .with_netmask(Ipv4Addr::new(255, 255, 0, 0));
/// ```
#[derive(Debug, Clone)]
pub struct TunConfig {
    /// Device name; may contain a `%d` pattern for kernel numbering.
    pub name: String,
    /// Local address inside the tunnel.
    pub address: Ipv4Addr,
    /// Network mask.
    pub netmask: Ipv4Addr,
    /// Point-to-point peer address (client side sets this to the
    /// server's tunnel address).
    pub peer: Option<Ipv4Addr>,
    /// MTU size.
    pub mtu: u16,
}

impl TunConfig {
    /// Creates a configuration with tunnel defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Ipv4Addr::new(10, 93, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
            peer: None,
            mtu: 1400,
        }
    }

    /// Sets the local tunnel address.
    #[must_use]
    pub const fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.address = address;
        self
    }

    /// Sets the network mask.
    #[must_use]
    pub const fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = netmask;
        self
    }

    /// Sets the point-to-point peer address.
    #[must_use]
    pub const fn with_peer(mut self, peer: Ipv4Addr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Converts the netmask to a CIDR prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        u32::from_be_bytes(self.netmask.octets()).count_ones() as u8
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig`-style errors for a bad name or MTU.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TransportError::tun_config_failed(
                &self.name,
                "device name cannot be empty",
            ));
        }
        if self.name.len() > 15 {
            return Err(TransportError::tun_config_failed(
                &self.name,
                "device name cannot exceed 15 characters",
            ));
        }
        if self.mtu < 576 {
            return Err(TransportError::tun_config_failed(
                &self.name,
                "MTU must be at least 576 bytes",
            ));
        }
        Ok(())
    }
}

impl Default for TunConfig {
    fn default() -> Self {
        Self::new("burrow%d")
    }
}

// ============================================
// Device Runner
// ============================================

/// Write/close handle to a running TUN device. Cheap to clone.
#[derive(Clone)]
pub struct TunHandle {
    device: Arc<dyn TunDevice>,
    signal: Arc<CloseSignal>,
}

impl TunHandle {
    /// Writes one packet to the device.
    ///
    /// # Errors
    /// Returns `TunWriteFailed`; the pump logs this and continues.
    pub async fn write(&self, packet: &[u8]) -> Result<()> {
        self.device.write(packet).await.map(|_| ())
    }

    /// Stops the background reader; the inbound sequence ends promptly.
    pub fn close(&self) {
        self.signal.close();
    }

    /// Returns `true` once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    /// Returns the device name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.device.name()
    }
}

/// A started TUN device: the write handle plus the two receive-side
/// channels the pump selects over.
pub struct TunChannels {
    /// Write/close handle.
    pub handle: TunHandle,
    /// Packets read from the device.
    pub inbound: mpsc::Receiver<Packet>,
    /// Fires exactly once when the device reader hits end-of-file.
    pub eof: mpsc::Receiver<()>,
}

/// Starts the background reader for a device.
///
/// There is at most one consumer of the returned channels; see the
/// module notes.
#[must_use]
pub fn start(device: Arc<dyn TunDevice>) -> TunChannels {
    let signal = Arc::new(CloseSignal::new());
    let (inbound_tx, inbound_rx) = mpsc::channel(TUN_QUEUE_DEPTH);
    let (eof_tx, eof_rx) = mpsc::channel(1);

    let reader_device = Arc::clone(&device);
    let reader_signal = Arc::clone(&signal);
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET];
        loop {
            tokio::select! {
                () = reader_signal.wait() => {
                    debug!("TUN reader stopping on close");
                    break;
                }
                result = reader_device.read(&mut buf) => match result {
                    Ok(0) => {
                        info!("EOF from TUN device {}", reader_device.name());
                        let _ = eof_tx.send(()).await;
                        break;
                    }
                    Ok(len) => {
                        if inbound_tx.send(buf[..len].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("TUN read error, retrying: {e}");
                        tokio::time::sleep(READ_RETRY_DELAY).await;
                    }
                },
            }
        }
    });

    TunChannels {
        handle: TunHandle { device, signal },
        inbound: inbound_rx,
        eof: eof_rx,
    }
}

// ============================================
// Tests
// ============================================
