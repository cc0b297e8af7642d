// ============================================
// File: crates/burrow-transport/src/tun/linux.rs
// ============================================
//! # Linux TUN Device
//!
//! ## Creation Reason
//! Linux-specific TUN device implementation over `/dev/net/tun`.
//!
//! ## Main Functionality
//! - Device creation via the `TUNSETIFF` ioctl (`IFF_TUN | IFF_NO_PI`)
//! - Non-blocking reads/writes through Tokio's `AsyncFd`
//! - Address, peer, MTU and link-state configuration via `ip(8)`
//!
//! ## Required Capabilities
//! - `CAP_NET_ADMIN` (or root) to create and configure the device
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always set `IFF_NO_PI`, otherwise every packet grows a 4-byte
//!   protocol-info header and nothing round-trips
//! - The descriptor must be non-blocking before `AsyncFd::new`;
//!   a blocking read here would wedge the whole reader task and make
//!   `close()` unable to take effect
//!
//! ## Last Modified
//! v0.1.0 - Initial Linux TUN implementation

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::net::Ipv4Addr;
use std::os::unix::io::AsRawFd;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, info, warn};

use super::{TunConfig, TunDevice};
use crate::error::{Result, TransportError};

// ============================================
// Constants
// ============================================

/// Path to the TUN clone device.
const TUN_DEVICE_PATH: &str = "/dev/net/tun";

/// IFF_TUN flag: IP-level device, no Ethernet headers.
const IFF_TUN: libc::c_short = 0x0001;

/// IFF_NO_PI flag: no packet-information prefix.
const IFF_NO_PI: libc::c_short = 0x1000;

/// TUNSETIFF ioctl number.
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

// ============================================
// ifreq Structure
// ============================================

/// Interface request structure for the TUNSETIFF ioctl.
#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
    _padding: [u8; 22],
}

impl IfReq {
    fn new(name: &str) -> Self {
        let mut ifr = Self {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_flags: 0,
            _padding: [0; 22],
        };

        let bytes = name.as_bytes();
        let len = bytes.len().min(libc::IFNAMSIZ - 1);
        for (i, &b) in bytes[..len].iter().enumerate() {
            ifr.ifr_name[i] = b as libc::c_char;
        }
        ifr
    }

    fn with_flags(mut self, flags: libc::c_short) -> Self {
        self.ifr_flags = flags;
        self
    }

    /// Returns the (possibly kernel-assigned) device name.
    fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .ifr_name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// ============================================
// LinuxTun
// ============================================

/// Linux TUN device.
///
/// # Example
/// ```ignore
/// use burrow_transport::tun::{LinuxTun, TunConfig};
///
/// let config = TunConfig::new("burrow%d")
///     .with_address("10.93.0.1".parse()?)
///     .with_mtu(1400);
/// let tun = LinuxTun::create(config)?;
/// tun.up().await?;
/// ```
pub struct LinuxTun {
    async_fd: AsyncFd<File>,
    config: TunConfig,
    is_up: AtomicBool,
}

impl LinuxTun {
    /// Creates the TUN device.
    ///
    /// The name in `config` may contain a `%d` pattern; the actual
    /// kernel-assigned name replaces it afterwards.
    ///
    /// # Errors
    /// - `PermissionDenied` without `CAP_NET_ADMIN`
    /// - `TunCreateFailed` for any other creation failure
    pub fn create(config: TunConfig) -> Result<Self> {
        info!("creating TUN device '{}'", config.name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(TUN_DEVICE_PATH)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    TransportError::PermissionDenied {
                        operation: format!("open {TUN_DEVICE_PATH}"),
                    }
                } else {
                    TransportError::tun_create_failed(&config.name, e)
                }
            })?;

        let fd = file.as_raw_fd();
        let mut ifr = IfReq::new(&config.name).with_flags(IFF_TUN | IFF_NO_PI);

        let result = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr) };
        if result < 0 {
            return Err(TransportError::tun_create_failed(
                &config.name,
                format!("TUNSETIFF failed: {}", std::io::Error::last_os_error()),
            ));
        }

        let actual_name = ifr.name();
        debug!("TUN device created: {actual_name}");

        // Non-blocking mode so AsyncFd reads can be cancelled at close.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0
            || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0
        {
            return Err(TransportError::tun_create_failed(
                &actual_name,
                "failed to set non-blocking mode",
            ));
        }

        let async_fd = AsyncFd::new(file)
            .map_err(|e| TransportError::tun_create_failed(&actual_name, e))?;

        let mut config = config;
        config.name = actual_name;

        Ok(Self {
            async_fd,
            config,
            is_up: AtomicBool::new(false),
        })
    }

    /// Runs one `ip(8)` invocation, treating a non-zero exit as a
    /// configuration failure.
    fn run_ip(&self, args: &[&str]) -> Result<()> {
        debug!("ip {}", args.join(" "));

        let output = Command::new("ip").args(args).output().map_err(|e| {
            TransportError::tun_config_failed(
                &self.config.name,
                format!("failed to run ip: {e}"),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // A leftover address from a previous run is not fatal.
            if !stderr.contains("File exists") {
                return Err(TransportError::tun_config_failed(
                    &self.config.name,
                    format!("ip {} failed: {}", args.join(" "), stderr.trim()),
                ));
            }
        }
        Ok(())
    }

    /// Assigns the tunnel address, point-to-point peer if configured.
    fn configure_address(&self) -> Result<()> {
        let local = format!("{}/{}", self.config.address, self.config.prefix_len());
        match self.config.peer {
            Some(peer) => {
                let peer = peer.to_string();
                self.run_ip(&[
                    "addr", "add", &local, "peer", &peer, "dev", &self.config.name,
                ])
            }
            None => self.run_ip(&["addr", "add", &local, "dev", &self.config.name]),
        }
    }
}

#[async_trait]
impl TunDevice for LinuxTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self
                .async_fd
                .ready(Interest::READABLE)
                .await
                .map_err(|e| TransportError::TunReadFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe {
                    libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len())
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => {
                    return Err(TransportError::TunReadFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self
                .async_fd
                .ready(Interest::WRITABLE)
                .await
                .map_err(|e| TransportError::TunWriteFailed {
                    reason: e.to_string(),
                })?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let n = unsafe {
                    libc::write(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len())
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => {
                    return Err(TransportError::TunWriteFailed {
                        reason: e.to_string(),
                    })
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    async fn up(&self) -> Result<()> {
        info!("bringing up TUN device {}", self.config.name);

        self.configure_address()?;
        self.run_ip(&[
            "link",
            "set",
            "dev",
            &self.config.name,
            "mtu",
            &self.config.mtu.to_string(),
        ])?;
        self.run_ip(&["link", "set", "dev", &self.config.name, "up"])?;

        self.is_up.store(true, Ordering::Release);
        info!(
            "TUN device {} is up with address {}",
            self.config.name, self.config.address
        );
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl Drop for LinuxTun {
    fn drop(&mut self) {
        if self.is_up() {
            warn!("dropping TUN device {} while up", self.config.name);
        }
        // The kernel tears down a non-persistent device when the
        // descriptor closes.
    }
}

impl std::fmt::Debug for LinuxTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxTun")
            .field("name", &self.config.name)
            .field("address", &self.config.address)
            .field("mtu", &self.config.mtu)
            .field("is_up", &self.is_up())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    // Creating a real TUN device needs CAP_NET_ADMIN; those paths are
    // covered by running the binary. These tests cover the pure parts.

    #[test]
    fn test_ifreq_name_and_flags() {
        let ifr = IfReq::new("burrow0").with_flags(IFF_TUN | IFF_NO_PI);
        assert_eq!(ifr.name(), "burrow0");
        assert_eq!(ifr.ifr_flags, IFF_TUN | IFF_NO_PI);
    }

    #[test]
    fn test_ifreq_name_truncates() {
        let ifr = IfReq::new(&"x".repeat(32));
        assert!(ifr.name().len() < libc::IFNAMSIZ);
    }

    #[test]
    fn test_create_without_privileges_fails_cleanly() {
        // Either permission is denied (unprivileged) or creation
        // succeeds (running as root in CI); both are acceptable, what
        // must not happen is a panic.
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        match LinuxTun::create(TunConfig::new("burrow%d")) {
            Ok(tun) => assert!(!tun.name().is_empty()),
            Err(e) => assert!(matches!(
                e,
                TransportError::PermissionDenied { .. }
                    | TransportError::TunCreateFailed { .. }
            )),
        }
    }
}
