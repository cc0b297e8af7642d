// ============================================
// File: crates/burrow-tunnel/src/config.rs
// ============================================
//! # Tunnel Configuration
//!
//! ## Creation Reason
//! One configuration surface for both roles: network binding, device
//! addressing, the shared password, and logging. Values come from an
//! optional TOML file with CLI flags overriding individual fields.
//!
//! ## Configuration File Format
//! ```toml
//! [network]
//! bind_addr = "0.0.0.0"
//! port = 44461
//!
//! [device]
//! address = "10.93.0.1"
//! netmask = "255.255.0.0"
//! mtu = 1400
//!
//! [auth]
//! password = "change-me"
//!
//! [logging]
//! level = "info"
//! ```
//! Every field is optional; defaults match the table above (the device
//! address defaults by role: `10.93.0.1` server, `10.93.0.2` client).
//!
//! ## ⚠️ Important Note for Next Developer
//! - The default password exists so the tunnel comes up for testing;
//!   the supervisors log a loud warning when it is left in place
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use burrow_common::types::DEFAULT_PORT;
use burrow_core::crypto::Role;

use crate::error::{Result, TunnelError};

/// The out-of-the-box password. Must be overridden for any real use.
pub const DEFAULT_PASSWORD: &str = "insecure";

// ============================================
// TunnelConfig
// ============================================

/// Complete tunnel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Network binding / dialing settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// TUN device settings.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TunnelConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `Config` if the file cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading configuration from {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TunnelError::config("file", format!("{}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TunnelError::config("file", format!("{}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `Config` for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.auth.password.is_empty() {
            return Err(TunnelError::config("auth.password", "must not be empty"));
        }
        if self.device.mtu < 576 {
            return Err(TunnelError::config(
                "device.mtu",
                "must be at least 576 bytes",
            ));
        }
        Ok(())
    }

    /// Returns the tunnel address for this role, defaulting per side.
    #[must_use]
    pub fn address_for(&self, role: Role) -> Ipv4Addr {
        self.device.address.unwrap_or(match role {
            Role::Server => Ipv4Addr::new(10, 93, 0, 1),
            Role::Client => Ipv4Addr::new(10, 93, 0, 2),
        })
    }

    /// Returns `true` if the password was left at its default.
    #[must_use]
    pub fn password_is_default(&self) -> bool {
        self.auth.password == DEFAULT_PASSWORD
    }

    /// Returns the secret the encryption keys derive from.
    #[must_use]
    pub fn crypto_secret(&self) -> &str {
        self.auth.secret.as_deref().unwrap_or(&self.auth.password)
    }
}

// ============================================
// Sections
// ============================================

/// Network binding / dialing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the server binds its listeners to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port for both the stream and datagram transports.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

/// TUN device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name; `%d` lets the kernel number it.
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Local tunnel address. Defaults by role when unset.
    #[serde(default)]
    pub address: Option<Ipv4Addr>,

    /// Network mask.
    #[serde(default = "default_netmask")]
    pub netmask: Ipv4Addr,

    /// Tunnel peer address (the server's tunnel address, used by the
    /// client for its point-to-point route).
    #[serde(default = "default_peer")]
    pub peer: Ipv4Addr,

    /// Device MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            address: None,
            netmask: default_netmask(),
            peer: default_peer(),
            mtu: default_mtu(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared password for the challenge/response handshake.
    #[serde(default = "default_password")]
    pub password: String,

    /// Shared secret for the encryption key derivation. Falls back to
    /// the password when unset; setting it separately lets the
    /// encryption layer come up independently of authentication.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: default_password(),
            secret: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace/debug/info/warn/error).
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

// ============================================
// Defaults
// ============================================

fn default_bind_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_device_name() -> String {
    "burrow%d".into()
}

fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 0, 0)
}

fn default_peer() -> Ipv4Addr {
    Ipv4Addr::new(10, 93, 0, 1)
}

fn default_mtu() -> u16 {
    1400
}

fn default_password() -> String {
    DEFAULT_PASSWORD.into()
}

fn default_level() -> String {
    "info".into()
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.bind_addr, "0.0.0.0");
        assert_eq!(config.device.netmask, Ipv4Addr::new(255, 255, 0, 0));
        assert!(config.password_is_default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_role_address_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.address_for(Role::Server), Ipv4Addr::new(10, 93, 0, 1));
        assert_eq!(config.address_for(Role::Client), Ipv4Addr::new(10, 93, 0, 2));

        let mut config = config;
        config.device.address = Some(Ipv4Addr::new(192, 0, 2, 5));
        assert_eq!(config.address_for(Role::Client), Ipv4Addr::new(192, 0, 2, 5));
    }

    #[test]
    fn test_parse_partial_file() {
        let config: TunnelConfig = toml::from_str(
            r#"
            [auth]
            password = "s3cret"

            [network]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.password, "s3cret");
        assert_eq!(config.network.port, 9000);
        // Untouched sections keep their defaults.
        assert_eq!(config.device.mtu, 1400);
        assert!(!config.password_is_default());
    }

    #[test]
    fn test_crypto_secret_falls_back_to_password() {
        let mut config = TunnelConfig::default();
        config.auth.password = "s3cret".into();
        assert_eq!(config.crypto_secret(), "s3cret");

        config.auth.secret = Some("tunnel-secret".into());
        assert_eq!(config.crypto_secret(), "tunnel-secret");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TunnelConfig::default();
        config.auth.password = String::new();
        assert!(config.validate().is_err());

        let mut config = TunnelConfig::default();
        config.device.mtu = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = TunnelConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: TunnelConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(parsed.auth.password, config.auth.password);
    }
}
