// ============================================
// File: crates/burrow-tunnel/src/main.rs
// ============================================
//! # Burrow Entry Point
//!
//! ## Creation Reason
//! CLI front-end for the tunnel: parses flags, sets up logging, builds
//! the configuration, creates the TUN device and runs the chosen role.
//!
//! ## Usage
//! ```bash
//! # Listening side
//! burrow server --pass swordfish
//!
//! # Dialing side (tries tcp, then udp, then the unimplemented rest)
//! burrow client --pass swordfish -m all vpn.example.net
//!
//! # Pin the transport and addresses
//! burrow client --pass swordfish -m tcp --ip 10.93.0.2 --server 10.93.0.1 vpn.example.net
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Creating the TUN device needs root or CAP_NET_ADMIN
//! - Flags override config-file values field by field
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use burrow_common::types::TransportKind;
use burrow_core::crypto::Role;
use burrow_transport::tun::{TunConfig, TunDevice};
use burrow_tunnel::{Client, Server, TunnelConfig};

// ============================================
// CLI Definition
// ============================================

/// Point-to-point authenticated, encrypted IP tunnel.
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the listening side of the tunnel.
    Server {
        #[command(flatten)]
        common: CommonOpts,
    },

    /// Run the dialing side of the tunnel.
    Client {
        #[command(flatten)]
        common: CommonOpts,

        /// Transports to try, comma separated (tcp/udp/icmp/dns/all).
        #[arg(short = 'm', long = "m", default_value = "all")]
        methods: String,

        /// Tunnel address of the server (TUN peer address).
        #[arg(long)]
        server: Option<Ipv4Addr>,

        /// Server host name or address to dial.
        host: String,
    },
}

/// Flags shared by both roles.
#[derive(Args, Debug)]
struct CommonOpts {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tunnel address of the local TUN device.
    #[arg(long)]
    ip: Option<Ipv4Addr>,

    /// Netmask of the TUN device.
    #[arg(long)]
    netmask: Option<Ipv4Addr>,

    /// Shared password for authentication and encryption.
    #[arg(long)]
    pass: Option<String>,

    /// Tunnel port for both transports.
    #[arg(long)]
    port: Option<u16>,
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server { common } => cmd_server(common).await,
        Commands::Client {
            common,
            methods,
            server,
            host,
        } => cmd_client(common, methods, server, host).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Runs the server role.
async fn cmd_server(common: CommonOpts) -> anyhow::Result<()> {
    let config = build_config(&common).await?;
    init_logging(&config.logging.level);

    let device = create_device(&config, Role::Server, None).await?;

    let server = Arc::new(Server::new(config));
    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_server.shutdown();
        }
    });

    let listeners = server.bind().await?;
    server.serve(device, listeners).await?;
    Ok(())
}

/// Runs the client role.
async fn cmd_client(
    common: CommonOpts,
    methods: String,
    server_tun_addr: Option<Ipv4Addr>,
    host: String,
) -> anyhow::Result<()> {
    let mut config = build_config(&common).await?;
    if let Some(peer) = server_tun_addr {
        config.device.peer = peer;
    }
    init_logging(&config.logging.level);

    let methods = TransportKind::expand(&methods)?;
    let peer = config.device.peer;
    let device = create_device(&config, Role::Client, Some(peer)).await?;

    let client = Arc::new(Client::new(config, host, methods));
    let signal_client = Arc::clone(&client);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_client.shutdown();
        }
    });

    client.run(device).await?;
    Ok(())
}

// ============================================
// Helper Functions
// ============================================

/// Loads the config file (if given) and applies flag overrides.
async fn build_config(common: &CommonOpts) -> anyhow::Result<TunnelConfig> {
    let mut config = match &common.config {
        Some(path) => TunnelConfig::load(path).await?,
        None => TunnelConfig::default(),
    };

    if let Some(ip) = common.ip {
        config.device.address = Some(ip);
    }
    if let Some(netmask) = common.netmask {
        config.device.netmask = netmask;
    }
    if let Some(pass) = &common.pass {
        config.auth.password = pass.clone();
    }
    if let Some(port) = common.port {
        config.network.port = port;
    }

    config.validate()?;
    Ok(config)
}

/// Creates, configures and brings up the platform TUN device.
async fn create_device(
    config: &TunnelConfig,
    role: Role,
    peer: Option<Ipv4Addr>,
) -> anyhow::Result<Arc<dyn TunDevice>> {
    let mut tun_config = TunConfig::new(&config.device.name)
        .with_address(config.address_for(role))
        .with_netmask(config.device.netmask)
        .with_mtu(config.device.mtu);
    if let Some(peer) = peer {
        tun_config = tun_config.with_peer(peer);
    }
    tun_config.validate()?;

    #[cfg(target_os = "linux")]
    {
        let device = burrow_transport::tun::LinuxTun::create(tun_config)?;
        device.up().await?;
        info!("TUN device {} ready", device.name());
        Ok(Arc::new(device))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = tun_config;
        Err(burrow_tunnel::TunnelError::UnsupportedPlatform.into())
    }
}

/// Initializes the tracing subscriber.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}
