// ============================================
// File: crates/burrow-tunnel/src/pump.rs
// ============================================
//! # Packet Pump
//!
//! ## Creation Reason
//! The steady-state heart of a session: bidirectional forwarding
//! between the TUN device and the authenticated, encrypted endpoint.
//!
//! ## Event Loop
//! ```text
//! select! {
//!     packet from endpoint  →  write to TUN   (error: log, continue)
//!     packet from TUN       →  send on endpoint (error: fatal, exit)
//!     EOF from TUN          →  close endpoint, exit
//! }
//! ```
//!
//! ## Failure Policy
//! - A TUN write error loses one packet; the session survives
//! - An endpoint send error means the carrier is gone; the session ends
//! - TUN EOF (device closed) ends the session normally
//!
//! ## Last Modified
//! v0.1.0 - Initial pump

use tracing::{debug, error, info, trace, warn};

use burrow_transport::endpoint::PacketEndpoint;
use burrow_transport::tun::TunChannels;

// ============================================
// PumpEnd
// ============================================

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The TUN device reached end-of-file.
    TunEof,
    /// The TUN device was closed locally.
    TunClosed,
    /// The endpoint's inbound sequence terminated (peer or carrier
    /// gone).
    CarrierClosed,
    /// Sending on the endpoint failed.
    SendFailed,
}

// ============================================
// Pump
// ============================================

/// Forwards packets between `endpoint` and `tun` until one side ends.
///
/// The endpoint is consumed and closed on exit. The TUN channels are
/// borrowed: on a server they outlive the session and serve the next
/// authenticated client.
pub async fn run(endpoint: PacketEndpoint, tun: &mut TunChannels) -> PumpEnd {
    let label = endpoint.describe().to_string();
    info!(endpoint = %label, tun = %tun.handle.name(), "pump started");

    let (sink, mut stream) = endpoint.split();

    let end = loop {
        tokio::select! {
            inbound = stream.recv() => match inbound {
                Some(packet) => {
                    trace!("peer --> tun ({} bytes)", packet.len());
                    if let Err(e) = tun.handle.write(&packet).await {
                        warn!("TUN write failed, packet dropped: {e}");
                    }
                }
                None => {
                    debug!(endpoint = %label, "endpoint inbound ended");
                    break PumpEnd::CarrierClosed;
                }
            },
            outbound = tun.inbound.recv() => match outbound {
                Some(packet) => {
                    trace!("tun --> peer ({} bytes)", packet.len());
                    if let Err(e) = sink.send(packet).await {
                        error!(endpoint = %label, "endpoint send failed: {e}");
                        break PumpEnd::SendFailed;
                    }
                }
                None => {
                    debug!("TUN inbound ended");
                    break PumpEnd::TunClosed;
                }
            },
            eof = tun.eof.recv() => match eof {
                Some(()) => {
                    info!("EOF from TUN device, ending session");
                    break PumpEnd::TunEof;
                }
                None => break PumpEnd::TunClosed,
            },
        }
    };

    sink.close();
    info!(endpoint = %label, "pump finished: {end:?}");
    end
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use burrow_transport::endpoint::memory_pair;
    use burrow_transport::tun::{self, MockTun, TunConfig};

    fn mock_tun() -> (Arc<MockTun>, TunChannels) {
        let device = Arc::new(MockTun::new(TunConfig::new("mock0")));
        let channels = tun::start(Arc::clone(&device) as _);
        (device, channels)
    }

    #[tokio::test]
    async fn test_peer_packets_reach_tun() {
        let (device, mut channels) = mock_tun();
        let (local, peer) = memory_pair(true);

        let pump = tokio::spawn(async move { run(local, &mut channels).await });

        peer.send(b"ip datagram".to_vec()).await.unwrap();

        // Give the pump a moment to forward, then end the session.
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.close();

        assert_eq!(pump.await.unwrap(), PumpEnd::CarrierClosed);
        assert_eq!(device.take_written_packets(), vec![b"ip datagram".to_vec()]);
    }

    #[tokio::test]
    async fn test_tun_packets_reach_peer() {
        let (device, mut channels) = mock_tun();
        let (local, mut peer) = memory_pair(true);

        let pump = tokio::spawn(async move { run(local, &mut channels).await });

        device.inject_packet(b"outbound".to_vec());
        assert_eq!(peer.recv().await.unwrap(), b"outbound");

        peer.close();
        assert_eq!(pump.await.unwrap(), PumpEnd::CarrierClosed);
    }

    #[tokio::test]
    async fn test_tun_eof_ends_session_and_closes_endpoint() {
        let (device, mut channels) = mock_tun();
        let (local, mut peer) = memory_pair(true);

        let pump = tokio::spawn(async move { run(local, &mut channels).await });

        device.signal_eof();

        // Within half a second the pump exits and the peer observes
        // the endpoint closing.
        let end = tokio::time::timeout(Duration::from_millis(500), pump)
            .await
            .expect("pump did not stop after TUN EOF")
            .unwrap();
        assert_eq!(end, PumpEnd::TunEof);

        let observed = tokio::time::timeout(Duration::from_millis(500), peer.recv())
            .await
            .expect("peer did not observe close");
        assert!(observed.is_none());
    }

    #[tokio::test]
    async fn test_local_tun_close_ends_session() {
        let (_device, mut channels) = mock_tun();
        let (local, _peer) = memory_pair(true);

        let handle = channels.handle.clone();
        let pump = tokio::spawn(async move { run(local, &mut channels).await });

        handle.close();
        assert_eq!(pump.await.unwrap(), PumpEnd::TunClosed);
    }

    #[tokio::test]
    async fn test_carrier_loss_ends_session() {
        let (_device, mut channels) = mock_tun();
        let (local, peer) = memory_pair(true);

        let pump = tokio::spawn(async move { run(local, &mut channels).await });

        drop(peer);
        assert_eq!(pump.await.unwrap(), PumpEnd::CarrierClosed);
    }
}
