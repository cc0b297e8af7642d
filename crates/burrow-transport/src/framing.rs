// ============================================
// File: crates/burrow-transport/src/framing.rs
// ============================================
//! # Stream Frame Codec
//!
//! ## Creation Reason
//! A byte stream has no message boundaries, so packets crossing a
//! reliable carrier are framed. This module owns that wire format.
//!
//! ## Wire Format
//! ```text
//! ┌──────────────────────┬─────────────────────┐
//! │ length (u16, LE)     │ packet (length B)   │
//! └──────────────────────┴─────────────────────┘
//! ```
//! No magic bytes, no version field. The `u16` width is fixed; it is
//! not the platform's native integer size.
//!
//! ## Parsing Strategy
//! 1. Read exactly 2 bytes; EOF *here* is a clean end of stream
//! 2. Decode the little-endian length; zero is malformed
//! 3. Read exactly `length` bytes; EOF *here* is a truncated frame
//!
//! ## ⚠️ Important Note for Next Developer
//! - `read_exact` already loops over short reads; do not add another
//!   loop around it
//! - Any framing error is fatal to the endpoint; there is no way to
//!   resynchronize a corrupted length-prefixed stream
//!
//! ## Last Modified
//! v0.1.0 - Initial frame codec

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use burrow_common::types::{Packet, MAX_PACKET};

use crate::error::{Result, TransportError};

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 2;

// ============================================
// Encoding
// ============================================

/// Encodes one packet into a length-prefixed frame.
///
/// # Errors
/// - `OversizedPacket` if the packet exceeds `MAX_PACKET`
/// - `Framing` for an empty packet (a zero length on the wire would be
///   indistinguishable from corruption)
pub fn encode_frame(packet: &[u8]) -> Result<BytesMut> {
    if packet.is_empty() {
        return Err(TransportError::framing("refusing to encode empty packet"));
    }
    if packet.len() > MAX_PACKET {
        return Err(TransportError::OversizedPacket { size: packet.len() });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + packet.len());
    frame.put_u16_le(packet.len() as u16);
    frame.put_slice(packet);
    Ok(frame)
}

/// Encodes and writes one frame.
///
/// # Errors
/// Encoding errors as in [`encode_frame`]; write failures surface as
/// `CarrierIo`.
pub async fn write_frame<W>(writer: &mut W, packet: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| TransportError::carrier_io("writing frame", e))
}

// ============================================
// Decoding
// ============================================

/// Reads one frame from the stream.
///
/// Returns `Ok(None)` on a clean end of stream (EOF on a frame
/// boundary).
///
/// # Errors
/// - `Framing` for a zero length or a stream that ends mid-frame
/// - `CarrierIo` for any other read failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::carrier_io("reading frame header", e)),
    }

    let length = u16::from_le_bytes(header) as usize;
    if length == 0 {
        return Err(TransportError::framing("zero-length frame"));
    }

    let mut packet = vec![0u8; length];
    match reader.read_exact(&mut packet).await {
        Ok(_) => Ok(Some(packet)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            TransportError::framing(format!("stream ended inside a {length}-byte frame")),
        ),
        Err(e) => Err(TransportError::carrier_io("reading frame body", e)),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(&frame[..], &[0x03, 0x00, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_length_is_little_endian() {
        let frame = encode_frame(&vec![0u8; 0x0102]).unwrap();
        assert_eq!(&frame[..2], &[0x02, 0x01]);
    }

    #[test]
    fn test_encode_rejects_empty_and_oversized() {
        assert!(matches!(
            encode_frame(b""),
            Err(TransportError::Framing { .. })
        ));
        assert!(matches!(
            encode_frame(&vec![0u8; MAX_PACKET + 1]),
            Err(TransportError::OversizedPacket { .. })
        ));
        assert!(encode_frame(&vec![0u8; MAX_PACKET]).is_ok());
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256 * 1024);

        for packet in [&b"x"[..], b"hello world", &vec![0xAB; MAX_PACKET]] {
            write_frame(&mut client, packet).await.unwrap();
            let decoded = read_frame(&mut server).await.unwrap().unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[tokio::test]
    async fn test_back_to_back_frames_keep_boundaries() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_frame(&mut client, b"first").await.unwrap();
        write_frame(&mut client, b"second").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut server).await.unwrap().unwrap(), b"second");
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_on_boundary_is_clean() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_framing_error() {
        let (mut client, mut server) = tokio::io::duplex(64);

        // Announce 10 bytes, deliver 3, hang up.
        client.write_all(&[0x0A, 0x00]).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await,
            Err(TransportError::Framing { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_framing_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0x00, 0x00]).await.unwrap();

        assert!(matches!(
            read_frame(&mut server).await,
            Err(TransportError::Framing { .. })
        ));
    }
}
