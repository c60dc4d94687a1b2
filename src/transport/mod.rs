//! Transport and peer abstractions.
//!
//! The rest of the system depends only on these contracts:
//!
//! - [`Peer`]: a live bidirectional connection — send bytes, report the
//!   remote address, close.
//! - [`Transport`]: bind and accept, dial out, hand over the single shared
//!   inbound envelope queue, shut down.
//! - [`Handshake`]: a pluggable pre-traffic exchange run once per
//!   connection before any envelope is accepted. Default is a no-op that
//!   always succeeds.
//! - [`FrameDecoder`]: pluggable framing. Default is a 4-byte big-endian
//!   length prefix.
//! - [`PeerHooks`]: connect/disconnect notifications, supplied by whoever
//!   tracks live peers.
//!
//! Concrete TCP realization lives in [`tcp`].

pub mod tcp;

pub use tcp::{TcpPeer, TcpTransport, TcpTransportOpts};

use crate::error::{MeshError, Result};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One decoded unit of wire traffic, tagged with its sender.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Remote address of the connection that produced this message.
    pub from: SocketAddr,
    /// Opaque payload bytes; the server's codec interprets them.
    pub payload: Bytes,
}

/// A live connection to a remote node.
///
/// Created by the transport on accept/dial, shared read-only once
/// registered, torn down when the underlying connection closes.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Send one framed message to the remote side.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Remote address this peer is keyed under.
    fn remote_addr(&self) -> SocketAddr;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// A pluggable listener/dialer producing framed envelopes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind the listening socket and start the accept loop.
    ///
    /// Returns the bound local address (useful when listening on port 0).
    async fn listen_and_accept(&self) -> Result<SocketAddr>;

    /// Dial a remote node. Returns once the connection is established;
    /// handshake and message handling continue asynchronously.
    async fn dial(&self, addr: SocketAddr) -> Result<()>;

    /// Take the shared inbound queue.
    ///
    /// The queue is a lazy, infinite, non-restartable sequence of envelopes
    /// fanned in from every connection; it can be taken exactly once.
    fn consume(&self) -> Option<mpsc::Receiver<Envelope>>;

    /// Release listening resources and stop all connection tasks.
    async fn close(&self);
}

/// Pre-traffic exchange validating a new connection.
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Run the handshake against a freshly connected peer.
    ///
    /// `outbound` is true when this side dialed the connection.
    async fn execute(&self, peer: &dyn Peer, outbound: bool) -> Result<()>;
}

/// The default handshake: zero messages, always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandshake;

#[async_trait]
impl Handshake for NoopHandshake {
    async fn execute(&self, _peer: &dyn Peer, _outbound: bool) -> Result<()> {
        Ok(())
    }
}

/// Connect/disconnect notifications for registered peers.
///
/// `peer_connected` may reject the connection, which aborts it before the
/// decode loop starts. `peer_disconnected` fires when a connection is torn
/// down after having been accepted.
pub trait PeerHooks: Send + Sync {
    /// A connection passed its handshake.
    fn peer_connected(&self, peer: Arc<dyn Peer>) -> Result<()>;

    /// A previously accepted connection closed.
    ///
    /// Carries the peer itself, not just its address: a reconnect replaces
    /// the registry entry while the superseded connection is still winding
    /// down, and its teardown must not evict the live replacement.
    fn peer_disconnected(&self, peer: Arc<dyn Peer>);
}

/// Pluggable frame extraction from a raw byte stream.
///
/// `decode` consumes zero or more bytes from `buf` and returns one frame's
/// payload, or `None` when more bytes are needed. Errors are classified by
/// the caller via [`MeshError::is_connection_fatal`].
pub trait FrameDecoder: Send + Sync {
    /// Try to extract one frame from the buffer.
    fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>>;

    /// Frame a payload for the wire.
    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()>;
}

/// Default framing: 4-byte big-endian length prefix.
///
/// ```text
/// +------------------+-------------------+
/// | Length (4B BE)   | Payload (opaque)  |
/// +------------------+-------------------+
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LengthPrefixCodec {
    /// Upper bound on accepted frame size. An oversized header means the
    /// stream cannot be resynchronized, so it is treated as fatal.
    pub max_frame_len: usize,
}

impl Default for LengthPrefixCodec {
    fn default() -> Self {
        Self {
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}

impl FrameDecoder for LengthPrefixCodec {
    fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > self.max_frame_len {
            // Past this point framing is unrecoverable: there is no way to
            // find the next frame boundary in the stream.
            return Err(MeshError::Decode(format!(
                "frame length {len} exceeds limit {}",
                self.max_frame_len
            )));
        }

        if buf.len() < 4 + len {
            return Ok(None);
        }

        buf.advance(4);
        Ok(Some(buf.split_to(len).freeze()))
    }

    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_len {
            return Err(MeshError::Decode(format!(
                "payload length {} exceeds frame limit {}",
                payload.len(),
                self.max_frame_len
            )));
        }
        dst.reserve(4 + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_roundtrip() {
        let codec = LengthPrefixCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(b"hello mesh", &mut wire).unwrap();

        let frame = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello mesh");
        assert!(wire.is_empty());
    }

    #[test]
    fn test_partial_frame_needs_more_data() {
        let codec = LengthPrefixCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(b"0123456789", &mut wire).unwrap();

        // Feed the header plus half the payload.
        let mut partial = BytesMut::from(&wire[..9]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Remainder arrives; the frame completes.
        partial.extend_from_slice(&wire[9..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(&frame[..], b"0123456789");
    }

    #[test]
    fn test_back_to_back_frames() {
        let codec = LengthPrefixCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(b"first", &mut wire).unwrap();
        codec.encode(b"second", &mut wire).unwrap();

        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"first");
        assert_eq!(&codec.decode(&mut wire).unwrap().unwrap()[..], b"second");
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let codec = LengthPrefixCodec { max_frame_len: 16 };
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        buf.put_slice(&[0u8; 8]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, MeshError::Decode(_)));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let codec = LengthPrefixCodec { max_frame_len: 4 };
        let mut dst = BytesMut::new();
        assert!(codec.encode(b"way too long", &mut dst).is_err());
    }

    #[test]
    fn test_empty_payload_frames() {
        let codec = LengthPrefixCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(b"", &mut wire).unwrap();

        let frame = codec.decode(&mut wire).unwrap().unwrap();
        assert!(frame.is_empty());
    }
}
