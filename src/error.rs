//! Error types for the mesh node.
//!
//! Errors are categorized by where they occur (transport setup, a single
//! connection, a single peer send, the local store) so that callers and
//! background tasks can contain them at the right scope.
//!
//! # Error Categories
//!
//! | Error Type | Scope | Fatal to |
//! |------------|-------|----------|
//! | `Bind` | Transport setup | `start()` |
//! | `Connect` | One dial attempt | That attempt only |
//! | `Handshake` | One connection | That connection only |
//! | `Decode` | One message | Nothing (logged, loop continues) |
//! | `ConnectionLost` | One connection | That connection only |
//! | `PeerWrite` | One peer during broadcast | That peer (evicted) |
//! | `StoreWrite` / `StoreDelete` | One store operation | Surfaced to caller |
//! | `NotFound` | One read | Surfaced to caller |
//! | `AlreadyStopped` | Server lifecycle | Surfaced to caller |
//! | `QueueClosed` | Inbound queue | That connection's delivery |
//!
//! # Propagation Policy
//!
//! Connection-level failures never cross over to the receive loop or to other
//! peers. Store failures propagate synchronously to whoever initiated the
//! operation. Only `Bind` at startup is fatal to the server.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur in the mesh node.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Failed to bind the listening socket.
    ///
    /// The only error fatal to server startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish an outbound connection.
    ///
    /// Fatal to that dial attempt, never to the process. Bootstrap dials
    /// log this and keep going with the remaining addresses.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Handshake with a new connection failed.
    ///
    /// Terminates only that connection, before the decode loop starts.
    #[error("handshake with {addr} failed: {message}")]
    Handshake { addr: SocketAddr, message: String },

    /// A frame or payload failed to decode.
    ///
    /// Per-message. Transient decode failures are logged and the loop
    /// continues; use [`is_connection_fatal()`](Self::is_connection_fatal)
    /// to distinguish the stream-level failures that must tear the
    /// connection down.
    #[error("decode error: {0}")]
    Decode(String),

    /// The underlying stream closed or broke mid-read.
    ///
    /// Terminates the connection; the peer is removed from the registry.
    #[error("connection to {addr} lost")]
    ConnectionLost { addr: SocketAddr },

    /// Writing to a single peer failed during broadcast.
    ///
    /// Isolated to that peer: it is evicted from the registry and delivery
    /// to the remaining peers continues.
    #[error("write to peer {addr} failed: {source}")]
    PeerWrite {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The on-peer hook rejected a new connection.
    #[error("peer {addr} rejected: {message}")]
    PeerRejected { addr: SocketAddr, message: String },

    /// Writing a blob to the local store failed.
    #[error("store write for {path:?} failed: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deleting a blob's shard subtree failed.
    #[error("store delete for {path:?} failed: {source}")]
    StoreDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No blob stored under this key.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A stat/open on the store failed for a reason other than absence.
    ///
    /// Kept distinct from `NotFound` so existence checks never mistake an
    /// I/O failure for a missing blob.
    #[error("store I/O error for {path:?}: {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `stop()` was called on a server that already stopped.
    #[error("server already stopped")]
    AlreadyStopped,

    /// An operation was attempted in the wrong server state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The inbound queue closed while a connection tried to deliver into it.
    ///
    /// Happens only during shutdown; the connection task exits.
    #[error("inbound queue closed")]
    QueueClosed,
}

impl MeshError {
    /// Check whether this error must terminate its connection.
    ///
    /// The decode loop logs transient errors and keeps reading, but a
    /// broken stream (or a closing queue) means the connection is done.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Self::ConnectionLost { .. } => true,
            Self::QueueClosed => true,
            Self::Handshake { .. } => true,
            Self::PeerRejected { .. } => true,
            Self::Decode(_) => false,
            Self::Bind { .. } => false,
            Self::Connect { .. } => false,
            Self::PeerWrite { .. } => false,
            Self::StoreWrite { .. } => false,
            Self::StoreDelete { .. } => false,
            Self::NotFound { .. } => false,
            Self::StoreIo { .. } => false,
            Self::AlreadyStopped => false,
            Self::InvalidState { .. } => false,
        }
    }

    /// Classify an I/O error from a stream read.
    ///
    /// EOF, reset and broken-pipe all mean the remote side is gone.
    pub fn from_read_error(addr: SocketAddr, e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::ConnectionLost { addr },
            _ => Self::Decode(format!("read from {addr}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_connection_lost_is_fatal() {
        let err = MeshError::ConnectionLost { addr: addr() };
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn test_decode_is_transient() {
        let err = MeshError::Decode("truncated frame".to_string());
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_handshake_terminates_connection() {
        let err = MeshError::Handshake {
            addr: addr(),
            message: "bad magic".to_string(),
        };
        assert!(err.is_connection_fatal());
        assert!(err.to_string().contains("127.0.0.1:4000"));
    }

    #[test]
    fn test_peer_write_is_not_connection_fatal() {
        // Broadcast-side failures evict the peer but never reach a decode loop.
        let err = MeshError::PeerWrite {
            addr: addr(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        };
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_read_error_classification() {
        use std::io::{Error, ErrorKind};

        let lost = MeshError::from_read_error(addr(), Error::new(ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(lost, MeshError::ConnectionLost { .. }));

        let lost = MeshError::from_read_error(
            addr(),
            Error::new(ErrorKind::ConnectionReset, "reset by peer"),
        );
        assert!(matches!(lost, MeshError::ConnectionLost { .. }));

        let transient =
            MeshError::from_read_error(addr(), Error::new(ErrorKind::InvalidData, "garbage"));
        assert!(matches!(transient, MeshError::Decode(_)));
        assert!(!transient.is_connection_fatal());
    }

    #[test]
    fn test_not_found_formatting() {
        let err = MeshError::NotFound {
            key: "some-key".to_string(),
        };
        assert!(err.to_string().contains("some-key"));
        assert!(!err.is_connection_fatal());
    }

    #[test]
    fn test_already_stopped() {
        let err = MeshError::AlreadyStopped;
        assert!(!err.is_connection_fatal());
        assert_eq!(err.to_string(), "server already stopped");
    }
}
