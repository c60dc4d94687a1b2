//! TCP realization of the transport contract.
//!
//! One independent task per accepted or dialed connection. Each task runs
//! the handshake, notifies the peer hooks, then enters a framed decode loop
//! that fans every message into the single shared inbound queue.
//!
//! # Connection Lifecycle
//!
//! ```text
//! accept/dial → TcpPeer → handshake → peer_connected hook → decode loop
//!                  │           │              │                  │
//!                  │      (failure:      (rejection:        (stream broken /
//!                  │       close)         close)             queue closed:
//!                  │                                          close + hook)
//!                  └────────────────── peer_disconnected ←─────┘
//! ```
//!
//! Handshake or hook failure aborts the connection before any envelope is
//! accepted. Framing errors cannot be resynchronized on a byte stream, so
//! they tear the connection down; payload-level decode problems are the
//! receive loop's business and never reach this layer.
//!
//! # Backpressure
//!
//! The inbound queue is bounded. When the consumer falls behind, connection
//! tasks block in `send().await` — messages are never dropped.

use crate::error::{MeshError, Result};
use crate::metrics;
use crate::transport::{Envelope, FrameDecoder, Handshake, Peer, PeerHooks, Transport};
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Construction options for [`TcpTransport`].
#[derive(Clone)]
pub struct TcpTransportOpts {
    /// Address to bind, e.g. `"127.0.0.1:4000"`. Port 0 picks a free port.
    pub listen_addr: String,
    /// Bound on connection establishment for outbound dials.
    pub dial_timeout: Duration,
    /// Capacity of the shared inbound queue.
    pub inbound_queue_depth: usize,
    /// Pre-traffic exchange run once per connection.
    pub handshake: Arc<dyn Handshake>,
    /// Frame extraction strategy.
    pub framing: Arc<dyn FrameDecoder>,
    /// Connect/disconnect notifications (typically the peer registry).
    pub hooks: Option<Arc<dyn PeerHooks>>,
}

/// A TCP connection wrapped as a [`Peer`].
pub struct TcpPeer {
    addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    framing: Arc<dyn FrameDecoder>,
    /// True when this side dialed the connection.
    outbound: bool,
}

impl TcpPeer {
    fn new(
        addr: SocketAddr,
        writer: OwnedWriteHalf,
        framing: Arc<dyn FrameDecoder>,
        outbound: bool,
    ) -> Self {
        Self {
            addr,
            writer: Mutex::new(writer),
            framing,
            outbound,
        }
    }

    /// Whether this side initiated the connection.
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }
}

#[async_trait]
impl Peer for TcpPeer {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut frame = BytesMut::new();
        self.framing.encode(payload, &mut frame)?;

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| MeshError::PeerWrite {
                addr: self.addr,
                source: e,
            })?;
        writer.flush().await.map_err(|e| MeshError::PeerWrite {
            addr: self.addr,
            source: e,
        })
    }

    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn close(&self) {
        // A second close finds the stream already shut down; ignore.
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Everything a connection task needs, shared across all connections.
struct ConnShared {
    handshake: Arc<dyn Handshake>,
    framing: Arc<dyn FrameDecoder>,
    hooks: Option<Arc<dyn PeerHooks>>,
    inbound_tx: mpsc::Sender<Envelope>,
    shutdown_rx: watch::Receiver<bool>,
}

/// TCP transport: listener, dialer and per-connection decode loops.
pub struct TcpTransport {
    opts: TcpTransportOpts,
    shared: Arc<ConnShared>,
    inbound_rx: StdMutex<Option<mpsc::Receiver<Envelope>>>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: StdMutex<Option<SocketAddr>>,
}

impl TcpTransport {
    /// Create a transport. Nothing is bound until
    /// [`listen_and_accept()`](Transport::listen_and_accept).
    pub fn new(opts: TcpTransportOpts) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(opts.inbound_queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(ConnShared {
            handshake: Arc::clone(&opts.handshake),
            framing: Arc::clone(&opts.framing),
            hooks: opts.hooks.clone(),
            inbound_tx,
            shutdown_rx,
        });

        Self {
            opts,
            shared,
            inbound_rx: StdMutex::new(Some(inbound_rx)),
            shutdown_tx,
            local_addr: StdMutex::new(None),
        }
    }

    /// The bound listening address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr lock poisoned")
    }

    async fn accept_loop(listener: TcpListener, shared: Arc<ConnShared>) {
        let mut shutdown_rx = shared.shutdown_rx.clone();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(peer_addr = %addr, "accepted inbound connection");
                            let shared = Arc::clone(&shared);
                            tokio::spawn(async move {
                                handle_conn(stream, addr, false, shared).await;
                            });
                        }
                        Err(e) => {
                            // Transient accept failures (fd exhaustion) must
                            // not kill the loop; back off and retry.
                            warn!(error = %e, "accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("accept loop stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen_and_accept(&self) -> Result<SocketAddr> {
        let listener =
            TcpListener::bind(&self.opts.listen_addr)
                .await
                .map_err(|e| MeshError::Bind {
                    addr: self.opts.listen_addr.clone(),
                    source: e,
                })?;

        let addr = listener.local_addr().map_err(|e| MeshError::Bind {
            addr: self.opts.listen_addr.clone(),
            source: e,
        })?;
        *self.local_addr.lock().expect("local_addr lock poisoned") = Some(addr);

        info!(listen_addr = %addr, "transport listening");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            Self::accept_loop(listener, shared).await;
        });

        Ok(addr)
    }

    async fn dial(&self, addr: SocketAddr) -> Result<()> {
        let stream = match timeout(self.opts.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(MeshError::Connect {
                    addr: addr.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(MeshError::Connect {
                    addr: addr.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("dial timed out after {:?}", self.opts.dial_timeout),
                    ),
                })
            }
        };

        debug!(peer_addr = %addr, "dialed outbound connection");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            handle_conn(stream, addr, true, shared).await;
        });

        Ok(())
    }

    fn consume(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inbound_rx
            .lock()
            .expect("inbound_rx lock poisoned")
            .take()
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Handle one connection: handshake, hook, decode loop, teardown.
///
/// Identical for inbound and outbound connections apart from the
/// directionality flag passed to the handshake.
async fn handle_conn(stream: TcpStream, addr: SocketAddr, outbound: bool, shared: Arc<ConnShared>) {
    let (read_half, write_half) = stream.into_split();
    let peer: Arc<dyn Peer> = Arc::new(TcpPeer::new(
        addr,
        write_half,
        Arc::clone(&shared.framing),
        outbound,
    ));

    if let Err(e) = shared.handshake.execute(peer.as_ref(), outbound).await {
        warn!(peer_addr = %addr, error = %e, "handshake failed, dropping connection");
        peer.close().await;
        return;
    }

    if let Some(ref hooks) = shared.hooks {
        if let Err(e) = hooks.peer_connected(Arc::clone(&peer)) {
            warn!(peer_addr = %addr, error = %e, "peer rejected by hook, dropping connection");
            peer.close().await;
            return;
        }
    }

    metrics::record_peer_connected(outbound);
    info!(peer_addr = %addr, outbound, "peer connected");

    let reason = decode_loop(read_half, addr, &shared).await;

    debug!(peer_addr = %addr, reason = %reason, "connection closing");
    peer.close().await;
    if let Some(ref hooks) = shared.hooks {
        hooks.peer_disconnected(Arc::clone(&peer));
    }
    metrics::record_peer_disconnected();
}

/// Read frames until the stream breaks, shutdown is signaled, or the
/// inbound queue closes. Returns a human-readable teardown reason.
async fn decode_loop(
    mut read_half: OwnedReadHalf,
    addr: SocketAddr,
    shared: &ConnShared,
) -> MeshError {
    let mut shutdown_rx = shared.shutdown_rx.clone();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        // Drain every complete frame currently buffered.
        loop {
            match shared.framing.decode(&mut buf) {
                Ok(Some(payload)) => {
                    metrics::record_envelope_received(payload.len());
                    let envelope = Envelope {
                        from: addr,
                        payload,
                    };
                    // Bounded queue: block here under backpressure rather
                    // than dropping the message.
                    if shared.inbound_tx.send(envelope).await.is_err() {
                        return MeshError::QueueClosed;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Framing errors leave the stream unsynchronizable.
                    warn!(peer_addr = %addr, error = %e, "unrecoverable framing error");
                    return MeshError::ConnectionLost { addr };
                }
            }
        }

        tokio::select! {
            read = read_half.read_buf(&mut buf) => {
                match read {
                    Ok(0) => return MeshError::ConnectionLost { addr },
                    Ok(_) => {}
                    Err(e) => {
                        let classified = MeshError::from_read_error(addr, e);
                        if classified.is_connection_fatal() {
                            return classified;
                        }
                        // Transient read hiccup; keep the loop alive.
                        warn!(peer_addr = %addr, error = %classified, "transient read error");
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    return MeshError::QueueClosed;
                }
            }
        }
    }
}
