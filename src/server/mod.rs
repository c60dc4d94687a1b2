//! Replication server orchestration.
//!
//! The server ties together the transport, the peer registry and the
//! content store:
//!
//! 1. `start()` binds the transport, dials the bootstrap set concurrently,
//!    and spawns the receive loop.
//! 2. A local write (`store_data`) persists to the store first, then
//!    broadcasts the payload to every registered peer — a node never
//!    advertises data it does not itself hold.
//! 3. An inbound envelope is decoded and persisted locally, never
//!    re-broadcast (single-hop flood): a payload is broadcast exactly once,
//!    by its origin, and stored-but-not-forwarded by every recipient. A
//!    payload for a key already held locally is discarded outright, so a
//!    fully connected mesh sees each write exactly once per node.
//!
//! # Graceful Shutdown
//!
//! `stop()` signals the receive loop (the quit signal is raced against the
//! next envelope with shutdown given priority, so it wins even under
//! continuous traffic), closes the transport — which unblocks the accept
//! loop and every connection task — and waits for the receive loop to
//! drain. The transition to `Stopped` happens at most once; a second
//! `stop()` returns [`MeshError::AlreadyStopped`].

mod state;

pub use state::ServerState;

use crate::config::NodeConfig;
use crate::error::{MeshError, Result};
use crate::metrics;
use crate::registry::{BroadcastOutcome, PeerRegistry};
use crate::store::{default_transform, ContentStore, PathTransform, StoreOpts};
use crate::transport::{
    Envelope, FrameDecoder, Handshake, LengthPrefixCodec, NoopHandshake, TcpTransport,
    TcpTransportOpts, Transport,
};
use crate::wire::{BincodeCodec, Payload, PayloadCodec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Server construction options: config plus the pluggable strategies.
///
/// Strategies default to the stock implementations (SHA-1 path transform,
/// no-op handshake, length-prefix framing, bincode payloads).
pub struct ServerOpts {
    pub config: NodeConfig,
    pub transform: PathTransform,
    pub handshake: Arc<dyn Handshake>,
    pub framing: Arc<dyn FrameDecoder>,
    pub codec: Arc<dyn PayloadCodec>,
}

impl ServerOpts {
    /// Options with default strategies for the given config.
    pub fn new(config: NodeConfig) -> Self {
        let framing = Arc::new(LengthPrefixCodec {
            max_frame_len: config.max_frame_len,
        });
        Self {
            config,
            transform: default_transform(),
            handshake: Arc::new(NoopHandshake),
            framing,
            codec: Arc::new(BincodeCodec),
        }
    }
}

/// A mesh node: content-addressable store plus flood replication.
pub struct ReplicationServer {
    config: NodeConfig,
    store: Arc<ContentStore>,
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn PayloadCodec>,

    state_tx: watch::Sender<ServerState>,
    state_rx: watch::Receiver<ServerState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    /// First `stop()` wins this flag; later calls get `AlreadyStopped`.
    stopped: AtomicBool,
    local_addr: StdMutex<Option<SocketAddr>>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ReplicationServer {
    /// Create a server over a TCP transport.
    ///
    /// The server starts in `Idle`; call [`start()`](Self::start) to bind
    /// and join the network.
    pub fn new(opts: ServerOpts) -> Self {
        let registry = Arc::new(PeerRegistry::new());

        let transport = Arc::new(TcpTransport::new(TcpTransportOpts {
            listen_addr: opts.config.listen_addr.clone(),
            dial_timeout: opts.config.dial_timeout_duration(),
            inbound_queue_depth: opts.config.inbound_queue_depth,
            handshake: opts.handshake,
            framing: opts.framing,
            hooks: Some(registry.clone()),
        }));

        let store = Arc::new(ContentStore::new(StoreOpts {
            root: opts.config.store_root.clone(),
            transform: opts.transform,
        }));

        let (state_tx, state_rx) = watch::channel(ServerState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config: opts.config,
            store,
            registry,
            transport,
            codec: opts.codec,
            state_tx,
            state_rx,
            shutdown_tx,
            shutdown_rx,
            stopped: AtomicBool::new(false),
            local_addr: StdMutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ServerState> {
        self.state_rx.clone()
    }

    /// The local store.
    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// The peer registry.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// The bound listening address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr lock poisoned")
    }

    /// Bind, bootstrap and run.
    ///
    /// Binding failure is the only fatal error. Bootstrap dials run
    /// concurrently and independently: a failed dial is logged, does not
    /// block the remaining addresses, and never fails `start()`.
    pub async fn start(&self) -> Result<()> {
        if self.state() != ServerState::Idle {
            return Err(MeshError::InvalidState {
                expected: "Idle".to_string(),
                actual: self.state().to_string(),
            });
        }

        let addr = self.transport.listen_and_accept().await?;
        *self.local_addr.lock().expect("local_addr lock poisoned") = Some(addr);
        let _ = self.state_tx.send(ServerState::Listening);
        metrics::set_server_state("Listening");
        info!(listen_addr = %addr, "server listening");

        self.bootstrap();

        let inbound = self.transport.consume().ok_or_else(|| MeshError::InvalidState {
            expected: "unconsumed transport".to_string(),
            actual: "inbound queue already taken".to_string(),
        })?;

        let handle = tokio::spawn(receive_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.codec),
            inbound,
            self.shutdown_rx.clone(),
        ));
        *self.loop_handle.lock().await = Some(handle);

        let _ = self.state_tx.send(ServerState::Running);
        metrics::set_server_state("Running");
        info!(
            bootstrap_count = self.config.bootstrap_peers.len(),
            "server running"
        );

        Ok(())
    }

    /// Dial every configured bootstrap address, one task per address.
    ///
    /// Fire-and-forget with respect to the caller; empty entries ignored.
    fn bootstrap(&self) {
        for addr_str in &self.config.bootstrap_peers {
            if addr_str.is_empty() {
                continue;
            }

            let addr_str = addr_str.clone();
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                let addr: SocketAddr = match addr_str.parse() {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(addr = %addr_str, error = %e, "invalid bootstrap address");
                        return;
                    }
                };

                info!(addr = %addr, "dialing bootstrap peer");
                if let Err(e) = transport.dial(addr).await {
                    warn!(addr = %addr, error = %e, "bootstrap dial failed");
                }
            });
        }
    }

    /// Store a blob locally and replicate it to all connected peers.
    ///
    /// Local persistence happens first; the broadcast only goes out after
    /// the write succeeds. Per-peer broadcast failures are reported in the
    /// returned outcome, not as an error.
    pub async fn store_data<R>(&self, key: &str, mut reader: R) -> Result<BroadcastOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| MeshError::StoreWrite {
                path: self.store.root().to_path_buf(),
                source: e,
            })?;

        let written = self.store.write_bytes(key, &data).await?;
        metrics::record_local_write(written);

        let payload = Payload {
            key: key.to_string(),
            data,
        };
        let bytes = self.codec.encode(&payload)?;
        let outcome = self.registry.broadcast(&bytes).await;

        info!(
            key = %key,
            bytes = written,
            delivered = outcome.delivered,
            failed = outcome.failed.len(),
            "stored and replicated"
        );
        Ok(outcome)
    }

    /// Stop the server.
    ///
    /// Safe to call exactly once: the second call fails with
    /// [`MeshError::AlreadyStopped`] instead of re-closing anything.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(MeshError::AlreadyStopped);
        }

        info!("stopping server");
        let _ = self.shutdown_tx.send(true);
        self.transport.close().await;

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "receive loop task failed during shutdown");
            }
        }

        let _ = self.state_tx.send(ServerState::Stopped);
        metrics::set_server_state("Stopped");
        info!("server stopped");
        Ok(())
    }
}

/// Consume the inbound queue until shutdown.
///
/// Shutdown is raced against the next envelope with priority, so it always
/// eventually wins even under continuous traffic. Per-message failures are
/// logged and never terminate the loop.
async fn receive_loop(
    store: Arc<ContentStore>,
    codec: Arc<dyn PayloadCodec>,
    mut inbound: mpsc::Receiver<Envelope>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("receive loop started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown; otherwise this arm
                // is ready with Err on every iteration and starves recv.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            envelope = inbound.recv() => {
                match envelope {
                    Some(envelope) => handle_envelope(&store, codec.as_ref(), envelope).await,
                    None => {
                        debug!("inbound queue closed");
                        break;
                    }
                }
            }
        }
    }

    debug!("receive loop stopped");
}

/// Apply one replicated payload.
///
/// A payload for a key already held locally is discarded — that is the
/// loop/duplicate suppression that keeps a fully connected mesh from
/// flooding forever. Fresh payloads are persisted and never forwarded.
async fn handle_envelope(store: &ContentStore, codec: &dyn PayloadCodec, envelope: Envelope) {
    let from = envelope.from;
    let payload = match codec.decode(&envelope.payload) {
        Ok(p) => p,
        Err(e) => {
            warn!(peer_addr = %from, error = %e, "dropping undecodable payload");
            return;
        }
    };

    match store.has(&payload.key).await {
        Ok(true) => {
            debug!(peer_addr = %from, key = %payload.key, "already held, suppressing");
            metrics::record_replication_suppressed();
        }
        Ok(false) => match store.write_bytes(&payload.key, &payload.data).await {
            Ok(written) => {
                metrics::record_replication_applied(written);
                debug!(peer_addr = %from, key = %payload.key, bytes = written, "replicated blob");
            }
            Err(e) => {
                warn!(peer_addr = %from, key = %payload.key, error = %e, "failed to persist replicated blob");
            }
        },
        Err(e) => {
            warn!(peer_addr = %from, key = %payload.key, error = %e, "existence check failed");
        }
    }
}
