//! # blobmesh
//!
//! A peer-to-peer node that stores content-addressable blobs locally and
//! replicates writes to all connected peers over a framed TCP protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ReplicationServer                          │
//! │                                                                      │
//! │  store_data(key, r) ──► ContentStore.write ──► PeerRegistry.broadcast│
//! │                                                        │             │
//! │                                                        ▼             │
//! │  ┌──────────────┐   envelopes   ┌─────────────┐   ┌──────────┐       │
//! │  │ TcpTransport │──────────────►│ receive loop│──►│ContentStore│     │
//! │  │ (accept/dial,│  (one shared  │ (dedup +    │   │ (sharded │       │
//! │  │  decode loop │   queue)      │  persist,   │   │  tree)   │       │
//! │  │  per conn)   │               │  no forward)│   └──────────┘       │
//! │  └──────────────┘               └─────────────┘                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replication Protocol
//!
//! Single-hop flood: the origin of a write broadcasts the payload once to
//! every registered peer; recipients persist it and never forward it. A
//! payload for a key the recipient already holds is discarded, so a fully
//! connected mesh of N nodes sees each write exactly once per node.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blobmesh::{NodeConfig, ReplicationServer, ServerOpts};
//!
//! #[tokio::main]
//! async fn main() -> blobmesh::Result<()> {
//!     let mut config = NodeConfig::default();
//!     config.listen_addr = "0.0.0.0:4000".into();
//!     config.bootstrap_peers = vec!["10.0.0.2:4000".into()];
//!
//!     let server = ReplicationServer::new(ServerOpts::new(config));
//!     server.start().await?;
//!
//!     server.store_data("hello", &b"world"[..]).await?;
//!
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod store;
pub mod transport;
pub mod wire;

// Re-exports for convenience
pub use config::NodeConfig;
pub use error::{MeshError, Result};
pub use registry::{BroadcastOutcome, PeerRegistry};
pub use server::{ReplicationServer, ServerOpts, ServerState};
pub use store::{ContentStore, PathKey, StoreOpts};
pub use transport::{Envelope, Handshake, Peer, TcpTransport, Transport};
pub use wire::{Payload, PayloadCodec};
