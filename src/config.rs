//! Node configuration.
//!
//! Configuration is plain data: addresses, paths and tuning knobs. It can
//! be constructed programmatically or deserialized from JSON/YAML. The
//! pluggable strategies (path transform, handshake, framing, payload
//! codec) are injected separately via [`ServerOpts`](crate::server::ServerOpts),
//! so config stays serializable.
//!
//! # Example
//!
//! ```rust
//! use blobmesh::config::NodeConfig;
//!
//! let config = NodeConfig {
//!     listen_addr: "0.0.0.0:4000".into(),
//!     bootstrap_peers: vec!["10.0.0.2:4000".into(), "10.0.0.3:4000".into()],
//!     ..NodeConfig::default()
//! };
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for one mesh node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to bind the TCP listener on. Port 0 picks a free port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root directory for the content-addressed store.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// Peer addresses dialed at startup to join the network.
    /// Empty entries are ignored; each address is dialed independently.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// Capacity of the shared inbound envelope queue. Producers block when
    /// the queue is full (backpressure, never loss).
    #[serde(default = "default_inbound_queue_depth")]
    pub inbound_queue_depth: usize,

    /// Bound on outbound connection establishment, as a duration string
    /// (e.g. `"5s"`).
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: String,

    /// Upper bound on a single wire frame.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_store_root() -> PathBuf {
    PathBuf::from("blobmesh_data")
}

fn default_inbound_queue_depth() -> usize {
    256
}

fn default_dial_timeout() -> String {
    "5s".to_string()
}

fn default_max_frame_len() -> usize {
    16 * 1024 * 1024
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_root: default_store_root(),
            bootstrap_peers: Vec::new(),
            inbound_queue_depth: default_inbound_queue_depth(),
            dial_timeout: default_dial_timeout(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl NodeConfig {
    /// Parse `dial_timeout` to a [`Duration`], falling back to 5 seconds.
    pub fn dial_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.dial_timeout).unwrap_or(Duration::from_secs(5))
    }

    /// Minimal config for tests: ephemeral port, temp-style store root.
    pub fn for_testing(store_root: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            store_root: store_root.into(),
            bootstrap_peers: Vec::new(),
            inbound_queue_depth: 64,
            dial_timeout: "2s".to_string(),
            max_frame_len: default_max_frame_len(),
        }
    }
}
