//! Live peer registry and broadcast fan-out.
//!
//! Peers are keyed by remote address; a reconnect from the same address
//! replaces the prior entry. The map is the only structure mutated from
//! multiple tasks (accept tasks add, teardown removes, broadcast reads),
//! so all access goes through the sharded map and broadcast works off a
//! snapshot — a slow write to one peer never blocks registration of
//! another.
//!
//! Broadcast serializes the payload exactly once and writes the identical
//! bytes to every peer in the snapshot. A failed write is isolated to its
//! peer: the peer is evicted and delivery to the rest continues.

use crate::error::Result;
use crate::metrics;
use crate::transport::{Peer, PeerHooks};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a broadcast: who got it, who was dropped.
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    /// Number of peers the payload was delivered to.
    pub delivered: usize,
    /// Peers whose write failed; already removed from the registry.
    pub failed: Vec<SocketAddr>,
}

impl BroadcastOutcome {
    /// True when every registered peer received the payload.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of live peers, keyed by remote address.
pub struct PeerRegistry {
    peers: DashMap<SocketAddr, Arc<dyn Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Insert a peer, replacing any prior entry for the same address.
    pub fn add(&self, peer: Arc<dyn Peer>) {
        let addr = peer.remote_addr();
        if self.peers.insert(addr, peer).is_some() {
            debug!(peer_addr = %addr, "replaced existing peer entry");
        }
        metrics::set_registered_peers(self.len());
    }

    /// Remove a peer. No-op if absent.
    pub fn remove(&self, addr: SocketAddr) {
        if self.peers.remove(&addr).is_some() {
            debug!(peer_addr = %addr, "removed peer");
        }
        metrics::set_registered_peers(self.len());
    }

    /// Remove the entry for this exact connection.
    ///
    /// Removal matches on identity, not address: when a reconnect has
    /// replaced the entry, the superseded connection's teardown leaves the
    /// replacement registered.
    pub fn remove_connection(&self, peer: &Arc<dyn Peer>) {
        let addr = peer.remote_addr();
        if self
            .peers
            .remove_if(&addr, |_, existing| Arc::ptr_eq(existing, peer))
            .is_some()
        {
            debug!(peer_addr = %addr, "removed peer");
        }
        metrics::set_registered_peers(self.len());
    }

    /// Look up a peer by address.
    pub fn get(&self, addr: SocketAddr) -> Option<Arc<dyn Peer>> {
        self.peers.get(&addr).map(|r| Arc::clone(r.value()))
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Snapshot of the current peers.
    ///
    /// Broadcast works off this copy so slow sends never hold the map.
    pub fn snapshot(&self) -> Vec<Arc<dyn Peer>> {
        self.peers.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Send the same serialized bytes to every currently registered peer.
    ///
    /// Peers registered after the snapshot is taken do not receive this
    /// payload. Per-peer failures are collected, the failing peers are
    /// evicted, and delivery to the remaining peers continues.
    pub async fn broadcast(&self, bytes: &[u8]) -> BroadcastOutcome {
        let snapshot = self.snapshot();
        let mut outcome = BroadcastOutcome::default();

        for peer in snapshot {
            let addr = peer.remote_addr();
            match peer.send(bytes).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    warn!(peer_addr = %addr, error = %e, "broadcast write failed, evicting peer");
                    peer.close().await;
                    self.remove_connection(&peer);
                    outcome.failed.push(addr);
                }
            }
        }

        metrics::record_broadcast(outcome.delivered, outcome.failed.len());
        outcome
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerHooks for PeerRegistry {
    fn peer_connected(&self, peer: Arc<dyn Peer>) -> Result<()> {
        info!(peer_addr = %peer.remote_addr(), "registering peer");
        self.add(peer);
        Ok(())
    }

    fn peer_disconnected(&self, peer: Arc<dyn Peer>) {
        self.remove_connection(&peer);
    }
}
