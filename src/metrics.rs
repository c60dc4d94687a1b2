//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Peer connections and registry size
//! - Inbound envelope volume
//! - Broadcast deliveries and failures
//! - Replication dedup suppressions
//! - Store write volume
//!
//! All metrics are prefixed with `blobmesh_`; counters end in `_total`,
//! gauges represent current state.

use metrics::{counter, gauge};

/// Record a connection that passed handshake and hooks.
pub fn record_peer_connected(outbound: bool) {
    let direction = if outbound { "outbound" } else { "inbound" };
    counter!("blobmesh_peer_connections_total", "direction" => direction).increment(1);
}

/// Record a connection teardown.
pub fn record_peer_disconnected() {
    counter!("blobmesh_peer_disconnections_total").increment(1);
}

/// Set the current number of registered peers.
pub fn set_registered_peers(count: usize) {
    gauge!("blobmesh_registered_peers").set(count as f64);
}

/// Record one envelope delivered into the inbound queue.
pub fn record_envelope_received(bytes: usize) {
    counter!("blobmesh_envelopes_received_total").increment(1);
    counter!("blobmesh_envelope_bytes_total").increment(bytes as u64);
}

/// Record a broadcast fan-out result.
pub fn record_broadcast(delivered: usize, failed: usize) {
    counter!("blobmesh_broadcasts_total").increment(1);
    counter!("blobmesh_broadcast_deliveries_total").increment(delivered as u64);
    if failed > 0 {
        counter!("blobmesh_broadcast_failures_total").increment(failed as u64);
    }
}

/// Record a replicated payload suppressed because the key was already held.
pub fn record_replication_suppressed() {
    counter!("blobmesh_replication_suppressed_total").increment(1);
}

/// Record a replicated payload persisted locally.
pub fn record_replication_applied(bytes: u64) {
    counter!("blobmesh_replication_applied_total").increment(1);
    counter!("blobmesh_replication_bytes_total").increment(bytes);
}

/// Record a local store write initiated by this node.
pub fn record_local_write(bytes: u64) {
    counter!("blobmesh_local_writes_total").increment(1);
    counter!("blobmesh_local_write_bytes_total").increment(bytes);
}

/// Set the current server lifecycle state (1 for the active state).
pub fn set_server_state(state: &str) {
    gauge!("blobmesh_server_state", "state" => state.to_string()).set(1.0);
}
