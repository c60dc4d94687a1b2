//! Shared test utilities for integration tests.
//!
//! Provides a `TestNode` wrapper that binds a server on an ephemeral
//! loopback port with a temp-dir store, plus polling helpers for
//! eventually-consistent assertions.

use blobmesh::{NodeConfig, ReplicationServer, ServerOpts};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A running mesh node with its temp store root kept alive.
pub struct TestNode {
    _dir: tempfile::TempDir,
    pub server: Arc<ReplicationServer>,
    pub addr: std::net::SocketAddr,
}

/// Start a node on 127.0.0.1:0 dialing the given bootstrap addresses.
pub async fn spawn_node(bootstrap: Vec<String>) -> TestNode {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = NodeConfig::for_testing(dir.path());
    config.bootstrap_peers = bootstrap;

    let server = Arc::new(ReplicationServer::new(ServerOpts::new(config)));
    server.start().await.expect("server start");
    let addr = server.local_addr().expect("bound address");

    TestNode {
        _dir: dir,
        server,
        addr,
    }
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(5);
    let poll = Duration::from_millis(20);

    let result = tokio::time::timeout(deadline, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(poll).await;
        }
    })
    .await;

    result.unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}

/// Wait until a node has at least `n` registered peers.
pub async fn wait_for_peers(node: &TestNode, n: usize) {
    let server = Arc::clone(&node.server);
    wait_until(&format!("{n} peers on {}", node.addr), move || {
        let server = Arc::clone(&server);
        async move { server.registry().len() >= n }
    })
    .await;
}

/// Wait until a node's store holds the key.
pub async fn wait_for_key(node: &TestNode, key: &str) {
    let server = Arc::clone(&node.server);
    let key = key.to_string();
    wait_until(&format!("key {key} on {}", node.addr), move || {
        let server = Arc::clone(&server);
        let key = key.clone();
        async move { server.store().has(&key).await.unwrap_or(false) }
    })
    .await;
}
