//! Mesh node binary.
//!
//! Binds a listener, dials the bootstrap set, and replicates until ctrl-c.

use blobmesh::{NodeConfig, ReplicationServer, ServerOpts};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blobmesh", about = "Content-addressable blob store with mesh replication")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:4000")]
    listen_addr: String,

    /// Root directory for stored blobs.
    #[arg(long, default_value = "blobmesh_data")]
    store_root: PathBuf,

    /// Bootstrap peer addresses to dial at startup. Repeatable.
    #[arg(long = "peer")]
    bootstrap_peers: Vec<String>,
}

#[tokio::main]
async fn main() -> blobmesh::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = NodeConfig {
        listen_addr: args.listen_addr,
        store_root: args.store_root,
        bootstrap_peers: args.bootstrap_peers,
        ..Default::default()
    };

    let server = ReplicationServer::new(ServerOpts::new(config));
    server.start().await?;

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");

    server.stop().await?;
    Ok(())
}
