//! strand-node: runs one member of a strand cluster's election plane.
//!
//! Binds a UDP socket for election traffic, builds the coordinator from
//! CLI configuration, and drives it from a single-threaded message bus
//! until shutdown.

mod config;
mod node;
mod stores;
mod transport;

use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand=info".into()),
        )
        .init();

    let args = config::Args::parse();
    if let Err(e) = node::run(args).await {
        error!("node failed: {e}");
        std::process::exit(1);
    }
}
