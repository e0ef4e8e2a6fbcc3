//! Node configuration parsing.

use std::net::SocketAddr;

use clap::Parser;
use strand_cluster::{ClusterError, NodeId};

/// A configured peer: its node id and election endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub id: NodeId,
    pub endpoint: SocketAddr,
}

/// Parses a seed entry of the form `uuid@host:port`.
pub fn parse_seed(input: &str) -> Result<Seed, ClusterError> {
    let (id_str, addr_str) = input
        .split_once('@')
        .ok_or_else(|| ClusterError::InvalidSeed(input.into()))?;
    let id = NodeId::parse(id_str).map_err(|_| ClusterError::InvalidSeed(input.into()))?;
    let endpoint = addr_str
        .parse()
        .map_err(|_| ClusterError::InvalidSeed(input.into()))?;
    Ok(Seed { id, endpoint })
}

/// One member of a strand cluster's election plane.
#[derive(Parser, Debug)]
#[command(name = "strand-node", version, about)]
pub struct Args {
    /// Address to bind for election traffic.
    #[arg(long, default_value = "127.0.0.1:2113")]
    pub bind: SocketAddr,

    /// Address advertised to peers. Defaults to the bind address.
    #[arg(long)]
    pub advertise: Option<SocketAddr>,

    /// This node's id. Random when not given; peers must list the same
    /// id in their seed entries for this node.
    #[arg(long, value_parser = NodeId::parse)]
    pub node_id: Option<NodeId>,

    /// Total number of members in the cluster (fixed; quorum is computed
    /// from this, not from the number of reachable peers).
    #[arg(long, default_value_t = 1)]
    pub cluster_size: u32,

    /// Peer entry as uuid@host:port. Repeat once per peer.
    #[arg(long = "seed", value_parser = parse_seed)]
    pub seeds: Vec<Seed>,

    /// Election priority of this node; higher wins ranking ties.
    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    /// Run as a read-only replica (follows the log, never leader-eligible).
    #[arg(long)]
    pub read_only: bool,
}
