//! Node identity and log-generation types.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a cluster node.
///
/// Wraps a UUID for guaranteed uniqueness across the cluster. The derived
/// ordering compares the canonical 16-byte big-endian form, so it is stable
/// across platforms; elections rely on that as the final candidate
/// tie-break.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generates a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero node ID, used where no epoch identity exists yet.
    pub const fn zero() -> Self {
        Self(Uuid::nil())
    }

    /// Creates a node ID from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the canonical 16-byte big-endian form.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Reconstructs a node ID from its canonical 16-byte form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability (similar to git short hashes)
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Lifecycle state of a replica, as reported through gossip.
///
/// The election core only inspects `Leader` (sticky-leader and legitimacy
/// checks) and `Manager` (excluded from membership snapshots); the remaining
/// states round-trip so other subsystems can read them off the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Initializing,
    DiscoverLeader,
    Unknown,
    PreReplica,
    CatchingUp,
    Clone,
    Follower,
    PreLeader,
    Leader,
    Manager,
    ShuttingDown,
    Shutdown,
    ReadOnlyReplica,
    ResigningLeader,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Initializing => "initializing",
            NodeState::DiscoverLeader => "discover-leader",
            NodeState::Unknown => "unknown",
            NodeState::PreReplica => "pre-replica",
            NodeState::CatchingUp => "catching-up",
            NodeState::Clone => "clone",
            NodeState::Follower => "follower",
            NodeState::PreLeader => "pre-leader",
            NodeState::Leader => "leader",
            NodeState::Manager => "manager",
            NodeState::ShuttingDown => "shutting-down",
            NodeState::Shutdown => "shutdown",
            NodeState::ReadOnlyReplica => "read-only-replica",
            NodeState::ResigningLeader => "resigning-leader",
        };
        write!(f, "{name}")
    }
}

/// One generation of the event log.
///
/// A new epoch begins each time a leader takes over the write path. Higher
/// epoch numbers strictly dominate when comparing log completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    /// Monotonically increasing generation counter.
    pub number: i32,
    /// Log position at which this epoch starts.
    pub position: i64,
    /// Identity of the epoch record, used to detect forked generations
    /// that share a number.
    pub id: NodeId,
}

/// Immutable identity of the local node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub instance_id: NodeId,
    /// Address advertised to peers; election traffic is addressed here.
    pub external_endpoint: SocketAddr,
    /// Address the node binds locally (may differ behind NAT).
    pub internal_endpoint: SocketAddr,
    /// Read-only replicas follow the log but are never leader-eligible.
    pub is_read_only_replica: bool,
}

impl NodeInfo {
    /// Creates a node identity advertising and binding the same address.
    pub fn new(instance_id: NodeId, endpoint: SocketAddr, is_read_only_replica: bool) -> Self {
        Self {
            instance_id,
            external_endpoint: endpoint,
            internal_endpoint: endpoint,
            is_read_only_replica,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_is_short() {
        let id = NodeId::new();
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn node_id_parse_roundtrip() {
        let id = NodeId::new();
        let parsed = NodeId::parse(&id.0.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_zero_is_nil() {
        assert_eq!(NodeId::zero().as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn node_id_ordering_matches_byte_order() {
        let low = NodeId::from_bytes([
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01,
        ]);
        let high = NodeId::from_bytes([
            0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ]);
        // the leading byte dominates, regardless of host endianness
        assert!(high > low);
    }

    #[test]
    fn node_id_bytes_roundtrip() {
        let id = NodeId::new();
        assert_eq!(NodeId::from_bytes(*id.as_bytes()), id);
    }
}
