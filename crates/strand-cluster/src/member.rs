//! Membership snapshots as reported by the gossip layer.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeState};

/// Gossip's view of one cluster member.
///
/// Carries the member's identity and health alongside its log-completeness
/// fields. The log fields use `-1` / the zero id when the member has not yet
/// written an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub instance_id: NodeId,
    pub external_endpoint: SocketAddr,
    pub state: NodeState,
    pub is_alive: bool,
    pub is_read_only_replica: bool,
    pub epoch_number: i32,
    pub epoch_position: i64,
    pub epoch_id: NodeId,
    pub last_commit_position: i64,
    pub writer_checkpoint: i64,
    pub chaser_checkpoint: i64,
    pub node_priority: i32,
}

impl MemberInfo {
    /// Creates the snapshot row for a node that has not written anything yet.
    pub fn initial(instance_id: NodeId, endpoint: SocketAddr, is_read_only_replica: bool) -> Self {
        Self {
            instance_id,
            external_endpoint: endpoint,
            state: NodeState::Initializing,
            is_alive: true,
            is_read_only_replica,
            epoch_number: -1,
            epoch_position: -1,
            epoch_id: NodeId::zero(),
            last_commit_position: -1,
            writer_checkpoint: -1,
            chaser_checkpoint: -1,
            node_priority: 0,
        }
    }
}

impl std::fmt::Display for MemberInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] {} e{}@{} commit={}",
            self.external_endpoint,
            self.instance_id,
            self.state,
            self.epoch_number,
            self.epoch_position,
            self.last_commit_position,
        )
    }
}

/// A full membership snapshot, pushed by the gossip layer on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub members: Vec<MemberInfo>,
}

impl ClusterInfo {
    pub fn new(members: Vec<MemberInfo>) -> Self {
        Self { members }
    }
}
