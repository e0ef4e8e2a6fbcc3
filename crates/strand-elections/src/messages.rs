//! Election message records.
//!
//! Three layers of message types:
//!
//! - the eight peer-to-peer record structs that cross the wire,
//! - [`PeerMessage`], the transport-facing enum over those records,
//! - [`ElectionMessage`], the bus-facing enum the coordinator dispatches
//!   on, which adds the node-local control messages (start, timeouts,
//!   gossip snapshots, shutdown, priority and resignation commands).
//!
//! Outbound results the coordinator publishes on the node bus are
//! [`ElectionEvent`]s.

use std::net::SocketAddr;

use strand_cluster::{ClusterInfo, MemberInfo, NodeId};

use crate::candidate::LeaderCandidate;

/// A member announces it wants to move the cluster to `attempted_view`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChange {
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub attempted_view: i32,
}

/// Periodic claim of the sender's installed view, so members that missed a
/// view change can catch up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChangeProof {
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub installed_view: i32,
}

/// The proposer of a view asks members for their log fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub view: i32,
}

/// A member's answer to `Prepare`: its full log-completeness fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareOk {
    pub view: i32,
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub epoch_number: i32,
    pub epoch_position: i64,
    pub epoch_id: NodeId,
    pub last_commit_position: i64,
    pub writer_checkpoint: i64,
    pub chaser_checkpoint: i64,
    pub node_priority: i32,
}

impl PrepareOk {
    /// The fingerprint this reply carries.
    pub fn candidate(&self) -> LeaderCandidate {
        LeaderCandidate {
            instance_id: self.server_id,
            external_endpoint: self.server_endpoint,
            epoch_number: self.epoch_number,
            epoch_position: self.epoch_position,
            epoch_id: self.epoch_id,
            last_commit_position: self.last_commit_position,
            writer_checkpoint: self.writer_checkpoint,
            chaser_checkpoint: self.chaser_checkpoint,
            node_priority: self.node_priority,
        }
    }
}

/// The proposer nominates `leader_id` for the installed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub leader_id: NodeId,
    pub leader_endpoint: SocketAddr,
    pub view: i32,
    pub epoch_number: i32,
    pub epoch_position: i64,
    pub epoch_id: NodeId,
    pub last_commit_position: i64,
    pub writer_checkpoint: i64,
    pub chaser_checkpoint: i64,
    pub node_priority: i32,
}

impl Proposal {
    /// The nominated candidate's fingerprint.
    pub fn candidate(&self) -> LeaderCandidate {
        LeaderCandidate {
            instance_id: self.leader_id,
            external_endpoint: self.leader_endpoint,
            epoch_number: self.epoch_number,
            epoch_position: self.epoch_position,
            epoch_id: self.epoch_id,
            last_commit_position: self.last_commit_position,
            writer_checkpoint: self.writer_checkpoint,
            chaser_checkpoint: self.chaser_checkpoint,
            node_priority: self.node_priority,
        }
    }
}

/// A member votes for `leader_id` in the installed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accept {
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
    pub leader_id: NodeId,
    pub leader_endpoint: SocketAddr,
    pub view: i32,
}

/// The current leader announces it is stepping down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderIsResigning {
    pub leader_id: NodeId,
    pub leader_endpoint: SocketAddr,
}

/// A member acknowledges the leader's resignation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderIsResigningOk {
    pub leader_id: NodeId,
    pub leader_endpoint: SocketAddr,
    pub server_id: NodeId,
    pub server_endpoint: SocketAddr,
}

/// The subset of election messages that crosses the wire.
///
/// Control messages never leave the node, so they have no wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    ViewChange(ViewChange),
    ViewChangeProof(ViewChangeProof),
    Prepare(Prepare),
    PrepareOk(PrepareOk),
    Proposal(Proposal),
    Accept(Accept),
    LeaderIsResigning(LeaderIsResigning),
    LeaderIsResigningOk(LeaderIsResigningOk),
}

/// Everything the coordinator can be handed on the node bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionMessage {
    // -- control --
    /// Kick off (or resume) elections on this node.
    StartElections,
    /// The progress timeout for `view` fired.
    ElectionsTimedOut { view: i32 },
    /// The periodic view-change-proof tick fired.
    SendViewChangeProof,
    /// The node is shutting down; all further messages are ignored.
    BecomeShuttingDown,
    /// Admin changed this node's election priority.
    SetNodePriority { priority: i32 },
    /// Admin asked the current leader to step down.
    ResignNode,
    /// The gossip layer pushed a fresh membership snapshot.
    GossipUpdated { cluster: ClusterInfo },

    // -- election protocol --
    ViewChange(ViewChange),
    ViewChangeProof(ViewChangeProof),
    Prepare(Prepare),
    PrepareOk(PrepareOk),
    Proposal(Proposal),
    Accept(Accept),

    // -- resignation handshake --
    LeaderIsResigning(LeaderIsResigning),
    LeaderIsResigningOk(LeaderIsResigningOk),
}

impl From<PeerMessage> for ElectionMessage {
    fn from(msg: PeerMessage) -> Self {
        match msg {
            PeerMessage::ViewChange(m) => ElectionMessage::ViewChange(m),
            PeerMessage::ViewChangeProof(m) => ElectionMessage::ViewChangeProof(m),
            PeerMessage::Prepare(m) => ElectionMessage::Prepare(m),
            PeerMessage::PrepareOk(m) => ElectionMessage::PrepareOk(m),
            PeerMessage::Proposal(m) => ElectionMessage::Proposal(m),
            PeerMessage::Accept(m) => ElectionMessage::Accept(m),
            PeerMessage::LeaderIsResigning(m) => ElectionMessage::LeaderIsResigning(m),
            PeerMessage::LeaderIsResigningOk(m) => ElectionMessage::LeaderIsResigningOk(m),
        }
    }
}

/// Results the coordinator publishes on the node bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEvent {
    /// A majority accepted `leader` in `view`. Emitted at most once per
    /// view on any given node.
    ElectionsDone { view: i32, leader: MemberInfo },
    /// The resigning leader collected a majority of acknowledgements; the
    /// node's shutdown path takes over from here.
    InitiateLeaderResignation,
    /// The node's election priority changed; gossip should advertise it.
    UpdateNodePriority { priority: i32 },
}
