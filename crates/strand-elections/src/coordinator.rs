//! The elections coordinator state machine.
//!
//! One coordinator runs per node, driven serially by the node bus through
//! [`ElectionsCoordinator::handle`]. It owns no threads and performs no
//! blocking I/O: sends, timer arms, and bus publishes all go through the
//! fire-and-forget ports. Messages the coordinator addresses to itself
//! (its own view change, prepare-ok, accept) are delivered by direct
//! recursion into `handle` before the matching broadcast goes out, so the
//! local vote is always counted first; recursion depth is bounded by the
//! number of protocol phases.
//!
//! Nothing here is persisted. A restarted node re-enters `Idle` with both
//! views at -1 and relearns the cluster's view from the periodic
//! view-change proofs.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use strand_cluster::{ClusterError, ClusterInfo, MemberInfo, NodeId, NodeInfo, NodeState};
use tracing::{debug, info};

use crate::candidate::{best_leader_candidate, is_legitimate_leader, LeaderCandidate};
use crate::messages::{
    Accept, ElectionEvent, ElectionMessage, LeaderIsResigning, LeaderIsResigningOk, PeerMessage,
    Prepare, PrepareOk, Proposal, ViewChange, ViewChangeProof,
};
use crate::ports::Ports;

/// How long a view may go without progress before rotating to the next.
pub const LEADER_ELECTION_PROGRESS_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often the installed view is re-broadcast to heal lagging members.
pub const SEND_VIEW_CHANGE_PROOF_INTERVAL: Duration = Duration::from_millis(5000);

/// Where the coordinator currently sits in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Nothing started yet; only `StartElections` is honored.
    Idle,
    /// Gathering view changes (and, as proposer, prepare-oks).
    ElectingLeader,
    /// Proposer that collected a prepare majority and sent its proposal.
    Leader,
    /// Non-proposer in an installed view, voting on proposals.
    Acceptor,
    /// Terminal; every message is ignored.
    Shutdown,
}

/// The election state machine for one node.
pub struct ElectionsCoordinator {
    node: NodeInfo,
    cluster_size: usize,
    ports: Ports,

    state: ElectionState,
    last_attempted_view: i32,
    last_installed_view: i32,
    vc_received: HashSet<NodeId>,
    prepare_ok_received: HashMap<NodeId, PrepareOk>,
    accepts_received: HashSet<NodeId>,
    resigning_ok_received: HashSet<NodeId>,
    leader_proposal: Option<LeaderCandidate>,
    leader: Option<NodeId>,
    last_elected_leader: Option<NodeId>,
    resigning_leader: Option<NodeId>,
    /// Latest gossip snapshot: live, non-manager members, sorted
    /// descending by external endpoint. Replaced wholesale on each
    /// `GossipUpdated`; ids already counted in the phase sets stay counted.
    servers: Vec<MemberInfo>,
    node_priority: i32,
}

impl ElectionsCoordinator {
    /// Creates the coordinator for `node` in a cluster of fixed size.
    ///
    /// The membership snapshot starts out containing only the local node,
    /// so a single-node cluster can elect itself before the first gossip
    /// push arrives.
    pub fn new(
        node: NodeInfo,
        cluster_size: u32,
        node_priority: i32,
        ports: Ports,
    ) -> Result<Self, ClusterError> {
        if cluster_size == 0 {
            return Err(ClusterError::InvalidClusterSize);
        }

        let mut own = MemberInfo::initial(
            node.instance_id,
            node.external_endpoint,
            node.is_read_only_replica,
        );
        own.node_priority = node_priority;

        Ok(Self {
            node,
            cluster_size: cluster_size as usize,
            ports,
            state: ElectionState::Idle,
            last_attempted_view: -1,
            last_installed_view: -1,
            vc_received: HashSet::new(),
            prepare_ok_received: HashMap::new(),
            accepts_received: HashSet::new(),
            resigning_ok_received: HashSet::new(),
            leader_proposal: None,
            leader: None,
            last_elected_leader: None,
            resigning_leader: None,
            servers: vec![own],
            node_priority,
        })
    }

    /// Current protocol state.
    pub fn state(&self) -> ElectionState {
        self.state
    }

    /// The view this node most recently tried to move the cluster to.
    pub fn last_attempted_view(&self) -> i32 {
        self.last_attempted_view
    }

    /// The view this node most recently installed.
    pub fn last_installed_view(&self) -> i32 {
        self.last_installed_view
    }

    /// The leader installed by the most recent completed election, if any.
    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    /// Dispatches one bus message. Must be called serially.
    pub fn handle(&mut self, message: ElectionMessage) {
        if self.state == ElectionState::Shutdown {
            return;
        }
        match message {
            ElectionMessage::StartElections => self.on_start_elections(),
            ElectionMessage::ElectionsTimedOut { view } => self.on_elections_timed_out(view),
            ElectionMessage::SendViewChangeProof => self.on_send_view_change_proof(),
            ElectionMessage::BecomeShuttingDown => {
                debug!("elections: shutting down");
                self.state = ElectionState::Shutdown;
            }
            ElectionMessage::SetNodePriority { priority } => self.on_set_node_priority(priority),
            ElectionMessage::ResignNode => self.on_resign_node(),
            ElectionMessage::GossipUpdated { cluster } => self.on_gossip_updated(cluster),
            ElectionMessage::ViewChange(m) => self.on_view_change(m),
            ElectionMessage::ViewChangeProof(m) => self.on_view_change_proof(m),
            ElectionMessage::Prepare(m) => self.on_prepare(m),
            ElectionMessage::PrepareOk(m) => self.on_prepare_ok(m),
            ElectionMessage::Proposal(m) => self.on_proposal(m),
            ElectionMessage::Accept(m) => self.on_accept(m),
            ElectionMessage::LeaderIsResigning(m) => self.on_leader_is_resigning(m),
            ElectionMessage::LeaderIsResigningOk(m) => self.on_leader_is_resigning_ok(m),
        }
    }

    // -- control --

    fn on_start_elections(&mut self) {
        // an attempt in flight already owns the timeout chain
        if self.state == ElectionState::ElectingLeader {
            return;
        }
        info!("elections: starting elections");
        self.shift_to_leader_election(self.last_attempted_view + 1);
        self.ports.timer.schedule(
            SEND_VIEW_CHANGE_PROOF_INTERVAL,
            ElectionMessage::SendViewChangeProof,
        );
    }

    fn on_elections_timed_out(&mut self, view: i32) {
        if view != self.last_attempted_view {
            return;
        }
        if self.leader.is_some() {
            return;
        }
        debug!(
            "elections: (v={view}) timed out (state={:?}), moving to next view",
            self.state
        );
        self.shift_to_leader_election(self.last_attempted_view + 1);
    }

    fn on_send_view_change_proof(&mut self) {
        if self.last_installed_view >= 0 {
            self.broadcast(PeerMessage::ViewChangeProof(ViewChangeProof {
                server_id: self.node.instance_id,
                server_endpoint: self.node.external_endpoint,
                installed_view: self.last_installed_view,
            }));
        }
        self.ports.timer.schedule(
            SEND_VIEW_CHANGE_PROOF_INTERVAL,
            ElectionMessage::SendViewChangeProof,
        );
    }

    fn on_set_node_priority(&mut self, priority: i32) {
        debug!("elections: setting node priority to {priority}");
        self.node_priority = priority;
        self.ports
            .publisher
            .publish(ElectionEvent::UpdateNodePriority { priority });
    }

    fn on_gossip_updated(&mut self, cluster: ClusterInfo) {
        let mut members: Vec<MemberInfo> = cluster
            .members
            .into_iter()
            .filter(|m| m.state != NodeState::Manager)
            .filter(|m| m.is_alive)
            .collect();
        members.sort_by(|a, b| b.external_endpoint.cmp(&a.external_endpoint));
        self.servers = members;
    }

    // -- view change phase --

    fn shift_to_leader_election(&mut self, view: i32) {
        debug!("elections: (v={view}) shift to leader election");
        self.state = ElectionState::ElectingLeader;
        self.vc_received.clear();
        self.prepare_ok_received.clear();
        self.accepts_received.clear();
        self.leader_proposal = None;
        self.leader = None;
        self.last_attempted_view = view;

        self.ports.timer.schedule(
            LEADER_ELECTION_PROGRESS_TIMEOUT,
            ElectionMessage::ElectionsTimedOut { view },
        );

        let vc = ViewChange {
            server_id: self.node.instance_id,
            server_endpoint: self.node.external_endpoint,
            attempted_view: view,
        };
        self.handle(ElectionMessage::ViewChange(vc.clone()));
        self.broadcast(PeerMessage::ViewChange(vc));
    }

    fn on_view_change(&mut self, m: ViewChange) {
        if self.state == ElectionState::Idle {
            return;
        }
        if m.attempted_view <= self.last_installed_view {
            return;
        }

        debug!(
            "elections: (v={}) view change from [{}, {}]",
            m.attempted_view, m.server_endpoint, m.server_id
        );

        if m.attempted_view > self.last_attempted_view {
            self.shift_to_leader_election(m.attempted_view);
        }

        // only votes for the current attempt count; a late view change for
        // a superseded view must not pad this attempt's quorum
        if m.attempted_view != self.last_attempted_view {
            return;
        }

        if self.vc_received.insert(m.server_id) && self.vc_received.len() == self.majority() {
            debug!(
                "elections: (v={}) majority of view changes",
                self.last_attempted_view
            );
            if self.is_proposer_of(self.last_attempted_view) {
                self.shift_to_prepare_phase();
            }
        }
    }

    fn on_view_change_proof(&mut self, m: ViewChangeProof) {
        if self.state == ElectionState::Idle {
            return;
        }
        if m.installed_view <= self.last_installed_view {
            return;
        }

        self.last_attempted_view = m.installed_view;
        self.ports.timer.schedule(
            LEADER_ELECTION_PROGRESS_TIMEOUT,
            ElectionMessage::ElectionsTimedOut {
                view: self.last_attempted_view,
            },
        );

        if self.is_proposer_of(self.last_attempted_view) {
            debug!(
                "elections: (v={}) view change proof from [{}, {}], proposing",
                m.installed_view, m.server_endpoint, m.server_id
            );
            self.shift_to_prepare_phase();
        } else {
            debug!(
                "elections: (v={}) view change proof from [{}, {}], accepting",
                m.installed_view, m.server_endpoint, m.server_id
            );
            self.shift_to_acceptor();
        }
    }

    // -- prepare phase --

    fn shift_to_prepare_phase(&mut self) {
        debug!(
            "elections: (v={}) shift to prepare phase",
            self.last_attempted_view
        );
        self.last_installed_view = self.last_attempted_view;
        self.prepare_ok_received.clear();

        let own = self.create_prepare_ok(self.last_installed_view);
        self.handle(ElectionMessage::PrepareOk(own));
        self.broadcast(PeerMessage::Prepare(Prepare {
            server_id: self.node.instance_id,
            server_endpoint: self.node.external_endpoint,
            view: self.last_installed_view,
        }));
    }

    fn on_prepare(&mut self, m: Prepare) {
        if self.state == ElectionState::Idle {
            return;
        }
        if m.server_id == self.node.instance_id {
            return;
        }
        if m.view != self.last_attempted_view {
            return;
        }
        if !self.knows_server(m.server_id) {
            return;
        }

        debug!(
            "elections: (v={}) prepare from [{}, {}]",
            m.view, m.server_endpoint, m.server_id
        );

        if self.state == ElectionState::ElectingLeader {
            self.shift_to_acceptor();
        }

        if self.node.is_read_only_replica {
            info!(
                "elections: (v={}) not sending prepare_ok, this node is a read-only replica",
                m.view
            );
            return;
        }

        let reply = self.create_prepare_ok(m.view);
        self.send_to(m.server_endpoint, PeerMessage::PrepareOk(reply));
    }

    fn on_prepare_ok(&mut self, m: PrepareOk) {
        if self.state != ElectionState::ElectingLeader {
            return;
        }
        if m.view != self.last_attempted_view {
            return;
        }

        debug!(
            "elections: (v={}) prepare_ok from [{}, {}]",
            m.view, m.server_endpoint, m.server_id
        );

        if let Entry::Vacant(e) = self.prepare_ok_received.entry(m.server_id) {
            e.insert(m);
            if self.prepare_ok_received.len() == self.majority() {
                self.shift_to_leader();
            }
        }
    }

    fn shift_to_acceptor(&mut self) {
        debug!(
            "elections: (v={}) shift to acceptor",
            self.last_attempted_view
        );
        self.state = ElectionState::Acceptor;
        self.last_installed_view = self.last_attempted_view;
    }

    // -- propose / accept phase --

    fn shift_to_leader(&mut self) {
        debug!(
            "elections: (v={}) shift to leader",
            self.last_attempted_view
        );
        self.state = ElectionState::Leader;
        self.send_proposal();
    }

    fn send_proposal(&mut self) {
        self.accepts_received.clear();

        let Some(candidate) = best_leader_candidate(
            &self.prepare_ok_received,
            &self.servers,
            self.last_elected_leader,
            self.resigning_leader,
        ) else {
            debug!(
                "elections: (v={}) no leader candidate to propose",
                self.last_attempted_view
            );
            return;
        };

        debug!(
            "elections: (v={}) proposing candidate {candidate}",
            self.last_attempted_view
        );
        self.leader_proposal = Some(candidate.clone());

        let accept = Accept {
            server_id: self.node.instance_id,
            server_endpoint: self.node.external_endpoint,
            leader_id: candidate.instance_id,
            leader_endpoint: candidate.external_endpoint,
            view: self.last_installed_view,
        };
        let proposal = Proposal {
            server_id: self.node.instance_id,
            server_endpoint: self.node.external_endpoint,
            leader_id: candidate.instance_id,
            leader_endpoint: candidate.external_endpoint,
            view: self.last_installed_view,
            epoch_number: candidate.epoch_number,
            epoch_position: candidate.epoch_position,
            epoch_id: candidate.epoch_id,
            last_commit_position: candidate.last_commit_position,
            writer_checkpoint: candidate.writer_checkpoint,
            chaser_checkpoint: candidate.chaser_checkpoint,
            node_priority: candidate.node_priority,
        };

        self.handle(ElectionMessage::Accept(accept));
        self.broadcast(PeerMessage::Proposal(proposal));
    }

    fn on_proposal(&mut self, m: Proposal) {
        if self.state != ElectionState::Acceptor {
            return;
        }
        if m.server_id == self.node.instance_id {
            return;
        }
        if m.view != self.last_installed_view {
            return;
        }
        if !self.knows_server(m.server_id) || !self.knows_server(m.leader_id) {
            return;
        }

        let candidate = m.candidate();
        let own = self.own_candidate();
        if !is_legitimate_leader(
            m.view,
            &candidate,
            &own,
            &self.servers,
            self.last_elected_leader,
            self.resigning_leader,
        ) {
            return;
        }

        debug!(
            "elections: (v={}) proposal from [{}, {}], candidate {candidate}",
            m.view, m.server_endpoint, m.server_id
        );

        if self.leader_proposal.is_none() {
            self.leader_proposal = Some(candidate);
            self.accepts_received.clear();
        }

        if self.leader_proposal.as_ref().map(|p| p.instance_id) == Some(m.leader_id) {
            // the proposer votes for its own proposal but never hears our
            // broadcast echoed back, so record its vote on its behalf too;
            // the set keyed by server id makes the duplicate harmless
            self.handle(ElectionMessage::Accept(Accept {
                server_id: m.server_id,
                server_endpoint: m.server_endpoint,
                leader_id: m.leader_id,
                leader_endpoint: m.leader_endpoint,
                view: m.view,
            }));
            let own_accept = Accept {
                server_id: self.node.instance_id,
                server_endpoint: self.node.external_endpoint,
                leader_id: m.leader_id,
                leader_endpoint: m.leader_endpoint,
                view: m.view,
            };
            self.handle(ElectionMessage::Accept(own_accept.clone()));
            self.broadcast(PeerMessage::Accept(own_accept));
        }
    }

    fn on_accept(&mut self, m: Accept) {
        if self.state == ElectionState::Idle {
            return;
        }
        if m.view != self.last_installed_view {
            return;
        }
        let proposed = match &self.leader_proposal {
            Some(p) if p.instance_id == m.leader_id => p.instance_id,
            _ => return,
        };

        debug!(
            "elections: (v={}) accept from [{}, {}] for {}",
            m.view, m.server_endpoint, m.server_id, m.leader_id
        );

        if self.accepts_received.insert(m.server_id)
            && self.accepts_received.len() == self.majority()
        {
            let Some(member) = self
                .servers
                .iter()
                .find(|s| s.instance_id == proposed)
                .cloned()
            else {
                debug!(
                    "elections: (v={}) elected {} is no longer a member, dropping result",
                    m.view, proposed
                );
                return;
            };

            self.leader = Some(proposed);
            self.last_elected_leader = Some(proposed);
            self.resigning_leader = None;
            info!("elections: (v={}) done, elected leader = {member}", m.view);
            self.ports.publisher.publish(ElectionEvent::ElectionsDone {
                view: m.view,
                leader: member,
            });
        }
    }

    // -- resignation handshake --

    fn on_resign_node(&mut self) {
        if self.leader != Some(self.node.instance_id) {
            info!("elections: resignation requested but this node is not the leader, ignoring");
            return;
        }

        info!("elections: leader is resigning");
        self.resigning_leader = Some(self.node.instance_id);
        self.resigning_ok_received.clear();

        self.handle(ElectionMessage::LeaderIsResigningOk(LeaderIsResigningOk {
            leader_id: self.node.instance_id,
            leader_endpoint: self.node.external_endpoint,
            server_id: self.node.instance_id,
            server_endpoint: self.node.external_endpoint,
        }));
        self.broadcast(PeerMessage::LeaderIsResigning(LeaderIsResigning {
            leader_id: self.node.instance_id,
            leader_endpoint: self.node.external_endpoint,
        }));
    }

    fn on_leader_is_resigning(&mut self, m: LeaderIsResigning) {
        if self.node.is_read_only_replica {
            info!(
                "elections: read-only replica does not vote, not acknowledging resignation of [{}, {}]",
                m.leader_endpoint, m.leader_id
            );
            return;
        }

        info!(
            "elections: leader [{}, {}] is resigning",
            m.leader_endpoint, m.leader_id
        );
        self.resigning_leader = Some(m.leader_id);
        self.send_to(
            m.leader_endpoint,
            PeerMessage::LeaderIsResigningOk(LeaderIsResigningOk {
                leader_id: m.leader_id,
                leader_endpoint: m.leader_endpoint,
                server_id: self.node.instance_id,
                server_endpoint: self.node.external_endpoint,
            }),
        );
    }

    fn on_leader_is_resigning_ok(&mut self, m: LeaderIsResigningOk) {
        debug!(
            "elections: resignation ack from [{}, {}]",
            m.server_endpoint, m.server_id
        );
        if self.resigning_ok_received.insert(m.server_id)
            && self.resigning_ok_received.len() == self.majority()
        {
            info!(
                "elections: majority acknowledged resignation of [{}, {}], initiating",
                m.leader_endpoint, m.leader_id
            );
            self.ports
                .publisher
                .publish(ElectionEvent::InitiateLeaderResignation);
        }
    }

    // -- helpers --

    fn majority(&self) -> usize {
        self.cluster_size / 2 + 1
    }

    fn knows_server(&self, id: NodeId) -> bool {
        self.servers.iter().any(|m| m.instance_id == id)
    }

    /// Whether this node proposes for `view`: the proposer rotates
    /// round-robin over the leader-eligible members in snapshot order.
    fn is_proposer_of(&self, view: i32) -> bool {
        let eligible: Vec<&MemberInfo> = self
            .servers
            .iter()
            .filter(|m| !m.is_read_only_replica)
            .collect();
        if eligible.is_empty() {
            return false;
        }
        let index = view.rem_euclid(eligible.len() as i32) as usize;
        eligible[index].instance_id == self.node.instance_id
    }

    fn own_candidate(&self) -> LeaderCandidate {
        let epoch = self.ports.epochs.last_epoch();
        LeaderCandidate {
            instance_id: self.node.instance_id,
            external_endpoint: self.node.external_endpoint,
            epoch_number: epoch.map_or(-1, |e| e.number),
            epoch_position: epoch.map_or(-1, |e| e.position),
            epoch_id: epoch.map_or(NodeId::zero(), |e| e.id),
            last_commit_position: self.ports.checkpoints.last_commit_position(),
            writer_checkpoint: self.ports.checkpoints.writer_checkpoint(),
            chaser_checkpoint: self.ports.checkpoints.chaser_checkpoint(),
            node_priority: self.node_priority,
        }
    }

    fn create_prepare_ok(&self, view: i32) -> PrepareOk {
        let own = self.own_candidate();
        PrepareOk {
            view,
            server_id: own.instance_id,
            server_endpoint: own.external_endpoint,
            epoch_number: own.epoch_number,
            epoch_position: own.epoch_position,
            epoch_id: own.epoch_id,
            last_commit_position: own.last_commit_position,
            writer_checkpoint: own.writer_checkpoint,
            chaser_checkpoint: own.chaser_checkpoint,
            node_priority: own.node_priority,
        }
    }

    fn send_to(&self, target: SocketAddr, message: PeerMessage) {
        let deadline = self.ports.clock.now() + LEADER_ELECTION_PROGRESS_TIMEOUT;
        self.ports.transport.send(target, message, deadline);
    }

    fn broadcast(&self, message: PeerMessage) {
        let deadline = self.ports.clock.now() + LEADER_ELECTION_PROGRESS_TIMEOUT;
        for member in &self.servers {
            if member.instance_id == self.node.instance_id {
                continue;
            }
            self.ports
                .transport
                .send(member.external_endpoint, message.clone(), deadline);
        }
    }
}
