//! Candidate ranking and proposal legitimacy.
//!
//! Both checks are pure functions of their inputs so they can be exercised
//! exhaustively in isolation; the coordinator supplies the live state.

use std::collections::HashMap;
use std::net::SocketAddr;

use strand_cluster::{MemberInfo, NodeId, NodeState};
use tracing::debug;

use crate::messages::PrepareOk;

/// A node's log-completeness fingerprint.
///
/// Candidates are ordered lexicographically descending by `epoch_number`,
/// `last_commit_position`, `writer_checkpoint`, `chaser_checkpoint`,
/// `node_priority`, with `instance_id` as the deterministic tie-break: the
/// winner is the node that holds the most of the log, and the ordering is
/// total so every member ranks the same set identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderCandidate {
    pub instance_id: NodeId,
    pub external_endpoint: SocketAddr,
    pub epoch_number: i32,
    pub epoch_position: i64,
    pub epoch_id: NodeId,
    pub last_commit_position: i64,
    pub writer_checkpoint: i64,
    pub chaser_checkpoint: i64,
    pub node_priority: i32,
}

impl LeaderCandidate {
    /// Builds the fingerprint a gossip snapshot row advertises.
    pub fn from_member(member: &MemberInfo) -> Self {
        Self {
            instance_id: member.instance_id,
            external_endpoint: member.external_endpoint,
            epoch_number: member.epoch_number,
            epoch_position: member.epoch_position,
            epoch_id: member.epoch_id,
            last_commit_position: member.last_commit_position,
            writer_checkpoint: member.writer_checkpoint,
            chaser_checkpoint: member.chaser_checkpoint,
            node_priority: member.node_priority,
        }
    }

    fn ranking_key(&self) -> (i32, i64, i64, i64, i32, NodeId) {
        (
            self.epoch_number,
            self.last_commit_position,
            self.writer_checkpoint,
            self.chaser_checkpoint,
            self.node_priority,
            self.instance_id,
        )
    }
}

impl std::fmt::Display for LeaderCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] e{}@{} commit={} writer={} chaser={} priority={}",
            self.external_endpoint,
            self.instance_id,
            self.epoch_number,
            self.epoch_position,
            self.last_commit_position,
            self.writer_checkpoint,
            self.chaser_checkpoint,
            self.node_priority,
        )
    }
}

/// Picks the leader to propose from the fingerprints gathered in the
/// prepare phase.
///
/// A still-live previous leader that is not resigning is sticky: re-electing
/// it avoids a needless epoch bump and follower truncation. Otherwise the
/// best-ranked fingerprint wins. Returns `None` only when `prepare_oks` is
/// empty and no sticky leader applies.
pub fn best_leader_candidate(
    prepare_oks: &HashMap<NodeId, PrepareOk>,
    servers: &[MemberInfo],
    last_elected_leader: Option<NodeId>,
    resigning_leader: Option<NodeId>,
) -> Option<LeaderCandidate> {
    if let Some(previous) = last_elected_leader {
        if Some(previous) != resigning_leader {
            if let Some(ok) = prepare_oks.get(&previous) {
                return Some(ok.candidate());
            }
            if let Some(member) = servers
                .iter()
                .find(|m| m.is_alive && m.instance_id == previous && m.state == NodeState::Leader)
            {
                return Some(LeaderCandidate::from_member(member));
            }
        }
    }

    prepare_oks
        .values()
        .map(PrepareOk::candidate)
        .max_by_key(LeaderCandidate::ranking_key)
}

/// Whether `candidate` dominates `own` on the four log-completeness fields.
///
/// Priority and instance id deliberately do not participate: an acceptor
/// only refuses a proposal that would lose committed data, never one that
/// merely ranks below it on tie-breaks.
fn is_candidate_good_enough(candidate: &LeaderCandidate, own: &LeaderCandidate) -> bool {
    if candidate.epoch_number != own.epoch_number {
        return candidate.epoch_number > own.epoch_number;
    }
    if candidate.last_commit_position != own.last_commit_position {
        return candidate.last_commit_position > own.last_commit_position;
    }
    if candidate.writer_checkpoint != own.writer_checkpoint {
        return candidate.writer_checkpoint > own.writer_checkpoint;
    }
    if candidate.chaser_checkpoint != own.chaser_checkpoint {
        return candidate.chaser_checkpoint > own.chaser_checkpoint;
    }
    true
}

/// Acceptor-side validation of an incoming proposal.
///
/// A live, non-resigning previous leader trumps inferior candidates: while
/// it is visible, only itself, a higher epoch, or a forked epoch (same
/// number, different id, a split that must be healed by a new election)
/// may be accepted. Absent such a leader, a node always accepts itself,
/// and otherwise accepts any candidate at least as log-complete as it is.
pub fn is_legitimate_leader(
    view: i32,
    candidate: &LeaderCandidate,
    own: &LeaderCandidate,
    servers: &[MemberInfo],
    last_elected_leader: Option<NodeId>,
    resigning_leader: Option<NodeId>,
) -> bool {
    let previous = servers.iter().find(|m| {
        m.is_alive && Some(m.instance_id) == last_elected_leader && m.state == NodeState::Leader
    });

    if let Some(leader) = previous {
        if Some(leader.instance_id) != resigning_leader {
            if candidate.instance_id == leader.instance_id
                || candidate.epoch_number > leader.epoch_number
                || (candidate.epoch_number == leader.epoch_number
                    && candidate.epoch_id != leader.epoch_id)
            {
                return true;
            }
            debug!(
                "elections: (v={view}) proposal {candidate} not legitimate, \
                 previous leader is alive: {leader}"
            );
            return false;
        }
    }

    if candidate.instance_id == own.instance_id {
        return true;
    }

    if !is_candidate_good_enough(candidate, own) {
        debug!("elections: (v={view}) proposal {candidate} is not good enough for own {own}");
        return false;
    }

    true
}
