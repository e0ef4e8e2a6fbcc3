//! strand-elections: leader election for the strand event store.
//!
//! Exactly one member of a strand cluster may own the write path at a time.
//! This crate elects that member: a rotating-proposer, majority-vote
//! protocol that ranks candidates by how complete their copy of the log is,
//! so a failover never installs a leader that would truncate committed data.
//!
//! # Protocol
//!
//! Each election attempt is a *view*, a monotonically increasing integer
//! whose proposer is chosen round-robin over the leader-eligible members:
//!
//! 1. **View change**: every member broadcasts `ViewChange(view)`.
//! 2. **Prepare**: the proposer collects a majority of view changes,
//!    installs the view and broadcasts `Prepare`.
//! 3. **Prepare-ok**: members answer with their log-completeness
//!    fingerprint; the proposer picks the best candidate from a majority.
//! 4. **Accept**: acceptors validate the proposal and broadcast `Accept`;
//!    a majority of accepts elects the candidate and `ElectionsDone` is
//!    published.
//!
//! A one-second progress timeout rotates to the next view when a phase
//! stalls, and a five-second `ViewChangeProof` broadcast heals members that
//! missed a view change. The coordinator is single-threaded and owns no
//! sockets or timers: all effects go through the ports in [`ports`].
//!
//! Election state is deliberately not persisted. A restarted node rejoins
//! at view -1 and catches up through the proof broadcasts; safety rests on
//! majority intersection over live membership, not on any local durable
//! record.

mod candidate;
mod coordinator;
mod messages;
mod ports;
mod wire;

pub use candidate::{best_leader_candidate, is_legitimate_leader, LeaderCandidate};
pub use coordinator::{
    ElectionState, ElectionsCoordinator, LEADER_ELECTION_PROGRESS_TIMEOUT,
    SEND_VIEW_CHANGE_PROOF_INTERVAL,
};
pub use messages::{
    Accept, ElectionEvent, ElectionMessage, LeaderIsResigning, LeaderIsResigningOk, PeerMessage,
    Prepare, PrepareOk, Proposal, ViewChange, ViewChangeProof,
};
pub use ports::{CheckpointSource, Clock, EpochSource, Ports, Publisher, TimerPort, TransportPort};
