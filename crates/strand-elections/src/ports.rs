//! Collaborator ports.
//!
//! The coordinator owns no sockets, timers, or stores: every effect goes
//! through one of these traits, and every implementation must be
//! fire-and-forget (enqueue or send, return immediately, and never call
//! back into the coordinator on the same stack). The node crate provides
//! the production implementations; tests substitute recording fakes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strand_cluster::Epoch;

use crate::messages::{ElectionEvent, ElectionMessage, PeerMessage};

/// The full set of collaborators the coordinator is wired to.
#[derive(Clone)]
pub struct Ports {
    pub publisher: Arc<dyn Publisher>,
    pub timer: Arc<dyn TimerPort>,
    pub transport: Arc<dyn TransportPort>,
    pub clock: Arc<dyn Clock>,
    pub epochs: Arc<dyn EpochSource>,
    pub checkpoints: Arc<dyn CheckpointSource>,
}

/// Publishes election results onto the node's local bus.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: ElectionEvent);
}

/// Schedules a message to be delivered back to the coordinator after a
/// delay. Late deliveries are fine; the coordinator drops stale ones.
pub trait TimerPort: Send + Sync {
    fn schedule(&self, delay: Duration, message: ElectionMessage);
}

/// Unicast delivery to a peer. No ordering or delivery guarantees; the
/// transport may drop messages that cannot be delivered by `deadline`.
pub trait TransportPort: Send + Sync {
    fn send(&self, target: SocketAddr, message: PeerMessage, deadline: Instant);
}

/// Time source, used only to stamp transport delivery deadlines.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Read-only access to the last recorded epoch of the local log.
pub trait EpochSource: Send + Sync {
    fn last_epoch(&self) -> Option<Epoch>;
}

/// Read-only access to the local log positions. Implementations must
/// return promptly; these are read on every prepare reply.
pub trait CheckpointSource: Send + Sync {
    fn writer_checkpoint(&self) -> i64;
    fn chaser_checkpoint(&self) -> i64;
    fn last_commit_position(&self) -> i64;
}
