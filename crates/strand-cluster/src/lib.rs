//! strand-cluster: value types shared across a strand node.
//!
//! A strand cluster is a fixed set of replicas of one event log. This crate
//! defines the identities and snapshots the node-level subsystems exchange:
//!
//! - **Node identity**: `NodeId`, `NodeInfo`, the replica lifecycle states
//! - **Log generation**: `Epoch`
//! - **Membership**: `MemberInfo` rows as reported by the gossip layer,
//!   bundled into `ClusterInfo` snapshots
//!
//! The types here are plain data: no I/O, no protocol logic. The election
//! protocol that consumes them lives in `strand-elections`.

mod error;
mod member;
mod node;

pub use error::ClusterError;
pub use member::{ClusterInfo, MemberInfo};
pub use node::{Epoch, NodeId, NodeInfo, NodeState};
