//! The running node: wires the coordinator to tokio.
//!
//! One task owns the coordinator and drains a single mpsc bus, so every
//! `handle` call is serialized exactly as the coordinator requires. Timer
//! fires, received frames, and control messages all arrive through that
//! one channel; election results leave through a separate event channel.

use std::sync::Arc;
use std::time::Duration;

use strand_cluster::{ClusterInfo, MemberInfo, NodeId, NodeInfo};
use strand_elections::{
    Clock, ElectionEvent, ElectionMessage, ElectionsCoordinator, Ports, Publisher, TimerPort,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Args;
use crate::stores::{CheckpointStore, EpochStore};
use crate::transport::{self, UdpTransport};

/// Forwards election results onto the node's event channel.
struct BusPublisher {
    tx: mpsc::UnboundedSender<ElectionEvent>,
}

impl Publisher for BusPublisher {
    fn publish(&self, event: ElectionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Delivers scheduled messages back into the bus after a delay.
struct TokioTimer {
    tx: mpsc::UnboundedSender<ElectionMessage>,
}

impl TimerPort for TokioTimer {
    fn schedule(&self, delay: Duration, message: ElectionMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        });
    }
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

/// Membership snapshot built from the configured seed list.
///
/// Stands in for the gossip layer: every configured peer is presumed
/// alive. A production deployment feeds `GossipUpdated` from a real
/// membership service instead.
fn static_membership(node: &NodeInfo, args: &Args) -> ClusterInfo {
    let mut own = MemberInfo::initial(
        node.instance_id,
        node.external_endpoint,
        node.is_read_only_replica,
    );
    own.node_priority = args.priority;

    let mut members = vec![own];
    for seed in &args.seeds {
        if seed.id == node.instance_id {
            continue;
        }
        members.push(MemberInfo::initial(seed.id, seed.endpoint, false));
    }
    ClusterInfo::new(members)
}

/// Runs the election plane until shutdown.
pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let instance_id = args.node_id.unwrap_or_else(NodeId::new);
    let advertise = args.advertise.unwrap_or(args.bind);
    let mut node = NodeInfo::new(instance_id, advertise, args.read_only);
    node.internal_endpoint = args.bind;

    let socket = Arc::new(UdpSocket::bind(node.internal_endpoint).await?);
    info!(
        "node {instance_id} listening on {} (advertising {})",
        node.internal_endpoint, node.external_endpoint
    );

    let (bus_tx, mut bus_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let ports = Ports {
        publisher: Arc::new(BusPublisher { tx: event_tx }),
        timer: Arc::new(TokioTimer {
            tx: bus_tx.clone(),
        }),
        transport: Arc::new(UdpTransport::new(socket.clone())),
        clock: Arc::new(SystemClock),
        epochs: Arc::new(EpochStore::new()),
        checkpoints: Arc::new(CheckpointStore::new()),
    };

    let mut coordinator =
        ElectionsCoordinator::new(node.clone(), args.cluster_size, args.priority, ports)?;
    coordinator.handle(ElectionMessage::GossipUpdated {
        cluster: static_membership(&node, &args),
    });

    tokio::spawn(transport::recv_loop(socket, bus_tx.clone()));

    bus_tx.send(ElectionMessage::StartElections)?;

    let mut resign_requested = false;
    loop {
        tokio::select! {
            Some(message) = bus_rx.recv() => coordinator.handle(message),
            Some(event) = event_rx.recv() => match event {
                ElectionEvent::ElectionsDone { view, leader } => {
                    info!("view {view} elected leader {leader}");
                }
                ElectionEvent::InitiateLeaderResignation => {
                    info!("resignation acknowledged by a majority, shutting down");
                    coordinator.handle(ElectionMessage::BecomeShuttingDown);
                    break;
                }
                ElectionEvent::UpdateNodePriority { priority } => {
                    info!("node priority is now {priority}");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if !resign_requested && coordinator.leader() == Some(instance_id) {
                    // step down cleanly first; the second interrupt (or the
                    // majority ack) finishes the shutdown
                    resign_requested = true;
                    info!("interrupt received, resigning leadership");
                    coordinator.handle(ElectionMessage::ResignNode);
                } else {
                    info!("interrupt received, shutting down");
                    coordinator.handle(ElectionMessage::BecomeShuttingDown);
                    break;
                }
            }
        }
    }

    Ok(())
}
