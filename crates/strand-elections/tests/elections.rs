//! Multi-node election scenarios over an in-memory cluster.
//!
//! Each coordinator's ports record into shared vectors; the harness routes
//! recorded unicasts between coordinators by endpoint, delivering
//! immediately and deterministically. Timers never fire on their own;
//! tests drain the scheduled messages and fire the ones the scenario
//! calls for, so "a timeout elapses" is an explicit step.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use strand_cluster::{ClusterInfo, Epoch, MemberInfo, NodeId, NodeInfo, NodeState};
use strand_elections::{
    Accept, CheckpointSource, Clock, ElectionEvent, ElectionMessage, ElectionState,
    ElectionsCoordinator, EpochSource, PeerMessage, Ports, Prepare, Proposal, Publisher,
    TimerPort, TransportPort, ViewChange,
};

/// Records every port interaction of one coordinator.
#[derive(Default)]
struct Recording {
    sent: Mutex<Vec<(SocketAddr, PeerMessage)>>,
    scheduled: Mutex<Vec<(Duration, ElectionMessage)>>,
    events: Mutex<Vec<ElectionEvent>>,
    epoch: Mutex<Option<Epoch>>,
    writer: AtomicI64,
    chaser: AtomicI64,
    commit: AtomicI64,
}

impl Publisher for Recording {
    fn publish(&self, event: ElectionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TimerPort for Recording {
    fn schedule(&self, delay: Duration, message: ElectionMessage) {
        self.scheduled.lock().unwrap().push((delay, message));
    }
}

impl TransportPort for Recording {
    fn send(&self, target: SocketAddr, message: PeerMessage, _deadline: Instant) {
        self.sent.lock().unwrap().push((target, message));
    }
}

impl Clock for Recording {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl EpochSource for Recording {
    fn last_epoch(&self) -> Option<Epoch> {
        *self.epoch.lock().unwrap()
    }
}

impl CheckpointSource for Recording {
    fn writer_checkpoint(&self) -> i64 {
        self.writer.load(Ordering::Relaxed)
    }
    fn chaser_checkpoint(&self) -> i64 {
        self.chaser.load(Ordering::Relaxed)
    }
    fn last_commit_position(&self) -> i64 {
        self.commit.load(Ordering::Relaxed)
    }
}

struct TestNode {
    id: NodeId,
    endpoint: SocketAddr,
    coordinator: ElectionsCoordinator,
    rec: Arc<Recording>,
}

struct Cluster {
    nodes: Vec<TestNode>,
    /// Indexes whose traffic is dropped in both directions.
    partitioned: HashSet<usize>,
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(127, 0, 0, 1), port))
}

fn id(tag: u8) -> NodeId {
    NodeId::from_bytes([tag; 16])
}

impl Cluster {
    /// Builds a cluster from `(id_tag, port)` pairs; higher ports sort
    /// first in the membership snapshot, so they propose earlier views.
    fn new(members: &[(u8, u16)]) -> Self {
        let nodes = members
            .iter()
            .map(|&(tag, port)| {
                let rec = Arc::new(Recording::default());
                let ports = Ports {
                    publisher: rec.clone(),
                    timer: rec.clone(),
                    transport: rec.clone(),
                    clock: rec.clone(),
                    epochs: rec.clone(),
                    checkpoints: rec.clone(),
                };
                let node = NodeInfo::new(id(tag), addr(port), false);
                let coordinator =
                    ElectionsCoordinator::new(node, members.len() as u32, 0, ports).unwrap();
                TestNode {
                    id: id(tag),
                    endpoint: addr(port),
                    coordinator,
                    rec,
                }
            })
            .collect();
        let mut cluster = Self {
            nodes,
            partitioned: HashSet::new(),
        };
        let snapshot = cluster.default_snapshot();
        cluster.push_gossip(snapshot);
        cluster
    }

    fn default_snapshot(&self) -> Vec<MemberInfo> {
        self.nodes
            .iter()
            .map(|n| MemberInfo::initial(n.id, n.endpoint, false))
            .collect()
    }

    fn push_gossip(&mut self, members: Vec<MemberInfo>) {
        for node in &mut self.nodes {
            node.coordinator.handle(ElectionMessage::GossipUpdated {
                cluster: ClusterInfo::new(members.clone()),
            });
        }
    }

    fn handle(&mut self, i: usize, message: ElectionMessage) {
        self.nodes[i].coordinator.handle(message);
    }

    fn index_of(&self, endpoint: SocketAddr) -> Option<usize> {
        self.nodes.iter().position(|n| n.endpoint == endpoint)
    }

    /// Delivers recorded traffic until the network is quiet. Messages to
    /// or from partitioned nodes are dropped.
    fn pump(&mut self) {
        loop {
            let mut delivered = false;
            for i in 0..self.nodes.len() {
                let outgoing: Vec<_> = self.nodes[i].rec.sent.lock().unwrap().drain(..).collect();
                if self.partitioned.contains(&i) {
                    continue;
                }
                for (target, message) in outgoing {
                    let Some(j) = self.index_of(target) else {
                        continue;
                    };
                    if self.partitioned.contains(&j) {
                        continue;
                    }
                    self.nodes[j].coordinator.handle(message.into());
                    delivered = true;
                }
            }
            if !delivered {
                break;
            }
        }
    }

    fn take_sent(&mut self, i: usize) -> Vec<(SocketAddr, PeerMessage)> {
        self.nodes[i].rec.sent.lock().unwrap().drain(..).collect()
    }

    fn take_scheduled(&mut self, i: usize) -> Vec<(Duration, ElectionMessage)> {
        self.nodes[i]
            .rec
            .scheduled
            .lock()
            .unwrap()
            .drain(..)
            .collect()
    }

    fn take_events(&mut self, i: usize) -> Vec<ElectionEvent> {
        self.nodes[i].rec.events.lock().unwrap().drain(..).collect()
    }

    /// `(view, leader)` pairs of the `ElectionsDone` events recorded on
    /// node `i`, draining them.
    fn take_dones(&mut self, i: usize) -> Vec<(i32, NodeId)> {
        self.take_events(i)
            .into_iter()
            .filter_map(|e| match e {
                ElectionEvent::ElectionsDone { view, leader } => {
                    Some((view, leader.instance_id))
                }
                _ => None,
            })
            .collect()
    }

    fn start_elections_everywhere(&mut self) {
        for i in 0..self.nodes.len() {
            self.handle(i, ElectionMessage::StartElections);
        }
    }
}

/// All `ElectionsDone` events for the same view must name the same leader.
fn assert_same_view_agreement(dones: &[(i32, NodeId)]) {
    for (view_a, leader_a) in dones {
        for (view_b, leader_b) in dones {
            if view_a == view_b {
                assert_eq!(
                    leader_a, leader_b,
                    "two leaders elected in view {view_a}"
                );
            }
        }
    }
}

// Cluster layout used throughout: A sorts highest, then B, then C, and the
// id tags match so A also wins pure id tie-breaks.
const A: usize = 0;
const B: usize = 1;
const C: usize = 2;

fn three_nodes() -> Cluster {
    Cluster::new(&[(3, 3003), (2, 3002), (1, 3001)])
}

#[test]
fn cold_start_elects_highest_sorted_node_in_view_zero() {
    let mut cluster = three_nodes();
    cluster.start_elections_everywhere();
    cluster.pump();

    let mut all = Vec::new();
    for i in [A, B, C] {
        let dones = cluster.take_dones(i);
        assert_eq!(
            dones,
            vec![(0, id(3))],
            "node {i} must see A elected in view 0 exactly once"
        );
        all.extend(dones);
    }
    assert_same_view_agreement(&all);
    assert_eq!(cluster.nodes[A].coordinator.state(), ElectionState::Leader);
    assert_eq!(cluster.nodes[B].coordinator.state(), ElectionState::Acceptor);
}

#[test]
fn proposer_crash_rotates_view_and_elects_next() {
    let mut cluster = three_nodes();
    // A's commit position would win ranking ties, but A is gone; make B
    // clearly the most complete of the survivors
    cluster.nodes[B].rec.commit.store(50, Ordering::Relaxed);

    cluster.partitioned.insert(A);
    cluster.start_elections_everywhere();
    cluster.pump();

    // view 0's proposer (A) is unreachable, so nobody progressed
    assert!(cluster.take_dones(B).is_empty());
    assert!(cluster.take_dones(C).is_empty());

    // progress timers fire on the survivors; both rotate to view 1
    cluster.handle(B, ElectionMessage::ElectionsTimedOut { view: 0 });
    cluster.handle(C, ElectionMessage::ElectionsTimedOut { view: 0 });
    cluster.pump();

    assert_eq!(cluster.take_dones(B), vec![(1, id(2))]);
    assert_eq!(cluster.take_dones(C), vec![(1, id(2))]);
    assert!(
        cluster.take_dones(A).is_empty(),
        "partitioned proposer must not observe the election"
    );
}

#[test]
fn live_previous_leader_holds_against_inferior_candidate() {
    let mut cluster = three_nodes();
    // A has written epoch 7; everyone else is empty
    *cluster.nodes[A].rec.epoch.lock().unwrap() = Some(Epoch {
        number: 7,
        position: 700,
        id: id(3),
    });
    cluster.start_elections_everywhere();
    cluster.pump();
    for i in [A, B, C] {
        assert_eq!(cluster.take_dones(i), vec![(0, id(3))]);
    }

    // gossip now reports A as the live leader
    let mut snapshot = cluster.default_snapshot();
    snapshot[A].state = NodeState::Leader;
    snapshot[A].epoch_number = 7;
    for row in &mut snapshot[1..] {
        row.state = NodeState::Follower;
    }
    cluster.push_gossip(snapshot);

    // drive C into view 1 as an acceptor
    cluster.handle(
        C,
        ElectionMessage::ViewChange(ViewChange {
            server_id: id(2),
            server_endpoint: addr(3002),
            attempted_view: 1,
        }),
    );
    cluster.handle(
        C,
        ElectionMessage::Prepare(Prepare {
            server_id: id(2),
            server_endpoint: addr(3002),
            view: 1,
        }),
    );
    assert_eq!(cluster.nodes[C].coordinator.state(), ElectionState::Acceptor);
    cluster.take_sent(C);

    // a proposal for B with an inferior epoch must be refused while the
    // previous leader is alive and not resigning
    cluster.handle(
        C,
        ElectionMessage::Proposal(Proposal {
            server_id: id(2),
            server_endpoint: addr(3002),
            leader_id: id(2),
            leader_endpoint: addr(3002),
            view: 1,
            epoch_number: -1,
            epoch_position: -1,
            epoch_id: NodeId::zero(),
            last_commit_position: -1,
            writer_checkpoint: -1,
            chaser_checkpoint: -1,
            node_priority: 0,
        }),
    );
    assert!(
        !cluster
            .take_sent(C)
            .iter()
            .any(|(_, m)| matches!(m, PeerMessage::Accept(_))),
        "inferior candidate must not be accepted over a live leader"
    );
    assert!(cluster.take_dones(C).is_empty());

    // re-proposing the live leader itself goes through
    cluster.handle(
        C,
        ElectionMessage::Proposal(Proposal {
            server_id: id(2),
            server_endpoint: addr(3002),
            leader_id: id(3),
            leader_endpoint: addr(3003),
            view: 1,
            epoch_number: 7,
            epoch_position: 700,
            epoch_id: id(3),
            last_commit_position: 0,
            writer_checkpoint: 0,
            chaser_checkpoint: 0,
            node_priority: 0,
        }),
    );
    assert!(cluster
        .take_sent(C)
        .iter()
        .any(|(_, m)| matches!(m, PeerMessage::Accept(_))));
    // the synthesized proposer vote plus C's own vote already form the
    // majority, so C observes the re-election locally
    assert_eq!(cluster.take_dones(C), vec![(1, id(3))]);
}

#[test]
fn most_complete_log_wins_the_election() {
    let mut cluster = three_nodes();
    let epoch = Epoch {
        number: 5,
        position: 10,
        id: id(9),
    };
    for (i, commit) in [(A, 100), (B, 200), (C, 150)] {
        *cluster.nodes[i].rec.epoch.lock().unwrap() = Some(epoch);
        cluster.nodes[i].rec.commit.store(commit, Ordering::Relaxed);
    }

    cluster.start_elections_everywhere();
    cluster.pump();

    let mut all = Vec::new();
    for i in [A, B, C] {
        let dones = cluster.take_dones(i);
        assert_eq!(dones.len(), 1);
        assert_eq!(dones[0].1, id(2), "B holds the longest log");
        all.extend(dones);
    }
    assert_same_view_agreement(&all);
}

#[test]
fn resignation_handshake_and_fresh_election() {
    let mut cluster = three_nodes();
    cluster.start_elections_everywhere();
    cluster.pump();
    for i in [A, B, C] {
        assert_eq!(cluster.take_dones(i), vec![(0, id(3))]);
    }
    let mut snapshot = cluster.default_snapshot();
    snapshot[A].state = NodeState::Leader;
    cluster.push_gossip(snapshot);

    // resignation is leader-only: a follower's request is ignored
    cluster.handle(B, ElectionMessage::ResignNode);
    assert!(cluster.take_sent(B).is_empty());

    cluster.handle(A, ElectionMessage::ResignNode);
    cluster.pump();
    let resignations: Vec<_> = cluster
        .take_events(A)
        .into_iter()
        .filter(|e| *e == ElectionEvent::InitiateLeaderResignation)
        .collect();
    assert_eq!(
        resignations.len(),
        1,
        "majority of acks must trigger exactly one resignation"
    );

    // the next election must not stick to the resigning leader
    cluster.nodes[B].rec.commit.store(100, Ordering::Relaxed);
    cluster.start_elections_everywhere();
    cluster.pump();
    for i in [A, B, C] {
        assert_eq!(
            cluster.take_dones(i),
            vec![(1, id(2))],
            "resigning leader must lose stickiness"
        );
    }
}

#[test]
fn view_change_proof_heals_partitioned_node() {
    let mut cluster = three_nodes();
    cluster.partitioned.insert(C);
    cluster.start_elections_everywhere();
    cluster.pump();

    // A and B elect A in view 0 without C
    assert_eq!(cluster.take_dones(A), vec![(0, id(3))]);
    assert_eq!(cluster.take_dones(B), vec![(0, id(3))]);

    // churn drives two more elections; view 2's proposer is the
    // partitioned C, so that view stalls and times out
    let mut all_dones = vec![(0, id(3))];
    cluster.handle(A, ElectionMessage::StartElections);
    cluster.handle(B, ElectionMessage::StartElections);
    cluster.pump();
    all_dones.extend(cluster.take_dones(A));

    cluster.handle(A, ElectionMessage::StartElections);
    cluster.handle(B, ElectionMessage::StartElections);
    cluster.pump();
    assert!(cluster.take_dones(A).is_empty(), "view 2 has no proposer");
    cluster.handle(A, ElectionMessage::ElectionsTimedOut { view: 2 });
    cluster.handle(B, ElectionMessage::ElectionsTimedOut { view: 2 });
    cluster.pump();
    all_dones.extend(cluster.take_dones(A));
    assert_eq!(cluster.nodes[A].coordinator.last_installed_view(), 3);

    // C saw none of it
    assert_eq!(cluster.nodes[C].coordinator.last_installed_view(), -1);
    cluster.take_dones(B);

    // partition heals; discard C's stale outbox and let the periodic
    // proof broadcast catch it up
    cluster.take_sent(C);
    cluster.partitioned.remove(&C);
    cluster.take_scheduled(C);
    cluster.handle(A, ElectionMessage::SendViewChangeProof);
    cluster.pump();

    assert_eq!(cluster.nodes[C].coordinator.last_attempted_view(), 3);
    assert_eq!(cluster.nodes[C].coordinator.last_installed_view(), 3);
    assert_eq!(cluster.nodes[C].coordinator.state(), ElectionState::Acceptor);
    // adopting the view re-armed C's progress timer
    assert!(cluster
        .take_scheduled(C)
        .iter()
        .any(|(_, m)| *m == ElectionMessage::ElectionsTimedOut { view: 3 }));

    // C now participates: its timeout opens view 4 and the whole cluster,
    // C included, completes it
    cluster.handle(C, ElectionMessage::ElectionsTimedOut { view: 3 });
    cluster.pump();
    for i in [A, B, C] {
        let dones = cluster.take_dones(i);
        assert_eq!(dones.len(), 1, "node {i} must observe the view 4 election");
        assert_eq!(dones[0].0, 4);
        all_dones.extend(dones);
    }
    assert_same_view_agreement(&all_dones);
}

#[test]
fn installed_views_never_decrease() {
    let mut cluster = three_nodes();
    let mut history: Vec<Vec<i32>> = vec![Vec::new(); 3];
    let record = |cluster: &Cluster, history: &mut Vec<Vec<i32>>| {
        for (i, node) in cluster.nodes.iter().enumerate() {
            history[i].push(node.coordinator.last_installed_view());
        }
    };

    record(&cluster, &mut history);
    cluster.start_elections_everywhere();
    cluster.pump();
    record(&cluster, &mut history);
    cluster.start_elections_everywhere();
    cluster.pump();
    record(&cluster, &mut history);
    cluster.handle(A, ElectionMessage::SendViewChangeProof);
    cluster.pump();
    record(&cluster, &mut history);

    for (i, views) in history.iter().enumerate() {
        for pair in views.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "installed view went backwards on node {i}: {views:?}"
            );
        }
    }
}

#[test]
fn accepts_below_majority_never_elect() {
    let mut cluster = Cluster::new(&[(5, 3005), (4, 3004), (3, 3003), (2, 3002), (1, 3001)]);
    // only the proposer is reachable: its self-delivered view change and
    // prepare-ok are one vote short of the majority of five
    for i in 1..5 {
        cluster.partitioned.insert(i);
    }
    cluster.handle(0, ElectionMessage::StartElections);
    cluster.pump();

    assert!(cluster.take_dones(0).is_empty());
    assert_eq!(
        cluster.nodes[0].coordinator.state(),
        ElectionState::ElectingLeader
    );

    // a single crafted accept cannot fake a quorum either
    cluster.handle(
        0,
        ElectionMessage::Accept(Accept {
            server_id: id(4),
            server_endpoint: addr(3004),
            leader_id: id(5),
            leader_endpoint: addr(3005),
            view: 0,
        }),
    );
    assert!(cluster.take_dones(0).is_empty());
}
