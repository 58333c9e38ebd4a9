//! Multi-peer scenarios over an in-memory mesh
//!
//! Frames travel through per-peer mailboxes so tests can control arrival
//! order, partition peers, and pump the network to quiescence.

use crate::config::{EngineConfig, TransportError};
use crate::engine::{BroadcastEngine, DeliveryDelegate, NeighbourSource, Transport};
use crate::history::InMemoryHistory;
use meshcast_core::types::{Frame, Origin, PeerId, ProtocolId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("meshcast_engine=debug")
        .with_test_writer()
        .try_init();
}

struct MeshNet {
    mailboxes: Mutex<HashMap<PeerId, VecDeque<(PeerId, Frame)>>>,
    down: Mutex<HashSet<PeerId>>,
}

impl MeshNet {
    fn new() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            down: Mutex::new(HashSet::new()),
        }
    }
}

struct MeshTransport {
    net: Arc<MeshNet>,
    local: PeerId,
}

impl Transport for MeshTransport {
    fn send(&self, to: &PeerId, frame: Frame) -> Result<(), TransportError> {
        if self.net.down.lock().contains(to) {
            return Err(TransportError::Unreachable(*to));
        }
        self.net
            .mailboxes
            .lock()
            .entry(*to)
            .or_default()
            .push_back((self.local, frame));
        Ok(())
    }
}

struct StaticNeighbours(Vec<PeerId>);

impl NeighbourSource for StaticNeighbours {
    fn neighbours(&self, limit: Option<usize>) -> Vec<PeerId> {
        let mut peers = self.0.clone();
        if let Some(limit) = limit {
            peers.truncate(limit);
        }
        peers
    }
}

#[derive(Default)]
struct Recorder {
    delivered: Mutex<Vec<Vec<u8>>>,
}

impl DeliveryDelegate for Recorder {
    fn on_deliver(&self, _issuer: PeerId, payload: &[u8]) {
        self.delivered.lock().push(payload.to_vec());
    }
}

struct SimPeer {
    id: PeerId,
    origin: Origin,
    engine: Arc<BroadcastEngine>,
    recorder: Arc<Recorder>,
}

impl SimPeer {
    fn delivered(&self) -> Vec<Vec<u8>> {
        self.recorder.delivered.lock().clone()
    }
}

struct Mesh {
    net: Arc<MeshNet>,
    peers: Vec<SimPeer>,
}

impl Mesh {
    /// Build peers named by `names`, connected along `links` (symmetric,
    /// by index into `names`).
    fn build(names: &[&str], links: &[(usize, usize)]) -> Self {
        let net = Arc::new(MeshNet::new());
        let ids: Vec<PeerId> = names
            .iter()
            .map(|name| PeerId(Origin::from_name(name).0))
            .collect();

        let peers = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let origin = Origin::from_name(name);
                let neighbours: Vec<PeerId> = links
                    .iter()
                    .filter_map(|(a, b)| match (index == *a, index == *b) {
                        (true, _) => Some(ids[*b]),
                        (_, true) => Some(ids[*a]),
                        _ => None,
                    })
                    .collect();
                let recorder = Arc::new(Recorder::default());
                let engine = Arc::new(
                    BroadcastEngine::new(
                        EngineConfig::new(ProtocolId::new("scenario"), origin),
                        Arc::new(StaticNeighbours(neighbours)),
                        Arc::new(MeshTransport {
                            net: net.clone(),
                            local: ids[index],
                        }),
                        Arc::new(InMemoryHistory::new()),
                        recorder.clone(),
                    )
                    .unwrap(),
                );
                SimPeer {
                    id: ids[index],
                    origin,
                    engine,
                    recorder,
                }
            })
            .collect();

        Self { net, peers }
    }

    fn fully_connected(names: &[&str]) -> Self {
        let mut links = Vec::new();
        for a in 0..names.len() {
            for b in (a + 1)..names.len() {
                links.push((a, b));
            }
        }
        Self::build(names, &links)
    }

    fn set_down(&self, index: usize, down: bool) {
        let id = self.peers[index].id;
        let mut set = self.net.down.lock();
        if down {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    fn reverse_mailbox(&self, index: usize) {
        let mut boxes = self.net.mailboxes.lock();
        if let Some(queue) = boxes.get_mut(&self.peers[index].id) {
            let reversed: VecDeque<_> = queue.drain(..).rev().collect();
            *queue = reversed;
        }
    }

    /// Deliver one pending frame to the given peer, if any.
    fn deliver_one(&self, index: usize) -> bool {
        let peer = &self.peers[index];
        let item = self
            .net
            .mailboxes
            .lock()
            .get_mut(&peer.id)
            .and_then(|queue| queue.pop_front());
        match item {
            Some((from, frame)) => {
                peer.engine.receive(from, frame);
                true
            }
            None => false,
        }
    }

    /// Process frames until every mailbox is empty. Terminates because
    /// each peer forwards each novel message exactly once.
    fn pump(&self) {
        loop {
            let item = {
                let mut boxes = self.net.mailboxes.lock();
                self.peers.iter().enumerate().find_map(|(index, peer)| {
                    boxes
                        .get_mut(&peer.id)
                        .and_then(|queue| queue.pop_front())
                        .map(|(from, frame)| (index, from, frame))
                })
            };
            match item {
                Some((index, from, frame)) => self.peers[index].engine.receive(from, frame),
                None => break,
            }
        }
    }
}

#[test]
fn test_chain_delivers_in_causal_order_despite_reversed_arrival() {
    init_tracing();
    let mesh = Mesh::build(&["p1", "p2", "p3"], &[(0, 1), (1, 2)]);

    mesh.peers[0].engine.send(b"a".to_vec());
    mesh.peers[0].engine.send(b"b".to_vec());

    // P2 processes both in order and forwards them to P3
    assert!(mesh.deliver_one(1));
    assert!(mesh.deliver_one(1));
    assert_eq!(mesh.peers[1].delivered(), vec![b"a".to_vec(), b"b".to_vec()]);

    // P3 sees 'b' before 'a'
    mesh.reverse_mailbox(2);
    assert!(mesh.deliver_one(2));
    assert!(mesh.peers[2].delivered().is_empty());
    assert_eq!(mesh.peers[2].engine.buffered(), 1);

    mesh.pump();

    assert_eq!(mesh.peers[2].delivered(), vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(
        mesh.peers[2].engine.version_vector().get(mesh.peers[0].origin),
        2
    );
    assert_eq!(mesh.peers[2].engine.buffered(), 0);
    // The origin never hears its own messages back
    assert!(mesh.peers[0].delivered().is_empty());
}

#[test]
fn test_gossip_termination_exactly_one_delivery_per_peer() {
    let mesh = Mesh::fully_connected(&["p0", "p1", "p2", "p3", "p4"]);

    mesh.peers[0].engine.send(b"hello".to_vec());
    mesh.pump();

    for peer in &mesh.peers[1..] {
        assert_eq!(peer.delivered(), vec![b"hello".to_vec()]);
        assert_eq!(peer.engine.version_vector().get(mesh.peers[0].origin), 1);
    }
    assert!(mesh.peers[0].delivered().is_empty());
}

#[test]
fn test_anti_entropy_catches_up_disconnected_peer() {
    init_tracing();
    let mesh = Mesh::build(&["alice", "bob"], &[(0, 1)]);

    // Bob is unreachable while Alice broadcasts five messages
    mesh.set_down(1, true);
    for counter in 1u8..=5 {
        mesh.peers[0].engine.send(vec![counter]);
    }
    mesh.pump();
    assert!(mesh.peers[1].delivered().is_empty());

    // One pull round after reconnecting repairs the whole gap
    mesh.set_down(1, false);
    mesh.peers[1].engine.run_anti_entropy_round();
    mesh.pump();

    let expected: Vec<Vec<u8>> = (1u8..=5).map(|counter| vec![counter]).collect();
    assert_eq!(mesh.peers[1].delivered(), expected);
    assert_eq!(
        mesh.peers[1].engine.version_vector().get(mesh.peers[0].origin),
        5
    );
}

#[test]
fn test_duplicate_repairs_from_two_peers_deliver_once() {
    let mesh = Mesh::fully_connected(&["a", "b", "c"]);

    // B misses the flood; A and C both end up holding the message
    mesh.set_down(1, true);
    mesh.peers[0].engine.send(b"x".to_vec());
    mesh.pump();
    assert_eq!(mesh.peers[2].delivered(), vec![b"x".to_vec()]);

    // B pulls from both neighbours and gets two copies back
    mesh.set_down(1, false);
    mesh.peers[1].engine.run_anti_entropy_round();
    mesh.pump();

    assert_eq!(mesh.peers[1].delivered(), vec![b"x".to_vec()]);
    assert_eq!(
        mesh.peers[1].engine.version_vector().get(mesh.peers[0].origin),
        1
    );
}

#[test]
fn test_per_origin_order_holds_for_concurrent_senders() {
    let mesh = Mesh::fully_connected(&["p0", "p1", "p2", "p3"]);

    mesh.peers[0].engine.send(b"a1".to_vec());
    mesh.peers[1].engine.send(b"b1".to_vec());
    mesh.peers[0].engine.send(b"a2".to_vec());
    mesh.peers[1].engine.send(b"b2".to_vec());
    mesh.pump();

    for (index, peer) in mesh.peers.iter().enumerate() {
        let delivered = peer.delivered();
        let position = |payload: &[u8]| delivered.iter().position(|p| p.as_slice() == payload);

        // Each peer sees both of the other origin's chains in counter order
        if index != 0 {
            assert!(position(b"a1") < position(b"a2"), "peer {index} reordered a");
        }
        if index != 1 {
            assert!(position(b"b1") < position(b"b2"), "peer {index} reordered b");
        }
        // No origin hears itself; everyone else hears all four exactly once
        let expected = if index <= 1 { 2 } else { 4 };
        assert_eq!(delivered.len(), expected, "peer {index} delivery count");
    }
}

#[test]
fn test_stalled_gap_delays_rather_than_loses_delivery() {
    let mesh = Mesh::build(&["p0", "p1"], &[(0, 1)]);

    // Second message arrives alone; its predecessor was lost in transit
    mesh.peers[0].engine.send(b"one".to_vec());
    {
        // Drop the in-flight copy of 'one'
        let mut boxes = mesh.net.mailboxes.lock();
        boxes.get_mut(&mesh.peers[1].id).unwrap().clear();
    }
    mesh.peers[0].engine.send(b"two".to_vec());
    mesh.pump();

    assert!(mesh.peers[1].delivered().is_empty());
    assert_eq!(mesh.peers[1].engine.buffered(), 1);

    // Anti-entropy resolves the stall; 'two' drains from the buffer too
    mesh.peers[1].engine.run_anti_entropy_round();
    mesh.pump();

    assert_eq!(
        mesh.peers[1].delivered(),
        vec![b"one".to_vec(), b"two".to_vec()]
    );
    assert_eq!(mesh.peers[1].engine.buffered(), 0);
}
