//! Broadcast engine - send, receive, gossip flooding, anti-entropy routing
//!
//! One engine instance owns one version vector and one delivery buffer for
//! one protocol namespace. Stimuli (inbound frames, timer ticks) are
//! serialized through the state lock; delegate callbacks run after the lock
//! is released so higher layers may call back into the engine.

use crate::anti_entropy::{AntiEntropyResponder, CompletedExchange};
use crate::buffer::DeliveryBuffer;
use crate::config::{EngineConfig, EngineError, TransportError};
use crate::history::MessageHistory;
use crate::registry::FrameHandler;
use meshcast_core::types::{
    AntiEntropyRequest, BroadcastMessage, Dependency, EventClock, Frame, PeerId, ProtocolId,
};
use meshcast_core::VersionVector;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, warn};

/// Supplies the current neighbour set. Owned by the external overlay
/// layer; the set may change between any two calls and is re-read per
/// flood, never cached.
pub trait NeighbourSource: Send + Sync {
    fn neighbours(&self, limit: Option<usize>) -> Vec<PeerId>;
}

/// Point-to-point transport. Failures are per-destination and absorbed by
/// the engine; a failed send to one neighbour never aborts the flood to
/// the others.
pub trait Transport: Send + Sync {
    fn send(&self, to: &PeerId, frame: Frame) -> Result<(), TransportError>;
}

/// What to do with a completed anti-entropy exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapResolution {
    /// Default behavior: deliver uncovered elements, then merge causality
    Deliver,
    /// The delegate resolved the gap itself; the engine does nothing more
    Handled,
}

/// Application-facing notifications.
pub trait DeliveryDelegate: Send + Sync {
    /// Fired once per causally-delivered message, in causal order per
    /// origin. `issuer` is the transport peer the message was first
    /// received from.
    fn on_deliver(&self, issuer: PeerId, payload: &[u8]);

    /// Offered every completed anti-entropy exchange before the default
    /// merge-and-deliver replay.
    fn on_anti_entropy_gap(
        &self,
        _from: PeerId,
        _elements: &[BroadcastMessage],
    ) -> GapResolution {
        GapResolution::Deliver
    }
}

/// Mutable causal state, guarded as one unit so each stimulus observes and
/// mutates a consistent vector/buffer pair.
struct EngineState {
    vector: VersionVector,
    buffer: DeliveryBuffer,
}

/// Causal broadcast engine for one protocol namespace.
pub struct BroadcastEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    responder: AntiEntropyResponder,
    neighbours: Arc<dyn NeighbourSource>,
    transport: Arc<dyn Transport>,
    history: Arc<dyn MessageHistory>,
    delegate: Arc<dyn DeliveryDelegate>,
    /// Shutdown signal for the periodic anti-entropy task
    shutdown_tx: broadcast::Sender<()>,
}

impl BroadcastEngine {
    /// Create an engine. The only fatal error this layer ever surfaces is
    /// an invalid configuration, here at construction.
    pub fn new(
        config: EngineConfig,
        neighbours: Arc<dyn NeighbourSource>,
        transport: Arc<dyn Transport>,
        history: Arc<dyn MessageHistory>,
        delegate: Arc<dyn DeliveryDelegate>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            state: Mutex::new(EngineState {
                vector: VersionVector::new(config.origin),
                buffer: DeliveryBuffer::new(),
            }),
            responder: AntiEntropyResponder::new(history.clone()),
            config,
            neighbours,
            transport,
            history,
            delegate,
            shutdown_tx,
        })
    }

    /// Broadcast an application payload. Allocates the next clock in the
    /// local chain, snapshots the causal dependency, floods to the current
    /// neighbour set, and returns the allocated clock. Never blocks and
    /// never fails: per-neighbour transmission errors are logged and
    /// skipped.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> EventClock {
        self.send_as(payload, None, None)
    }

    /// `send` with an explicit id and/or dependency, for higher consistency
    /// layers that chain sends deterministically. An explicit id is
    /// recorded in the local vector as if allocated here.
    pub fn send_as(
        &self,
        payload: impl Into<Vec<u8>>,
        id: Option<EventClock>,
        dependency: Option<Dependency>,
    ) -> EventClock {
        let message = {
            let mut state = self.state.lock();
            // Dependency snapshot is taken from the vector's state prior to
            // the allocation below
            let dependency = dependency.unwrap_or_else(|| state.vector.as_dependency());
            let id = match id {
                Some(explicit) => {
                    state.vector.increment_from(&explicit);
                    explicit
                }
                None => state.vector.increment(),
            };
            BroadcastMessage {
                protocol: self.config.protocol.clone(),
                id,
                dependency,
                issuer: None,
                payload: payload.into(),
            }
        };

        self.history.record(&message);
        self.flood(&message);
        message.id
    }

    /// Handle one inbound frame from a neighbour.
    pub fn receive(&self, sender: PeerId, frame: Frame) {
        if frame.protocol() != &self.config.protocol {
            debug!(
                got = %frame.protocol(),
                expected = %self.config.protocol,
                "dropping frame for foreign protocol"
            );
            return;
        }
        match frame {
            Frame::Broadcast(message) => self.receive_broadcast(sender, message),
            Frame::AntiEntropyRequest(request) => self.receive_repair_request(sender, request),
            Frame::AntiEntropyHeader(header) => {
                let completed = self.responder.handle_header(header);
                self.finish_exchange(sender, completed);
            }
            Frame::AntiEntropyElement(chunk) => {
                let completed = self.responder.handle_element(chunk);
                self.finish_exchange(sender, completed);
            }
        }
    }

    fn receive_broadcast(&self, sender: PeerId, mut message: BroadcastMessage) {
        let delivered = {
            let mut state = self.state.lock();
            if state.vector.is_lower(&message.id) || state.buffer.contains(&message.id) {
                debug!(id = %message.id, from = %sender, "duplicate broadcast dropped");
                return;
            }
            if message.issuer.is_none() {
                message.issuer = Some(sender);
            }
            state.buffer.insert(message.clone());
            let EngineState { vector, buffer } = &mut *state;
            buffer.review_and_deliver(vector)
        };

        self.notify_delivered(sender, &delivered);
        // Novel message: forward exactly once to the current neighbour set
        self.flood(&message);
    }

    fn receive_repair_request(&self, sender: PeerId, request: AntiEntropyRequest) {
        let local = self.state.lock().vector.clone();
        for frame in self.responder.handle_request(&local, &request) {
            if let Err(error) = self.transport.send(&sender, frame) {
                warn!(peer = %sender, %error, "anti-entropy reply transmission failed");
            }
        }
    }

    /// Replay a completed anti-entropy exchange: deliver every element the
    /// local vector does not cover, merge the remote causality, then give
    /// the newly widened vector a chance to unblock buffered messages.
    fn finish_exchange(&self, from: PeerId, completed: Option<CompletedExchange>) {
        let Some(exchange) = completed else {
            return;
        };
        if self.delegate.on_anti_entropy_gap(from, &exchange.elements) == GapResolution::Handled {
            debug!(from = %from, "anti-entropy gap resolved by delegate");
            return;
        }

        let delivered = {
            let mut state = self.state.lock();
            let mut delivered = Vec::new();
            for element in exchange.elements {
                if state.vector.is_lower(&element.id) {
                    continue;
                }
                state.vector.increment_from(&element.id);
                delivered.push(element);
            }
            state.vector.merge_entries(&exchange.causality);
            let EngineState { vector, buffer } = &mut *state;
            delivered.extend(buffer.review_and_deliver(vector));
            delivered
        };

        self.notify_delivered(from, &delivered);
    }

    fn notify_delivered(&self, fallback_issuer: PeerId, delivered: &[BroadcastMessage]) {
        for message in delivered {
            self.history.record(message);
            self.delegate
                .on_deliver(message.issuer.unwrap_or(fallback_issuer), &message.payload);
        }
    }

    fn flood(&self, message: &BroadcastMessage) {
        let frame = Frame::Broadcast(message.clone());
        for peer in self.neighbours.neighbours(self.config.fanout) {
            if let Err(error) = self.transport.send(&peer, frame.clone()) {
                warn!(peer = %peer, %error, "broadcast transmission failed");
            }
        }
    }

    /// One pull round: ask every current neighbour for messages our
    /// causality does not cover.
    pub fn run_anti_entropy_round(&self) {
        let causality = self.state.lock().vector.entries();
        let frame = Frame::AntiEntropyRequest(AntiEntropyRequest {
            protocol: self.config.protocol.clone(),
            causality,
        });
        for peer in self.neighbours.neighbours(self.config.fanout) {
            if let Err(error) = self.transport.send(&peer, frame.clone()) {
                warn!(peer = %peer, %error, "anti-entropy request transmission failed");
            }
        }
    }

    /// Spawn the periodic anti-entropy task, ticking at the configured
    /// interval until [`shutdown`](Self::shutdown).
    pub fn start_anti_entropy(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = self.config.anti_entropy_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.run_anti_entropy_round();
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        })
    }

    /// Stop the periodic anti-entropy task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Snapshot of the local version vector.
    pub fn version_vector(&self) -> VersionVector {
        self.state.lock().vector.clone()
    }

    /// Messages currently blocked on unmet causal prerequisites. A value
    /// that never drains indicates a causal gap only anti-entropy or peer
    /// departure will resolve.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Anti-entropy exchanges still waiting for chunks.
    pub fn pending_exchanges(&self) -> usize {
        self.responder.pending_count()
    }

    pub fn protocol(&self) -> &ProtocolId {
        &self.config.protocol
    }

    /// Interval the periodic task uses, for callers scheduling their own.
    pub fn anti_entropy_interval(&self) -> Duration {
        self.config.anti_entropy_interval
    }
}

impl FrameHandler for BroadcastEngine {
    fn protocol(&self) -> &ProtocolId {
        &self.config.protocol
    }

    fn receive(&self, sender: PeerId, frame: Frame) {
        BroadcastEngine::receive(self, sender, frame);
    }
}
