//! Core protocol types for meshcast
//!
//! All wire types are designed for deterministic serialization via postcard.
//! Version vectors travel as sorted entry lists, never as maps.

use serde::{Deserialize, Serialize};

/// 32-byte fixed-size array used for identifiers.
pub type Bytes32 = [u8; 32];

// =============================================================================
// IDENTITY TYPES (newtypes for type safety)
// =============================================================================

/// Origin: stable identifier of the peer that authors a causal chain.
///
/// One broadcast-engine instance holds exactly one origin for its lifetime;
/// it is the namespace under which that peer's own messages are counted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(pub Bytes32);

impl Origin {
    /// Derive a stable origin from a human-readable name.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"meshcast-origin-v1:");
        hasher.update(name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &Bytes32 {
        &self.0
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Transport-level neighbour identifier, owned by the overlay layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Bytes32);

impl PeerId {
    pub fn as_bytes(&self) -> &Bytes32 {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Protocol namespace for one broadcast-engine instance.
///
/// Frames carry the protocol id so a shared inbound path can route them to
/// the right engine; an engine never sees frames for another protocol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// EVENT CLOCKS
// =============================================================================

/// Event clock: `(origin, counter)` pair uniquely naming one broadcast.
///
/// For a fixed origin, counters issued locally increase by exactly 1 per
/// send, starting at 1, with no gaps.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventClock {
    pub origin: Origin,
    pub counter: u64,
}

impl EventClock {
    pub fn new(origin: Origin, counter: u64) -> Self {
        Self { origin, counter }
    }

    /// Byte-comparable encoding: origin bytes followed by the big-endian
    /// counter. Sorting by this key orders clocks by origin, then counter.
    pub fn sort_key(&self) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..32].copy_from_slice(&self.origin.0);
        key[32..].copy_from_slice(&self.counter.to_be_bytes());
        key
    }

    /// The clock immediately following this one in the same origin chain.
    pub fn next(&self) -> Self {
        Self {
            origin: self.origin,
            counter: self.counter + 1,
        }
    }
}

impl std::fmt::Display for EventClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.origin, self.counter)
    }
}

/// One slot of a version vector in wire form.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionVectorEntry {
    pub origin: Origin,
    pub counter: u64,
}

/// The sender's causal-predecessor snapshot embedded in a broadcast message:
/// "deliver me only after you have delivered everything up to this point."
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Dependency {
    /// No causal prerequisites (first message, or unrelated chain).
    #[default]
    None,
    /// A single predecessor clock.
    Clock(EventClock),
    /// A full vector snapshot, sorted by origin.
    Vector(Vec<VersionVectorEntry>),
}

// =============================================================================
// BROADCAST MESSAGES
// =============================================================================

/// Application message disseminated by gossip flooding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BroadcastMessage {
    /// Protocol namespace this message belongs to
    pub protocol: ProtocolId,
    /// Unique event clock allocated by the origin
    pub id: EventClock,
    /// Causal predecessor snapshot at send time
    pub dependency: Dependency,
    /// Transport peer the message was first received from (stamped on arrival)
    pub issuer: Option<PeerId>,
    /// Opaque application payload
    pub payload: Vec<u8>,
}

// =============================================================================
// ANTI-ENTROPY
// =============================================================================

/// Correlation id for one chunked anti-entropy reply.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResponseId(pub u64);

impl ResponseId {
    /// Fresh random id for a new response exchange.
    pub fn generate() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for ResponseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Pull request: "send me everything my causality does not cover".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AntiEntropyRequest {
    pub protocol: ProtocolId,
    /// Requester's version vector snapshot, sorted by origin
    pub causality: Vec<VersionVectorEntry>,
}

/// First chunk of a reply: announces the element count and the responder's
/// own causality, to be merged once all elements have arrived.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AntiEntropyHeader {
    pub protocol: ProtocolId,
    pub response_id: ResponseId,
    pub causality: Vec<VersionVectorEntry>,
    pub expected_count: u32,
}

/// One repaired message. Elements may arrive interleaved or before the
/// header; only the completion count matters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AntiEntropyElement {
    pub protocol: ProtocolId,
    pub response_id: ResponseId,
    pub element: BroadcastMessage,
}

// =============================================================================
// FRAMES
// =============================================================================

/// Top-level wire frame. An undecodable frame is malformed and dropped at
/// the boundary; it never reaches an engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Frame {
    Broadcast(BroadcastMessage),
    AntiEntropyRequest(AntiEntropyRequest),
    AntiEntropyHeader(AntiEntropyHeader),
    AntiEntropyElement(AntiEntropyElement),
}

impl Frame {
    /// Protocol namespace this frame is addressed to.
    pub fn protocol(&self) -> &ProtocolId {
        match self {
            Frame::Broadcast(m) => &m.protocol,
            Frame::AntiEntropyRequest(r) => &r.protocol,
            Frame::AntiEntropyHeader(h) => &h.protocol,
            Frame::AntiEntropyElement(e) => &e.protocol,
        }
    }
}
