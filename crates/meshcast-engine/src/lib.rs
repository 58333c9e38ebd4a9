//! meshcast-engine - causal broadcast over a gossip mesh
//!
//! This crate provides:
//! - Out-of-order delivery buffering with cascading causal delivery
//! - Flood-once gossip dissemination to an externally supplied neighbour set
//! - Pull-based anti-entropy repair with chunked transfer
//! - A per-overlay protocol registry routing inbound frames to engines
//!
//! The membership/overlay layer and the point-to-point transport are
//! external collaborators, reached through the [`engine::NeighbourSource`]
//! and [`engine::Transport`] traits.

pub mod anti_entropy;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod history;
pub mod registry;

#[cfg(test)]
mod scenarios;

pub use anti_entropy::{AntiEntropyResponder, CompletedExchange, PendingResponses};
pub use buffer::DeliveryBuffer;
pub use config::{EngineConfig, EngineError, TransportError};
pub use engine::{BroadcastEngine, DeliveryDelegate, GapResolution, NeighbourSource, Transport};
pub use history::{InMemoryHistory, MessageHistory};
pub use registry::{EngineRegistry, FrameHandler};
