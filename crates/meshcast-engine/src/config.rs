//! Engine configuration and error types

use meshcast_core::{Origin, PeerId, ProtocolId};
use std::time::Duration;
use thiserror::Error;

/// Engine errors. Construction with an invalid configuration is the only
/// fatal failure this layer surfaces; everything at runtime degrades
/// gracefully instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Per-destination transmission failure, reported by transport
/// implementations. The engine absorbs and logs these; they never reach
/// `send`'s caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(PeerId),
    #[error("transport channel closed")]
    ChannelClosed,
}

/// Configuration for one broadcast-engine instance
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Protocol namespace this engine serves
    pub protocol: ProtocolId,
    /// Origin under which this peer's own messages are counted
    pub origin: Origin,
    /// Cap on neighbours enumerated per flood; `None` floods the full set
    pub fanout: Option<usize>,
    /// Interval between periodic anti-entropy rounds
    pub anti_entropy_interval: Duration,
}

impl EngineConfig {
    pub fn new(protocol: ProtocolId, origin: Origin) -> Self {
        Self {
            protocol,
            origin,
            fanout: None,
            anti_entropy_interval: Duration::from_secs(30),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.protocol.is_empty() {
            return Err(EngineError::Configuration(
                "protocol id cannot be empty".into(),
            ));
        }
        if self.origin.0 == [0u8; 32] {
            return Err(EngineError::Configuration(
                "origin cannot be all zeroes".into(),
            ));
        }
        Ok(())
    }
}
