//! Message history consulted by anti-entropy repair
//!
//! The engine records every message it originates or causally delivers;
//! the anti-entropy responder asks the store for messages a remote
//! causality snapshot does not cover. Growth is unbounded here; pruning
//! policy belongs to the layer that owns the store.

use meshcast_core::types::BroadcastMessage;
use meshcast_core::VersionVector;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// External history store the anti-entropy responder consults.
pub trait MessageHistory: Send + Sync {
    /// Remember a message so it can later be served to lagging peers.
    fn record(&self, message: &BroadcastMessage);

    /// Locally held messages whose clock the given causality does not
    /// cover, ordered by origin then counter.
    fn missing_since(&self, causality: &VersionVector) -> Vec<BroadcastMessage>;
}

/// In-memory history keyed by clock sort key.
#[derive(Default)]
pub struct InMemoryHistory {
    messages: RwLock<BTreeMap<[u8; 40], BroadcastMessage>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl MessageHistory for InMemoryHistory {
    fn record(&self, message: &BroadcastMessage) {
        self.messages
            .write()
            .insert(message.id.sort_key(), message.clone());
    }

    fn missing_since(&self, causality: &VersionVector) -> Vec<BroadcastMessage> {
        self.messages
            .read()
            .values()
            .filter(|message| !causality.is_lower(&message.id))
            .cloned()
            .collect()
    }
}
