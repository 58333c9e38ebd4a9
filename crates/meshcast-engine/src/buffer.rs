//! Delivery buffer for causally-blocked messages
//!
//! Received messages that cannot be delivered yet are held here, keyed by
//! the byte-comparable encoding of their event clock. The ordered map gives
//! O(log n) duplicate checks and insertion without manual index splicing.

use meshcast_core::types::{BroadcastMessage, EventClock};
use meshcast_core::VersionVector;
use std::collections::BTreeMap;
use tracing::debug;

/// Holds messages whose causal prerequisites have not arrived yet.
#[derive(Default)]
pub struct DeliveryBuffer {
    entries: BTreeMap<[u8; 40], BroadcastMessage>,
}

impl DeliveryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message, keeping sort order by clock. Returns `false`
    /// without touching the buffer if the id is already present.
    pub fn insert(&mut self, message: BroadcastMessage) -> bool {
        let key = message.id.sort_key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, message);
        true
    }

    /// O(log n) lookup by event clock.
    pub fn contains(&self, id: &EventClock) -> bool {
        self.entries.contains_key(&id.sort_key())
    }

    /// Deliver every entry the vector considers ready, discarding entries
    /// it already covers.
    ///
    /// Delivering one entry can make others ready, so this is a fixed-point
    /// loop: full passes over the buffer repeat until a pass makes no
    /// progress. Entries whose dependency is never satisfied stay buffered
    /// indefinitely; anti-entropy is the mechanism that resolves them.
    ///
    /// Each delivered message has already been folded into `vector` (via
    /// `increment_from`) when this returns; messages are returned in
    /// delivery order.
    pub fn review_and_deliver(&mut self, vector: &mut VersionVector) -> Vec<BroadcastMessage> {
        let mut delivered = Vec::new();
        loop {
            let mut progressed = false;
            // Scan from the most recently inserted end backward
            let keys: Vec<[u8; 40]> = self.entries.keys().rev().copied().collect();
            for key in keys {
                let Some(message) = self.entries.get(&key) else {
                    continue;
                };
                if vector.is_lower(&message.id) {
                    debug!(id = %message.id, "discarding superseded buffered message");
                    self.entries.remove(&key);
                    progressed = true;
                } else if vector.is_ready(&message.id, &message.dependency) {
                    if let Some(message) = self.entries.remove(&key) {
                        vector.increment_from(&message.id);
                        delivered.push(message);
                        progressed = true;
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
