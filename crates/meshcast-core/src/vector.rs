//! Version vector: per-origin causal counters, the ordering oracle.
//!
//! The vector maps each origin to the highest counter causally observed at
//! this peer (unobserved origins implicitly map to 0). It is monotonic
//! non-decreasing per origin, mutated only by local sends ([`increment`])
//! and local deliveries ([`increment_from`]).
//!
//! [`increment`]: VersionVector::increment
//! [`increment_from`]: VersionVector::increment_from

use crate::types::{Dependency, EventClock, Origin, VersionVectorEntry};
use std::collections::HashMap;

/// Per-origin causal counters for one broadcast-engine instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionVector {
    /// Origin whose chain this peer authors
    own: Origin,
    clocks: HashMap<Origin, u64>,
}

impl VersionVector {
    /// Create an empty vector for the given local origin.
    pub fn new(own: Origin) -> Self {
        Self {
            own,
            clocks: HashMap::new(),
        }
    }

    /// Rebuild a vector from a wire snapshot.
    pub fn from_entries(own: Origin, entries: &[VersionVectorEntry]) -> Self {
        let mut vector = Self::new(own);
        vector.merge_entries(entries);
        vector
    }

    /// The local origin.
    pub fn origin(&self) -> Origin {
        self.own
    }

    /// Highest counter observed for an origin; unknown origins map to 0.
    pub fn get(&self, origin: Origin) -> u64 {
        self.clocks.get(&origin).copied().unwrap_or(0)
    }

    /// Allocate the next event clock for this peer's own chain.
    ///
    /// Counters start at 1 and increase by exactly 1 per send, with no gaps.
    pub fn increment(&mut self) -> EventClock {
        let counter = self.clocks.entry(self.own).or_insert(0);
        *counter += 1;
        EventClock::new(self.own, *counter)
    }

    /// Record that `clock.origin`'s chain is observed at least up to
    /// `clock.counter`. Used only when a message from that origin has
    /// actually been delivered (or an explicit allocation was recorded).
    ///
    /// Monotonic: a clock at or below the stored counter is a no-op.
    pub fn increment_from(&mut self, clock: &EventClock) {
        let counter = self.clocks.entry(clock.origin).or_insert(0);
        if clock.counter > *counter {
            *counter = clock.counter;
        }
    }

    /// True iff the referenced message is already causally covered
    /// (delivered or superseded).
    pub fn is_lower(&self, clock: &EventClock) -> bool {
        clock.counter <= self.get(clock.origin)
    }

    /// The gated deliverability predicate: every origin referenced by the
    /// dependency must be covered component-wise, and the message's own
    /// counter must not skip a gap in its origin's chain (at most one past
    /// the locally recorded counter).
    pub fn is_ready(&self, id: &EventClock, dependency: &Dependency) -> bool {
        let covered = match dependency {
            Dependency::None => true,
            Dependency::Clock(clock) => self.get(clock.origin) >= clock.counter,
            Dependency::Vector(entries) => entries
                .iter()
                .all(|entry| self.get(entry.origin) >= entry.counter),
        };
        covered && id.counter <= self.get(id.origin) + 1
    }

    /// Wire snapshot: non-zero entries sorted by origin.
    pub fn entries(&self) -> Vec<VersionVectorEntry> {
        let mut entries: Vec<VersionVectorEntry> = self
            .clocks
            .iter()
            .filter(|(_, counter)| **counter > 0)
            .map(|(origin, counter)| VersionVectorEntry {
                origin: *origin,
                counter: *counter,
            })
            .collect();
        entries.sort_by_key(|entry| entry.origin);
        entries
    }

    /// Dependency snapshot of the current state, for embedding in an
    /// outgoing message.
    pub fn as_dependency(&self) -> Dependency {
        let entries = self.entries();
        if entries.is_empty() {
            Dependency::None
        } else {
            Dependency::Vector(entries)
        }
    }

    /// Component-wise maximum with another vector.
    pub fn merge(&mut self, other: &VersionVector) {
        for (origin, counter) in &other.clocks {
            let local = self.clocks.entry(*origin).or_insert(0);
            if *counter > *local {
                *local = *counter;
            }
        }
    }

    /// Component-wise maximum with a wire snapshot.
    pub fn merge_entries(&mut self, entries: &[VersionVectorEntry]) {
        for entry in entries {
            let local = self.clocks.entry(entry.origin).or_insert(0);
            if entry.counter > *local {
                *local = entry.counter;
            }
        }
    }

    /// Number of origins with a non-zero counter.
    pub fn len(&self) -> usize {
        self.clocks.values().filter(|counter| **counter > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
