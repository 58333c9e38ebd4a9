//! Pull-based anti-entropy repair
//!
//! Peers periodically exchange version-vector snapshots; a peer that holds
//! messages the requester's snapshot does not cover replies with one header
//! frame announcing the element count, followed by one frame per element.
//! Chunks may arrive interleaved or out of order relative to the header:
//! the accumulator has no ordering requirement, only a completion count.

use crate::history::MessageHistory;
use meshcast_core::types::{
    AntiEntropyElement, AntiEntropyHeader, AntiEntropyRequest, BroadcastMessage, Frame, ResponseId,
    VersionVectorEntry,
};
use meshcast_core::VersionVector;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A fully reassembled anti-entropy reply, ready to replay.
#[derive(Debug, Clone)]
pub struct CompletedExchange {
    /// Responder's causality at reply time, merged after replay
    pub causality: Vec<VersionVectorEntry>,
    /// Repaired messages, sorted by origin then counter regardless of the
    /// order their chunks arrived in
    pub elements: Vec<BroadcastMessage>,
}

/// Reply being reassembled from chunked arrivals.
#[derive(Debug, Default)]
struct ResponseAccumulator {
    causality: Vec<VersionVectorEntry>,
    expected: Option<u32>,
    elements: Vec<BroadcastMessage>,
}

impl ResponseAccumulator {
    fn is_complete(&self) -> bool {
        self.expected
            .is_some_and(|count| self.elements.len() as u32 >= count)
    }
}

/// Explicit pending-operation map: `response_id -> accumulator`.
///
/// An exchange whose chunks never complete stays allocated until
/// [`cancel`](PendingResponses::cancel); bounding that growth is left to a
/// timeout policy layered on top.
#[derive(Default)]
pub struct PendingResponses {
    inner: HashMap<ResponseId, ResponseAccumulator>,
}

impl PendingResponses {
    fn entry(&mut self, id: ResponseId) -> &mut ResponseAccumulator {
        self.inner.entry(id).or_default()
    }

    /// Take the accumulator if it has reached its completion count.
    ///
    /// Elements are re-sorted into clock order here: chunks may have
    /// arrived in any order, and the replay must cover each origin's chain
    /// low counter first or a later clock would supersede an earlier one.
    pub fn resolve(&mut self, id: ResponseId) -> Option<CompletedExchange> {
        if !self.inner.get(&id).is_some_and(|acc| acc.is_complete()) {
            return None;
        }
        self.inner.remove(&id).map(|acc| {
            let mut elements = acc.elements;
            elements.sort_by_key(|element| element.id.sort_key());
            CompletedExchange {
                causality: acc.causality,
                elements,
            }
        })
    }

    /// Abandon an exchange, discarding whatever arrived so far.
    pub fn cancel(&mut self, id: ResponseId) -> bool {
        self.inner.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Builds replies to repair requests and reassembles chunked replies.
pub struct AntiEntropyResponder {
    history: Arc<dyn MessageHistory>,
    pending: Mutex<PendingResponses>,
}

impl AntiEntropyResponder {
    pub fn new(history: Arc<dyn MessageHistory>) -> Self {
        Self {
            history,
            pending: Mutex::new(PendingResponses::default()),
        }
    }

    /// Answer a repair request: one header frame, then one frame per
    /// message the requester's causality does not cover.
    pub fn handle_request(
        &self,
        local: &VersionVector,
        request: &AntiEntropyRequest,
    ) -> Vec<Frame> {
        let remote = VersionVector::from_entries(local.origin(), &request.causality);
        let elements = self.history.missing_since(&remote);
        let response_id = ResponseId::generate();
        debug!(
            response_id = %response_id,
            count = elements.len(),
            "answering anti-entropy request"
        );

        let mut frames = Vec::with_capacity(elements.len() + 1);
        frames.push(Frame::AntiEntropyHeader(AntiEntropyHeader {
            protocol: request.protocol.clone(),
            response_id,
            causality: local.entries(),
            expected_count: elements.len() as u32,
        }));
        frames.extend(elements.into_iter().map(|element| {
            Frame::AntiEntropyElement(AntiEntropyElement {
                protocol: request.protocol.clone(),
                response_id,
                element,
            })
        }));
        frames
    }

    /// Fold a header chunk into its accumulator.
    pub fn handle_header(&self, header: AntiEntropyHeader) -> Option<CompletedExchange> {
        let mut pending = self.pending.lock();
        let accumulator = pending.entry(header.response_id);
        accumulator.causality = header.causality;
        accumulator.expected = Some(header.expected_count);
        pending.resolve(header.response_id)
    }

    /// Fold an element chunk into its accumulator.
    pub fn handle_element(&self, chunk: AntiEntropyElement) -> Option<CompletedExchange> {
        let mut pending = self.pending.lock();
        pending.entry(chunk.response_id).elements.push(chunk.element);
        pending.resolve(chunk.response_id)
    }

    /// Abandon a pending exchange.
    pub fn cancel(&self, id: ResponseId) -> bool {
        self.pending.lock().cancel(id)
    }

    /// Exchanges still waiting for chunks.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
