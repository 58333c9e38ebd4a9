//! Protocol registry routing inbound frames to engines
//!
//! One registry is constructed at overlay bootstrap and shared by
//! reference with the transport's inbound path; engines register under
//! their protocol id and are torn down with their peer. There is no
//! process-wide table.

use meshcast_core::types::{Frame, PeerId, ProtocolId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Receives frames addressed to one protocol namespace.
pub trait FrameHandler: Send + Sync {
    fn protocol(&self) -> &ProtocolId;
    fn receive(&self, sender: PeerId, frame: Frame);
}

/// Registry of live engines, keyed by protocol id.
#[derive(Default)]
pub struct EngineRegistry {
    handlers: RwLock<HashMap<ProtocolId, Arc<dyn FrameHandler>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its protocol id. Returns `false` if the
    /// protocol was already registered (the existing handler is kept).
    pub fn register(&self, handler: Arc<dyn FrameHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let protocol = handler.protocol().clone();
        if handlers.contains_key(&protocol) {
            return false;
        }
        handlers.insert(protocol, handler);
        true
    }

    /// Remove a handler, returning it if it was registered.
    pub fn unregister(&self, protocol: &ProtocolId) -> Option<Arc<dyn FrameHandler>> {
        self.handlers.write().remove(protocol)
    }

    /// Route a frame to the engine registered for its protocol. A frame
    /// for an unknown protocol is dropped; returns whether a handler ran.
    pub fn dispatch(&self, sender: PeerId, frame: Frame) -> bool {
        let handler = self.handlers.read().get(frame.protocol()).cloned();
        match handler {
            Some(handler) => {
                handler.receive(sender, frame);
                true
            }
            None => {
                debug!(protocol = %frame.protocol(), "dropping frame for unregistered protocol");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
