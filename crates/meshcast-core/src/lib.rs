//! Meshcast Core Library
//!
//! This crate provides the wire types, causal version vector, and frame
//! codec for the meshcast causal broadcast protocol.
//!
//! # Modules
//!
//! - [`types`]: Protocol types (Origin, EventClock, BroadcastMessage, Frame, ...)
//! - [`vector`]: Version vector (the causal ordering oracle)
//! - [`codec`]: Deterministic frame serialization
//! - [`error`]: Error types

pub mod codec;
pub mod error;
pub mod types;
pub mod vector;

pub use error::{Error, Result};
pub use types::*;
pub use vector::VersionVector;
