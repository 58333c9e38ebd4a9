//! Frame codec for meshcast
//!
//! Frames use postcard serialization: compact, deterministic, and
//! field-order dependent. The same frame always encodes to the same bytes.

use crate::error::{Error, Result};
use crate::types::Frame;

/// Serialize a frame to wire bytes.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    postcard::to_allocvec(frame).map_err(Error::from)
}

/// Deserialize a frame from wire bytes.
///
/// Rejects broadcast and element frames carrying a zero counter; a decode
/// failure here is the caller's cue to drop the frame as malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let frame: Frame = postcard::from_bytes(bytes)?;
    let clock = match &frame {
        Frame::Broadcast(message) => Some(message.id),
        Frame::AntiEntropyElement(chunk) => Some(chunk.element.id),
        _ => None,
    };
    if let Some(clock) = clock {
        if clock.counter == 0 {
            return Err(Error::ZeroCounter);
        }
    }
    Ok(frame)
}
