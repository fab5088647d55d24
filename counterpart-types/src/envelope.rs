//! Length-prefixed framing for the cloud relay variant.
//!
//! Each frame is a 4-byte big-endian length followed by a MessagePack body.

use crate::WireError;

/// Size of the frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest frame body the relay accepts (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Prefix `body` with its length.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Parse a frame header, rejecting bodies larger than [`MAX_FRAME_SIZE`].
pub fn decode_frame_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize, WireError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}
