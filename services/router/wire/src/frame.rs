//! Length-prefixed framing for stream transports.
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len (BE)   | length of bytes that follow|
//! +----------------------+----------------------------+
//! | body                 | one encoded WireMessage    |
//! +----------------------+----------------------------+
//! ```

use crate::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Default maximum frame body size (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Prefix a message body with its length
pub fn encode_frame(body: &[u8], max_frame_size: usize) -> Result<Bytes, WireError> {
    if body.len() > max_frame_size {
        return Err(WireError::Size(body.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Frame decoder for parsing incoming frames
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a decoder with a custom size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode one frame body from a buffer, or `None` if more data is needed
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        // Need at least 4 bytes for frame length
        if buf.len() < 4 {
            return Ok(None);
        }

        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if frame_len > self.max_frame_size {
            return Err(WireError::Size(frame_len));
        }

        if buf.len() < 4 + frame_len {
            return Ok(None);
        }

        buf.advance(4);
        Ok(Some(buf.split_to(frame_len).freeze()))
    }

    /// Call at end of stream: leftover bytes mean a truncated frame
    pub fn finish(&self, buf: &BytesMut) -> Result<(), WireError> {
        if buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::Incomplete)
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
