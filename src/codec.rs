//! Length-prefixed framing for [`Message`]s.
//!
//! Each frame is a 4-byte big-endian body length followed by the body, a
//! UTF-8 JSON encoding of one [`Message`]: `[u32 length][json bytes]`. The
//! prefix makes frame boundaries unambiguous no matter what the payload
//! strings contain.
//!
//! [`MessageCodec`] plugs into [`tokio_util::codec::Framed`], which buffers
//! partial reads so a receive never yields a partial or concatenated message.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DuelError, Result};
use crate::protocol::Message;

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Default upper bound on a frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Encoder/decoder for length-prefixed JSON [`Message`] frames.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_frame_len: usize,
}

impl MessageCodec {
    /// Create a codec with the default frame limit.
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Create a codec that rejects bodies longer than `max_frame_len` bytes.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// The configured body limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = DuelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(head) = src.get(..LEN_PREFIX) else {
            return Ok(None);
        };
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(head);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_frame_len {
            return Err(DuelError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let frame_len = LEN_PREFIX + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let body = src.split_to(len);
        let message = serde_json::from_slice(&body)?;
        Ok(Some(message))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(DuelError::Truncated {
                remaining: src.len(),
            }),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = DuelError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&message)?;
        if body.len() > self.max_frame_len {
            return Err(DuelError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame_len,
            });
        }
        let len = u32::try_from(body.len()).map_err(|_| DuelError::FrameTooLarge {
            len: body.len(),
            max: self.max_frame_len,
        })?;
        dst.reserve(LEN_PREFIX + body.len());
        dst.put_u32(len);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Encode one message into a standalone frame.
///
/// # Errors
///
/// Returns [`DuelError::FrameTooLarge`] if the body exceeds the default limit.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    MessageCodec::new().encode(message.clone(), &mut buf)?;
    Ok(buf.to_vec())
}

/// Decode a buffer that must hold exactly one complete frame.
///
/// # Errors
///
/// Returns [`DuelError::Truncated`] for an incomplete frame,
/// [`DuelError::Decode`] for a malformed body, and
/// [`DuelError::TrailingBytes`] when bytes follow the frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Message> {
    let mut buf = BytesMut::from(bytes);
    let message = MessageCodec::new()
        .decode_eof(&mut buf)?
        .ok_or(DuelError::Truncated { remaining: 0 })?;
    if !buf.is_empty() {
        return Err(DuelError::TrailingBytes { count: buf.len() });
    }
    Ok(message)
}
