//! Length-prefixed codec for the raw command IPC stream
//!
//! All messages are framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf message ]
//! ```
//!
//! This ensures message boundaries are preserved over stream sockets.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

/// Maximum message size (1 MB). A full batch of 255-byte commands stays well below it.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

/// Encode a message into a length-prefixed byte buffer
pub fn encode<M: Message>(message: &M) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a message directly into a provided buffer
pub fn encode_into<M: Message>(message: &M, buf: &mut BytesMut) -> Result<(), CodecError> {
    let msg_len = message.encoded_len();

    if msg_len > MAX_MESSAGE_SIZE as usize {
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    buf.reserve(4 + msg_len);
    buf.put_u32(msg_len as u32);
    message.encode(buf)?;

    Ok(())
}

/// Try to decode a length-prefixed message from a buffer
///
/// Returns:
/// - `Ok(Some(message))` if a complete message was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode<M: Message + Default>(buf: &mut BytesMut) -> Result<Option<M>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let msg_bytes = buf.split_to(msg_len as usize);

    Ok(Some(M::decode(msg_bytes)?))
}

/// Accumulates stream bytes and yields complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next<M: Message + Default>(&mut self) -> Result<Option<M>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{RawSendRequest, RawSendResponse, SendStatus};

    fn request() -> RawSendRequest {
        RawSendRequest::new(
            "/dev/peci-0",
            vec![vec![0x30, 0x01, 0x02, 0x01], vec![0x31, 0x05, 0x05, 0xa1, 0x00]],
        )
    }

    #[test]
    fn test_length_prefix() {
        let encoded = encode(&request()).expect("encode failed");
        let len_prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len_prefix as usize, encoded.len() - 4);

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded: RawSendRequest = decode(&mut buf).expect("decode failed").expect("no message");
        assert_eq!(decoded, request());
        assert!(buf.is_empty(), "buffer should be empty after decode");
    }

    #[test]
    fn test_partial_decode() {
        let encoded = encode(&request()).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..5]);
        let result: Option<RawSendRequest> =
            decode(&mut buf).expect("decode should not fail on partial data");
        assert!(result.is_none(), "should return None for partial data");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_frame_decoder_across_chunks() {
        let response = RawSendResponse::aborted(vec![vec![0x40, 0x00]]);
        let encoded = encode(&response).expect("encode failed");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..3]);
        assert!(decoder
            .decode_next::<RawSendResponse>()
            .expect("decode error")
            .is_none());
        assert_eq!(decoder.buffer_len(), 3);

        decoder.extend(&encoded[3..]);
        let decoded = decoder
            .decode_next::<RawSendResponse>()
            .expect("decode error")
            .expect("should have message");
        assert_eq!(decoded.status(), SendStatus::DeadlineAborted);
        assert_eq!(decoded.responses, vec![vec![0x40, 0x00]]);
    }

    #[test]
    fn test_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&request()).expect("encode failed"));
        decoder.extend(&encode(&request()).expect("encode failed"));

        assert!(decoder.decode_next::<RawSendRequest>().expect("decode error").is_some());
        assert!(decoder.decode_next::<RawSendRequest>().expect("decode error").is_some());
        assert!(decoder.decode_next::<RawSendRequest>().expect("decode error").is_none());
    }

    #[test]
    fn test_message_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_MESSAGE_SIZE + 1);
        buf.put_bytes(0, 100);

        let result = decode::<RawSendRequest>(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidLength(_))));
    }
}
