//! Protocol codec for encoding/decoding messages
//!
//! Handles JSON serialization and size limits of datagrams and frames.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use super::{Announcement, ChatMessage, Message, MessageKind, MAX_FRAME_SIZE};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),

    #[error("Empty payload")]
    Empty,

    #[error("Unexpected message type: {0}")]
    UnexpectedKind(&'static str),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes and decodes messages, enforcing a maximum wire size
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    max_frame_size: usize,
}

impl Codec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a message into a buffer
    ///
    /// Messages that would not fit the receiver's bounded read are refused
    /// here rather than truncated on the wire.
    pub fn encode(&self, message: &Message, buf: &mut BytesMut) -> CodecResult<()> {
        let payload = serde_json::to_vec(message)?;

        if payload.len() > self.max_frame_size {
            return Err(CodecError::TooLarge(payload.len(), self.max_frame_size));
        }

        buf.reserve(payload.len());
        buf.put_slice(&payload);
        Ok(())
    }

    /// Encode a message into a fresh byte vector
    pub fn encode_to_vec(&self, message: &Message) -> CodecResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode(message, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode any message
    pub fn decode(&self, buf: &[u8]) -> CodecResult<Message> {
        if buf.is_empty() {
            return Err(CodecError::Empty);
        }
        if buf.len() > self.max_frame_size {
            return Err(CodecError::TooLarge(buf.len(), self.max_frame_size));
        }
        Ok(serde_json::from_slice(buf)?)
    }

    /// Decode a discovery datagram; only `HELLO` is accepted
    pub fn decode_announcement(&self, buf: &[u8]) -> CodecResult<Announcement> {
        match self.decode(buf)? {
            Message::Hello(hello) => Ok(hello),
            other => Err(CodecError::UnexpectedKind(other.type_name())),
        }
    }

    /// Decode a TCP frame; only `CHAT` and `GROUP` are accepted
    pub fn decode_chat(&self, buf: &[u8]) -> CodecResult<(MessageKind, ChatMessage)> {
        let message = self.decode(buf)?;
        let type_name = message.type_name();
        message
            .into_chat()
            .ok_or(CodecError::UnexpectedKind(type_name))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_announcement() {
        let codec = Codec::default();
        let hello = codec
            .decode_announcement(br#"{"type": "HELLO", "user": "carol", "port": 6001}"#)
            .unwrap();
        assert_eq!(hello, Announcement::new("carol", 6001));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let codec = Codec::default();
        let err = codec
            .decode(br#"{"type": "PING", "user": "x", "port": 1}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = Codec::default();
        assert!(matches!(codec.decode(b"not json"), Err(CodecError::Json(_))));
        assert!(matches!(codec.decode(b""), Err(CodecError::Empty)));
    }

    #[test]
    fn test_hello_on_tcp_rejected() {
        let codec = Codec::default();
        let err = codec
            .decode_chat(br#"{"type": "HELLO", "user": "x", "port": 1}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedKind("HELLO")));
    }

    #[test]
    fn test_chat_on_udp_rejected() {
        let codec = Codec::default();
        let frame = codec
            .encode_to_vec(&Message::Chat(ChatMessage::new("a", "b", 1)))
            .unwrap();
        let err = codec.decode_announcement(&frame).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedKind("CHAT")));
    }

    #[test]
    fn test_oversized_message_refused() {
        let codec = Codec::new(64);
        let big = "x".repeat(128);
        let err = codec
            .encode_to_vec(&Message::Chat(ChatMessage::new("a", big, 1)))
            .unwrap_err();
        assert!(matches!(err, CodecError::TooLarge(_, 64)));
    }

    #[test]
    fn test_group_frame_decodes_with_kind() {
        let codec = Codec::default();
        let body = ChatMessage::new("dave", "hello all", 3);
        let frame = codec
            .encode_to_vec(&Message::Group(body.clone()))
            .unwrap();
        let (kind, decoded) = codec.decode_chat(&frame).unwrap();
        assert_eq!(kind, MessageKind::Group);
        assert_eq!(decoded, body);
    }
}
