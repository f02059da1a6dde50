//! PPSPP Protocol -- HANDSHAKE option codec, message types, stream codec.
//!
//! Peer-to-Peer Streaming Peer Protocol (RFC 7574). A handshake carries the
//! negotiated session options as a tagged option stream terminated by 0xFF.
//! All multi-byte integers are big-endian.

pub mod codec;
pub mod handshake;
pub mod messages;

pub use codec::HandshakeCodec;
pub use handshake::{
    decode_options, decode_options_default, encode_goodbye, encode_options, encode_options_into,
    ContentIntegrity, ContentIntegrityProtection, Handshake, HandshakeMessage, HandshakeOptions,
};
pub use messages::{decode_handshake, encode_handshake, MessageType, SupportedMessages};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Lowest protocol version we accept from a peer.
pub const MIN_PROTOCOL_VERSION: u8 = 1;

/// Channel identifier assigned by the channel layer.
pub type ChannelId = u32;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated input at offset {offset}: need {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("unknown option tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("option stream ended at offset {offset} without end marker")]
    MissingTerminator { offset: usize },
    #[error("invalid value {value} for {field}")]
    InvalidEnumValue { field: &'static str, value: u8 },
    #[error("{field} too large: {len} bytes (max {max})")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("handshake body too large: {size} bytes buffered (max {max})")]
    BodyTooLarge { size: usize, max: usize },
    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),
    #[error("unexpected message type: expected {expected:?}, got {got:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        got: MessageType,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
