//! Message type registry and the HANDSHAKE envelope.
//!
//! The channel layer wraps each handshake body as:
//!
//! ```text
//! [message type:1][source channel:4 BE][options body]
//! ```
//!
//! A goodbye is the same envelope with an empty body.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::handshake::{encode_options_into, Handshake, HandshakeMessage, HandshakeOptions};
use crate::{ChannelId, ProtocolError};

/// Envelope header size: message type + channel id.
pub const ENVELOPE_HEADER_SIZE: usize = 5;

// ============================================================================
// Message types (RFC 7574 §8.1)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageType {
    Handshake = 0,
    Data = 1,
    Ack = 2,
    Have = 3,
    Integrity = 4,
    PexResV4 = 5,
    PexReq = 6,
    SignedIntegrity = 7,
    Request = 8,
    Cancel = 9,
    Choke = 10,
    Unchoke = 11,
    PexResV6 = 12,
    PexResCert = 13,
}

impl MessageType {
    pub const ALL: [MessageType; 14] = [
        Self::Handshake,
        Self::Data,
        Self::Ack,
        Self::Have,
        Self::Integrity,
        Self::PexResV4,
        Self::PexReq,
        Self::SignedIntegrity,
        Self::Request,
        Self::Cancel,
        Self::Choke,
        Self::Unchoke,
        Self::PexResV6,
        Self::PexResCert,
    ];
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(ProtocolError::UnknownMessageType(value))
    }
}

// ============================================================================
// Supported messages bitmap
// ============================================================================

/// Bitmap of message types a peer understands (handshake tag 8).
///
/// Bit for type `t` is `0x80 >> (t % 8)` in byte `t / 8`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedMessages(Vec<u8>);

impl SupportedMessages {
    pub fn from_types(types: &[MessageType]) -> Self {
        let mut bitmap = Vec::new();
        for ty in types {
            let index = *ty as usize / 8;
            if bitmap.len() <= index {
                bitmap.resize(index + 1, 0);
            }
            bitmap[index] |= 0x80 >> (*ty as u8 % 8);
        }
        Self(bitmap)
    }

    /// Every message type this implementation knows.
    pub fn all() -> Self {
        Self::from_types(&MessageType::ALL)
    }

    pub fn from_bytes(bitmap: &[u8]) -> Self {
        Self(bitmap.to_vec())
    }

    pub fn contains(&self, ty: MessageType) -> bool {
        self.0
            .get(ty as usize / 8)
            .is_some_and(|byte| byte & (0x80 >> (ty as u8 % 8)) != 0)
    }

    /// Known message types set in the bitmap.
    pub fn types(&self) -> Vec<MessageType> {
        MessageType::ALL
            .into_iter()
            .filter(|ty| self.contains(*ty))
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl HandshakeOptions {
    pub fn supports(&self, ty: MessageType) -> bool {
        SupportedMessages::from_bytes(&self.supported_messages).contains(ty)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Wrap a handshake in its envelope, announcing `channel` as our source channel.
pub fn encode_handshake(
    channel: ChannelId,
    message: &HandshakeMessage,
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE);
    buf.put_u8(MessageType::Handshake as u8);
    buf.put_u32(channel);
    if let HandshakeMessage::Options(options) = message {
        encode_options_into(options, &mut buf)?;
    }
    Ok(buf.to_vec())
}

/// Unwrap one handshake envelope from the front of `data`.
///
/// The announced source channel becomes `their_channel`; `our_channel` is
/// left at 0 for the channel layer to fill in. Nothing after the channel id
/// means goodbye.
pub fn decode_handshake(
    data: &[u8],
    defaults: &HandshakeOptions,
) -> Result<(Handshake, usize), ProtocolError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(ProtocolError::TruncatedInput {
            offset: 0,
            needed: ENVELOPE_HEADER_SIZE,
            remaining: data.len(),
        });
    }

    let ty = MessageType::try_from(data[0])?;
    if ty != MessageType::Handshake {
        return Err(ProtocolError::UnexpectedMessageType {
            expected: MessageType::Handshake,
            got: ty,
        });
    }
    let channel = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    let body = &data[ENVELOPE_HEADER_SIZE..];
    let (message, consumed) = HandshakeMessage::decode_body(body, defaults)
        .map_err(|e| shift_offset(e, ENVELOPE_HEADER_SIZE))?;

    tracing::debug!(
        channel,
        goodbye = message.is_goodbye(),
        "decoded handshake envelope"
    );
    Ok((
        Handshake {
            our_channel: 0,
            their_channel: channel,
            message,
        },
        ENVELOPE_HEADER_SIZE + consumed,
    ))
}

/// Report body offsets relative to the start of the envelope.
fn shift_offset(err: ProtocolError, by: usize) -> ProtocolError {
    match err {
        ProtocolError::TruncatedInput {
            offset,
            needed,
            remaining,
        } => ProtocolError::TruncatedInput {
            offset: offset + by,
            needed,
            remaining,
        },
        ProtocolError::UnknownTag { tag, offset } => ProtocolError::UnknownTag {
            tag,
            offset: offset + by,
        },
        ProtocolError::MissingTerminator { offset } => ProtocolError::MissingTerminator {
            offset: offset + by,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::ContentIntegrity;

    #[test]
    fn test_message_type_codes() {
        assert_eq!(MessageType::try_from(0).unwrap(), MessageType::Handshake);
        assert_eq!(MessageType::try_from(13).unwrap(), MessageType::PexResCert);
        assert!(matches!(
            MessageType::try_from(14),
            Err(ProtocolError::UnknownMessageType(14))
        ));
        for ty in MessageType::ALL {
            assert_eq!(MessageType::try_from(ty as u8).unwrap(), ty);
        }
    }

    #[test]
    fn test_supported_messages_bitmap() {
        let all = SupportedMessages::all();
        assert_eq!(all.as_bytes(), &[0xFF, 0xFC]);
        assert_eq!(all.types().len(), MessageType::ALL.len());

        let some = SupportedMessages::from_types(&[MessageType::Handshake, MessageType::Ack]);
        assert_eq!(some.as_bytes(), &[0b1010_0000]);
        assert!(some.contains(MessageType::Ack));
        assert!(!some.contains(MessageType::Data));
        assert!(!some.contains(MessageType::Choke));
    }

    #[test]
    fn test_default_options_support_everything() {
        let options = HandshakeOptions::default();
        for ty in MessageType::ALL {
            assert!(options.supports(ty));
        }
    }

    #[test]
    fn test_envelope_roundtrip() {
        let options = HandshakeOptions {
            swarm_id: vec![1, 2, 3],
            integrity: ContentIntegrity::None,
            ..HandshakeOptions::default()
        };
        let msg = HandshakeMessage::Options(options.clone());
        let wire = encode_handshake(0xDEAD_BEEF, &msg).unwrap();
        assert_eq!(&wire[..5], &[0x00, 0xDE, 0xAD, 0xBE, 0xEF]);

        let (hs, consumed) = decode_handshake(&wire, &HandshakeOptions::default()).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(hs.their_channel, 0xDEAD_BEEF);
        assert_eq!(hs.message, msg);
    }

    #[test]
    fn test_goodbye_envelope() {
        let wire = encode_handshake(0, &HandshakeMessage::Goodbye).unwrap();
        assert_eq!(wire, vec![0, 0, 0, 0, 0]);
        assert!(!wire.contains(&0xFF));

        let (hs, consumed) = decode_handshake(&wire, &HandshakeOptions::default()).unwrap();
        assert!(hs.message.is_goodbye());
        assert_eq!(consumed, 5);
        assert_eq!(hs.to_string(), "[HANDSHAKE] Goodbye!");
    }

    #[test]
    fn test_wrong_message_type() {
        let wire = [MessageType::Data as u8, 0, 0, 0, 1, 255];
        assert!(matches!(
            decode_handshake(&wire, &HandshakeOptions::default()),
            Err(ProtocolError::UnexpectedMessageType {
                expected: MessageType::Handshake,
                got: MessageType::Data
            })
        ));
    }

    #[test]
    fn test_short_envelope() {
        assert!(matches!(
            decode_handshake(&[0, 0, 0], &HandshakeOptions::default()),
            Err(ProtocolError::TruncatedInput {
                offset: 0,
                needed: 5,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_body_error_offsets_are_envelope_relative() {
        let wire = [0, 0, 0, 0, 1, 0, 1, 77];
        assert!(matches!(
            decode_handshake(&wire, &HandshakeOptions::default()),
            Err(ProtocolError::UnknownTag { tag: 77, offset: 7 })
        ));
    }
}
