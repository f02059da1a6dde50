//! HANDSHAKE option stream codec (RFC 7574 §7).
//!
//! Wire format: a sequence of `[tag:1][value]` options in ascending tag
//! order, terminated by the end marker `0xFF`.
//!
//! ```text
//! tag  field                          value
//! 0    version                        u8
//! 1    min_version                    u8
//! 2    swarm_id                       u16 length + bytes
//! 3    content_integrity_protection   u8
//! 4    merkle_hash_function           u8   (Merkle hash tree only)
//! 5    live_signature_algorithm       u8   (sign-all / unified Merkle only)
//! 6    chunk_addressing_method        u8
//! 7    live_discard_window            i32  (omitted when 0)
//! 8    supported_messages             u8 length + bitmap
//! 9    chunk_size                     u32
//! 255  end marker
//! ```
//!
//! The decoder accepts options in any order and any subset. Options missing
//! from the wire keep the caller-supplied defaults.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{ChannelId, ProtocolError, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION};

// ============================================================================
// Option tags
// ============================================================================

pub const TAG_VERSION: u8 = 0;
pub const TAG_MIN_VERSION: u8 = 1;
pub const TAG_SWARM_ID: u8 = 2;
pub const TAG_CONTENT_INTEGRITY: u8 = 3;
pub const TAG_MERKLE_HASH_FUNCTION: u8 = 4;
pub const TAG_LIVE_SIGNATURE_ALGORITHM: u8 = 5;
pub const TAG_CHUNK_ADDRESSING: u8 = 6;
pub const TAG_LIVE_DISCARD_WINDOW: u8 = 7;
pub const TAG_SUPPORTED_MESSAGES: u8 = 8;
pub const TAG_CHUNK_SIZE: u8 = 9;
/// Terminates the option stream.
pub const TAG_END: u8 = 255;

/// Largest swarm identifier the 16-bit length prefix can describe.
pub const MAX_SWARM_ID_LEN: usize = u16::MAX as usize;

/// Largest supported-messages bitmap the 8-bit length prefix can describe.
pub const MAX_SUPPORTED_MESSAGES_LEN: usize = u8::MAX as usize;

// Merkle hash functions (RFC 7574 §7.4)
pub const MERKLE_HASH_SHA1: u8 = 0;
pub const MERKLE_HASH_SHA224: u8 = 1;
pub const MERKLE_HASH_SHA256: u8 = 2;
pub const MERKLE_HASH_SHA384: u8 = 3;
pub const MERKLE_HASH_SHA512: u8 = 4;

// Chunk addressing methods (RFC 7574 §7.5)
pub const CHUNK_ADDRESSING_BINS_32: u8 = 0;
pub const CHUNK_ADDRESSING_BYTE_RANGES_64: u8 = 1;
pub const CHUNK_ADDRESSING_CHUNK_RANGES_32: u8 = 2;
pub const CHUNK_ADDRESSING_BINS_64: u8 = 3;
pub const CHUNK_ADDRESSING_CHUNK_RANGES_64: u8 = 4;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

// ============================================================================
// Data model
// ============================================================================

/// Content integrity protection method code (tag 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentIntegrityProtection {
    None = 0,
    MerkleHashTree = 1,
    SignAll = 2,
    UnifiedMerkle = 3,
}

impl TryFrom<u8> for ContentIntegrityProtection {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::MerkleHashTree),
            2 => Ok(Self::SignAll),
            3 => Ok(Self::UnifiedMerkle),
            _ => Err(ProtocolError::InvalidEnumValue {
                field: "content_integrity_protection",
                value,
            }),
        }
    }
}

/// Integrity scheme together with the algorithm it depends on.
///
/// Only the scheme's own algorithm exists, so the encoder can never emit a
/// tag 4 or 5 that does not belong to the selected method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ContentIntegrity {
    None,
    MerkleHashTree { hash_function: u8 },
    SignAll { signature_algorithm: u8 },
    UnifiedMerkle { signature_algorithm: u8 },
}

impl ContentIntegrity {
    pub fn protection(&self) -> ContentIntegrityProtection {
        match self {
            Self::None => ContentIntegrityProtection::None,
            Self::MerkleHashTree { .. } => ContentIntegrityProtection::MerkleHashTree,
            Self::SignAll { .. } => ContentIntegrityProtection::SignAll,
            Self::UnifiedMerkle { .. } => ContentIntegrityProtection::UnifiedMerkle,
        }
    }

    pub fn merkle_hash_function(&self) -> Option<u8> {
        match self {
            Self::MerkleHashTree { hash_function } => Some(*hash_function),
            _ => None,
        }
    }

    pub fn live_signature_algorithm(&self) -> Option<u8> {
        match self {
            Self::SignAll {
                signature_algorithm,
            }
            | Self::UnifiedMerkle {
                signature_algorithm,
            } => Some(*signature_algorithm),
            _ => None,
        }
    }

    /// Build a scheme from a method code and whichever algorithms are known.
    pub fn from_parts(
        protection: ContentIntegrityProtection,
        merkle_hash_function: Option<u8>,
        live_signature_algorithm: Option<u8>,
    ) -> Self {
        match protection {
            ContentIntegrityProtection::None => Self::None,
            ContentIntegrityProtection::MerkleHashTree => Self::MerkleHashTree {
                hash_function: merkle_hash_function.unwrap_or(MERKLE_HASH_SHA256),
            },
            ContentIntegrityProtection::SignAll => Self::SignAll {
                signature_algorithm: live_signature_algorithm.unwrap_or(0),
            },
            ContentIntegrityProtection::UnifiedMerkle => Self::UnifiedMerkle {
                signature_algorithm: live_signature_algorithm.unwrap_or(0),
            },
        }
    }
}

impl Default for ContentIntegrity {
    fn default() -> Self {
        Self::MerkleHashTree {
            hash_function: MERKLE_HASH_SHA256,
        }
    }
}

/// Negotiable session parameters carried by one peer's handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeOptions {
    pub version: u8,
    pub min_version: u8,
    #[serde(with = "hex_bytes")]
    pub swarm_id: Vec<u8>,
    pub integrity: ContentIntegrity,
    pub chunk_addressing_method: u8,
    /// 0 means the option is absent.
    pub live_discard_window: i32,
    /// Bitmap of understood message types; its length is the declared length.
    #[serde(with = "hex_bytes")]
    pub supported_messages: Vec<u8>,
    pub chunk_size: u32,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            min_version: MIN_PROTOCOL_VERSION,
            swarm_id: Vec::new(),
            integrity: ContentIntegrity::default(),
            chunk_addressing_method: CHUNK_ADDRESSING_CHUNK_RANGES_32,
            live_discard_window: 0,
            supported_messages: vec![0xFF, 0xFF],
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl HandshakeOptions {
    /// Exact number of bytes `encode_options` produces for these options.
    pub fn encoded_len(&self) -> usize {
        let mut len = 2 + 2 + (3 + self.swarm_id.len()) + 2 + 2;
        if self.integrity.merkle_hash_function().is_some()
            || self.integrity.live_signature_algorithm().is_some()
        {
            len += 2;
        }
        if self.live_discard_window != 0 {
            len += 5;
        }
        len + (2 + self.supported_messages.len()) + 5 + 1
    }
}

/// A handshake is either a normal option set or the closing goodbye.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    Options(HandshakeOptions),
    Goodbye,
}

impl HandshakeMessage {
    pub fn is_goodbye(&self) -> bool {
        matches!(self, Self::Goodbye)
    }

    /// Encode the options body (empty for goodbye).
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Options(options) => encode_options(options),
            Self::Goodbye => Ok(encode_goodbye()),
        }
    }

    /// Decode an options body. An empty body is a goodbye.
    pub fn decode_body(
        body: &[u8],
        defaults: &HandshakeOptions,
    ) -> Result<(Self, usize), ProtocolError> {
        if body.is_empty() {
            return Ok((Self::Goodbye, 0));
        }
        let (options, consumed) = decode_options(body, defaults)?;
        Ok((Self::Options(options), consumed))
    }
}

/// Handshake plus the channel bookkeeping of the session that owns it.
///
/// Channel ids are never part of the option stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub our_channel: ChannelId,
    pub their_channel: ChannelId,
    pub message: HandshakeMessage,
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            HandshakeMessage::Goodbye => write!(f, "[HANDSHAKE] Goodbye!"),
            HandshakeMessage::Options(_) => write!(
                f,
                "[HANDSHAKE] LocCh: {}; RemCh: {}",
                self.our_channel, self.their_channel
            ),
        }
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Encode options into a self-terminated option stream.
pub fn encode_options(options: &HandshakeOptions) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::with_capacity(options.encoded_len());
    encode_options_into(options, &mut buf)?;
    Ok(buf.to_vec())
}

/// Append the option stream for `options` to `dst`.
///
/// Size limits are checked before anything is written.
pub fn encode_options_into(
    options: &HandshakeOptions,
    dst: &mut BytesMut,
) -> Result<(), ProtocolError> {
    let swarm_len = check_len("swarm_id", options.swarm_id.len(), MAX_SWARM_ID_LEN)?;
    let supported_len = check_len(
        "supported_messages",
        options.supported_messages.len(),
        MAX_SUPPORTED_MESSAGES_LEN,
    )?;

    let start = dst.len();
    dst.reserve(options.encoded_len());

    dst.put_u8(TAG_VERSION);
    dst.put_u8(options.version);

    dst.put_u8(TAG_MIN_VERSION);
    dst.put_u8(options.min_version);

    dst.put_u8(TAG_SWARM_ID);
    dst.put_u16(swarm_len as u16);
    dst.extend_from_slice(&options.swarm_id);

    dst.put_u8(TAG_CONTENT_INTEGRITY);
    dst.put_u8(options.integrity.protection() as u8);

    if let Some(hash_function) = options.integrity.merkle_hash_function() {
        dst.put_u8(TAG_MERKLE_HASH_FUNCTION);
        dst.put_u8(hash_function);
    }

    if let Some(algorithm) = options.integrity.live_signature_algorithm() {
        dst.put_u8(TAG_LIVE_SIGNATURE_ALGORITHM);
        dst.put_u8(algorithm);
    }

    dst.put_u8(TAG_CHUNK_ADDRESSING);
    dst.put_u8(options.chunk_addressing_method);

    if options.live_discard_window != 0 {
        dst.put_u8(TAG_LIVE_DISCARD_WINDOW);
        dst.put_i32(options.live_discard_window);
    }

    dst.put_u8(TAG_SUPPORTED_MESSAGES);
    dst.put_u8(supported_len as u8);
    dst.extend_from_slice(&options.supported_messages);

    dst.put_u8(TAG_CHUNK_SIZE);
    dst.put_u32(options.chunk_size);

    dst.put_u8(TAG_END);

    tracing::debug!(
        bytes = dst.len() - start,
        integrity = ?options.integrity.protection(),
        "encoded handshake options"
    );
    Ok(())
}

/// Options body of the closing handshake: no tags and no end marker.
pub fn encode_goodbye() -> Vec<u8> {
    Vec::new()
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<usize, ProtocolError> {
    if len > max {
        return Err(ProtocolError::FieldTooLarge { field, len, max });
    }
    Ok(len)
}

// ============================================================================
// Decoder
// ============================================================================

/// Decode an option stream using `HandshakeOptions::default()` for absent options.
pub fn decode_options_default(data: &[u8]) -> Result<(HandshakeOptions, usize), ProtocolError> {
    decode_options(data, &HandshakeOptions::default())
}

/// Decode one option stream from the front of `data`.
///
/// Returns the options and the number of bytes consumed, end marker included.
/// Bytes after the end marker are left for the caller.
///
/// A content integrity method code above 3 fails the whole decode with
/// `InvalidEnumValue`; there is no pass-through for unknown schemes, since
/// the width and meaning of their dependent options are unknown.
pub fn decode_options(
    data: &[u8],
    defaults: &HandshakeOptions,
) -> Result<(HandshakeOptions, usize), ProtocolError> {
    let mut reader = OptionReader::new(data);
    let mut options = defaults.clone();

    // Tags 3/4/5 may arrive in any order; resolved once the stream ends.
    let mut protection = None;
    let mut merkle_hash_function = None;
    let mut live_signature_algorithm = None;

    loop {
        let offset = reader.position();
        let tag = reader
            .next_tag()
            .ok_or(ProtocolError::MissingTerminator { offset })?;

        match tag {
            TAG_VERSION => options.version = reader.read_u8()?,
            TAG_MIN_VERSION => options.min_version = reader.read_u8()?,
            TAG_SWARM_ID => {
                let len = reader.read_u16()? as usize;
                options.swarm_id = reader.take(len)?.to_vec();
            }
            TAG_CONTENT_INTEGRITY => {
                protection = Some(ContentIntegrityProtection::try_from(reader.read_u8()?)?);
            }
            TAG_MERKLE_HASH_FUNCTION => merkle_hash_function = Some(reader.read_u8()?),
            TAG_LIVE_SIGNATURE_ALGORITHM => live_signature_algorithm = Some(reader.read_u8()?),
            TAG_CHUNK_ADDRESSING => options.chunk_addressing_method = reader.read_u8()?,
            TAG_LIVE_DISCARD_WINDOW => options.live_discard_window = reader.read_i32()?,
            TAG_SUPPORTED_MESSAGES => {
                let len = reader.read_u8()? as usize;
                options.supported_messages = reader.take(len)?.to_vec();
            }
            TAG_CHUNK_SIZE => options.chunk_size = reader.read_u32()?,
            TAG_END => break,
            other => return Err(ProtocolError::UnknownTag { tag: other, offset }),
        }
        tracing::trace!(tag, offset, "decoded handshake option");
    }

    options.integrity = ContentIntegrity::from_parts(
        protection.unwrap_or_else(|| defaults.integrity.protection()),
        merkle_hash_function.or_else(|| defaults.integrity.merkle_hash_function()),
        live_signature_algorithm.or_else(|| defaults.integrity.live_signature_algorithm()),
    );

    let consumed = reader.position();
    tracing::debug!(
        bytes = consumed,
        integrity = ?options.integrity.protection(),
        "decoded handshake options"
    );
    Ok((options, consumed))
}

/// Result of stepping over one option without decoding its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionScan {
    /// Option complete; the next one starts at this offset.
    Next(usize),
    /// End marker found; the stream is this many bytes long.
    End(usize),
    /// More bytes are needed to finish the option.
    Incomplete,
    /// Unrecognised tag; its width is unknown.
    Unknown,
}

/// Step over the option starting at `offset` using the tag width rules only.
pub(crate) fn scan_option(data: &[u8], offset: usize) -> OptionScan {
    let Some(&tag) = data.get(offset) else {
        return OptionScan::Incomplete;
    };
    let value = offset + 1;
    let value_len = match tag {
        TAG_END => return OptionScan::End(value),
        TAG_SWARM_ID => match data.get(value..value + 2) {
            Some(mut len) => 2 + len.get_u16() as usize,
            None => return OptionScan::Incomplete,
        },
        TAG_SUPPORTED_MESSAGES => match data.get(value) {
            Some(len) => 1 + *len as usize,
            None => return OptionScan::Incomplete,
        },
        TAG_LIVE_DISCARD_WINDOW | TAG_CHUNK_SIZE => 4,
        TAG_VERSION..=TAG_CHUNK_ADDRESSING => 1,
        _ => return OptionScan::Unknown,
    };
    let next = value + value_len;
    if next > data.len() {
        return OptionScan::Incomplete;
    }
    OptionScan::Next(next)
}

/// Bounded cursor over an immutable buffer. Every read checks the remaining length.
struct OptionReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OptionReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn next_tag(&mut self) -> Option<u8> {
        let tag = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(tag)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if len > self.remaining() {
            return Err(ProtocolError::TruncatedInput {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(self.take(2)?.get_u16())
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(self.take(4)?.get_u32())
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.take(4)?.get_i32())
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Serialize/deserialize Vec<u8> as a hex string.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
