//! Streaming codec for handshake option bodies.
//!
//! Wire format: back-to-back option streams, each ending at its 0xFF end
//! marker. There is no length prefix; the end marker delimits each body.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::handshake::{
    decode_options, encode_options_into, scan_option, HandshakeOptions, OptionScan,
};
use crate::ProtocolError;

/// Largest body a well-formed peer can send: every option once at full width.
pub const DEFAULT_MAX_BODY_LEN: usize = 64 * 1024 + 512;

/// Codec for framing handshake option bodies over a byte stream.
///
/// Options absent from a body are filled from `defaults`. `scanned` is the
/// last option boundary reached in a partial body; scanning resumes there.
#[derive(Debug, Clone)]
pub struct HandshakeCodec {
    defaults: HandshakeOptions,
    max_body_len: usize,
    scanned: usize,
}

impl HandshakeCodec {
    pub fn new(defaults: HandshakeOptions) -> Self {
        Self {
            defaults,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            scanned: 0,
        }
    }

    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    pub fn defaults(&self) -> &HandshakeOptions {
        &self.defaults
    }
}

impl Default for HandshakeCodec {
    fn default() -> Self {
        Self::new(HandshakeOptions::default())
    }
}

impl Decoder for HandshakeCodec {
    type Item = HandshakeOptions;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Skip over complete options until the end marker or the buffer edge
        loop {
            match scan_option(&src[..], self.scanned) {
                OptionScan::Next(next) => self.scanned = next,
                OptionScan::End(_) | OptionScan::Unknown => break,
                OptionScan::Incomplete => {
                    if src.len() > self.max_body_len {
                        return Err(ProtocolError::BodyTooLarge {
                            size: src.len(),
                            max: self.max_body_len,
                        });
                    }
                    return Ok(None);
                }
            }
        }

        // Terminated, or an unknown tag that decode_options reports
        self.scanned = 0;
        let (options, consumed) = decode_options(&src[..], &self.defaults)?;
        src.advance(consumed);
        Ok(Some(options))
    }
}

impl Encoder<HandshakeOptions> for HandshakeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: HandshakeOptions, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_options_into(&item, dst)
    }
}
