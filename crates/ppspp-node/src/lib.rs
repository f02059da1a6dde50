//! PPSPP Node -- library crate for the handshake tool.
//!
//! Config loading and handshake rendering shared by main.rs and tests.

pub mod config;

use std::path::PathBuf;

use ppspp_protocol::{Handshake, HandshakeMessage, SupportedMessages};

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_or_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn dirs_or_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Multi-line, human readable summary of a decoded handshake.
pub fn describe_handshake(hs: &Handshake) -> String {
    let mut out = hs.to_string();
    let HandshakeMessage::Options(options) = &hs.message else {
        return out;
    };

    let supported = SupportedMessages::from_bytes(&options.supported_messages);
    out.push_str(&format!(
        "\n  version: {} (min {})\
         \n  swarm_id: {}\
         \n  integrity: {:?}\
         \n  chunk_addressing_method: {}\
         \n  live_discard_window: {}\
         \n  supported_messages: {} {:?}\
         \n  chunk_size: {}",
        options.version,
        options.min_version,
        hex::encode(&options.swarm_id),
        options.integrity,
        options.chunk_addressing_method,
        options.live_discard_window,
        hex::encode(&options.supported_messages),
        supported.types(),
        options.chunk_size,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppspp_protocol::{ContentIntegrity, HandshakeOptions, MessageType};

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/etc/ppspp.toml"), PathBuf::from("/etc/ppspp.toml"));
    }

    #[test]
    fn test_describe_goodbye() {
        let hs = Handshake {
            our_channel: 0,
            their_channel: 3,
            message: HandshakeMessage::Goodbye,
        };
        assert_eq!(describe_handshake(&hs), "[HANDSHAKE] Goodbye!");
    }

    #[test]
    fn test_describe_options() {
        let hs = Handshake {
            our_channel: 1,
            their_channel: 2,
            message: HandshakeMessage::Options(HandshakeOptions {
                swarm_id: vec![0xAB, 0xCD],
                integrity: ContentIntegrity::None,
                supported_messages: SupportedMessages::from_types(&[MessageType::Ack])
                    .into_bytes(),
                ..HandshakeOptions::default()
            }),
        };
        let text = describe_handshake(&hs);
        assert!(text.starts_with("[HANDSHAKE] LocCh: 1; RemCh: 2"));
        assert!(text.contains("swarm_id: abcd"));
        assert!(text.contains("supported_messages: 20 [Ack]"));
        assert!(text.ends_with("\n  chunk_size: 1024"));
    }
}
