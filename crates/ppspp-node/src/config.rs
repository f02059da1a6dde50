//! Configuration types for ppspp-node.
//! Parsed from ~/.ppspp/config.toml.

use serde::{Deserialize, Serialize};
use std::path::Path;

use ppspp_protocol::handshake::{
    CHUNK_ADDRESSING_CHUNK_RANGES_32, DEFAULT_CHUNK_SIZE, MERKLE_HASH_SHA256,
};
use ppspp_protocol::{
    ContentIntegrity, ContentIntegrityProtection, HandshakeOptions, ProtocolError,
    MIN_PROTOCOL_VERSION, PROTOCOL_VERSION,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid hex in {field}: {source}")]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub handshake: HandshakeSection,
    #[serde(default)]
    pub swarm: SwarmSection,
}

/// Local handshake defaults offered to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeSection {
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default = "default_min_version")]
    pub min_version: u8,
    #[serde(default = "default_content_integrity_protection")]
    pub content_integrity_protection: u8,
    #[serde(default = "default_merkle_hash_function")]
    pub merkle_hash_function: u8,
    #[serde(default)]
    pub live_signature_algorithm: u8,
    #[serde(default = "default_chunk_addressing_method")]
    pub chunk_addressing_method: u8,
    #[serde(default)]
    pub live_discard_window: i32,
    /// Hex-encoded bitmap.
    #[serde(default = "default_supported_messages")]
    pub supported_messages: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self {
            version: default_version(),
            min_version: default_min_version(),
            content_integrity_protection: default_content_integrity_protection(),
            merkle_hash_function: default_merkle_hash_function(),
            live_signature_algorithm: 0,
            chunk_addressing_method: default_chunk_addressing_method(),
            live_discard_window: 0,
            supported_messages: default_supported_messages(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmSection {
    /// Hex-encoded swarm identifier; empty when unset.
    #[serde(default)]
    pub swarm_id: String,
}

// Default value functions
fn default_version() -> u8 {
    PROTOCOL_VERSION
}
fn default_min_version() -> u8 {
    MIN_PROTOCOL_VERSION
}
fn default_content_integrity_protection() -> u8 {
    ContentIntegrityProtection::MerkleHashTree as u8
}
fn default_merkle_hash_function() -> u8 {
    MERKLE_HASH_SHA256
}
fn default_chunk_addressing_method() -> u8 {
    CHUNK_ADDRESSING_CHUNK_RANGES_32
}
fn default_supported_messages() -> String {
    "ffff".into()
}
fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

impl NodeConfig {
    /// Load config from file, or use the default if missing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: NodeConfig = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Handshake options this node offers, built from the config.
    pub fn handshake_options(&self) -> Result<HandshakeOptions, ConfigError> {
        let hs = &self.handshake;
        let protection = ContentIntegrityProtection::try_from(hs.content_integrity_protection)?;
        Ok(HandshakeOptions {
            version: hs.version,
            min_version: hs.min_version,
            swarm_id: decode_hex("swarm.swarm_id", &self.swarm.swarm_id)?,
            integrity: ContentIntegrity::from_parts(
                protection,
                Some(hs.merkle_hash_function),
                Some(hs.live_signature_algorithm),
            ),
            chunk_addressing_method: hs.chunk_addressing_method,
            live_discard_window: hs.live_discard_window,
            supported_messages: decode_hex(
                "handshake.supported_messages",
                &hs.supported_messages,
            )?,
            chunk_size: hs.chunk_size,
        })
    }
}

pub fn decode_hex(field: &'static str, s: &str) -> Result<Vec<u8>, ConfigError> {
    hex::decode(s.trim()).map_err(|source| ConfigError::Hex { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.handshake.version, 1);
        assert_eq!(cfg.handshake.chunk_size, 1024);
        assert!(cfg.swarm.swarm_id.is_empty());

        let options = cfg.handshake_options().unwrap();
        assert_eq!(options, HandshakeOptions::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[handshake]
version = 2
min_version = 1
content_integrity_protection = 2
live_signature_algorithm = 13
chunk_addressing_method = 0
live_discard_window = 512
supported_messages = "ff00"
chunk_size = 8192

[swarm]
swarm_id = "abcd"
"#;

        let cfg: NodeConfig = toml::from_str(toml_str).unwrap();
        let options = cfg.handshake_options().unwrap();
        assert_eq!(options.version, 2);
        assert_eq!(options.swarm_id, vec![0xAB, 0xCD]);
        assert_eq!(
            options.integrity,
            ContentIntegrity::SignAll {
                signature_algorithm: 13
            }
        );
        assert_eq!(options.live_discard_window, 512);
        assert_eq!(options.supported_messages, vec![0xFF, 0x00]);
        assert_eq!(options.chunk_size, 8192);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: NodeConfig = toml::from_str("[handshake]\nchunk_size = 4096\n").unwrap();
        assert_eq!(cfg.handshake.chunk_size, 4096);
        assert_eq!(cfg.handshake.supported_messages, "ffff");
        assert_eq!(
            cfg.handshake.content_integrity_protection,
            ContentIntegrityProtection::MerkleHashTree as u8
        );
    }

    #[test]
    fn test_invalid_integrity_code() {
        let cfg: NodeConfig =
            toml::from_str("[handshake]\ncontent_integrity_protection = 9\n").unwrap();
        assert!(matches!(
            cfg.handshake_options(),
            Err(ConfigError::Protocol(ProtocolError::InvalidEnumValue { value: 9, .. }))
        ));
    }

    #[test]
    fn test_invalid_swarm_hex() {
        let cfg: NodeConfig = toml::from_str("[swarm]\nswarm_id = \"xyz\"\n").unwrap();
        assert!(matches!(
            cfg.handshake_options(),
            Err(ConfigError::Hex {
                field: "swarm.swarm_id",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[swarm]\nswarm_id = \"0102\"").unwrap();
        let cfg = NodeConfig::load_or_default(file.path()).unwrap();
        assert_eq!(cfg.swarm.swarm_id, "0102");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.handshake.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_serialise_default() {
        let cfg = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        assert!(toml_str.contains("[handshake]"));
        assert!(toml_str.contains("supported_messages"));
    }
}
