//! PPSPP Node -- build and inspect PPSPP handshakes.
//!
//! Usage:
//!   ppspp-node encode                     # Handshake from config, as hex
//!   ppspp-node --config path.toml encode  # Use a custom config
//!   ppspp-node decode <HEX> [--json]      # Decode a handshake envelope
//!   ppspp-node goodbye                    # Channel-closing handshake
//!   ppspp-node config                     # Show effective config

use clap::{Parser, Subcommand};

use ppspp_node::config::{self, decode_hex};
use ppspp_node::{describe_handshake, expand_tilde};
use ppspp_protocol::{decode_handshake, encode_handshake, HandshakeMessage};

#[derive(Parser)]
#[command(name = "ppspp-node", about = "PPSPP handshake builder and inspector")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.ppspp/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode our handshake as a hex envelope
    Encode {
        /// Source channel id to announce
        #[arg(long, default_value_t = 1)]
        channel: u32,
        /// Swarm id (hex), overrides the config
        #[arg(long)]
        swarm_id: Option<String>,
    },
    /// Decode a hex handshake envelope
    Decode {
        /// Envelope bytes as hex
        hex: String,
        /// Print options as JSON
        #[arg(long)]
        json: bool,
    },
    /// Encode the channel-closing handshake
    Goodbye {
        #[arg(long, default_value_t = 0)]
        channel: u32,
    },
    /// Show effective config
    Config,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ppspp_node=info,ppspp_protocol=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let cfg = config::NodeConfig::load_or_default(&config_path)?;

    match cli.command {
        Commands::Encode { channel, swarm_id } => {
            let mut options = cfg.handshake_options()?;
            if let Some(swarm_id) = swarm_id {
                options.swarm_id = decode_hex("--swarm-id", &swarm_id)?;
            }
            let wire = encode_handshake(channel, &HandshakeMessage::Options(options))?;
            tracing::info!(channel, bytes = wire.len(), "handshake encoded");
            println!("{}", hex::encode(wire));
        }
        Commands::Decode { hex: input, json } => {
            let data = decode_hex("input", &input)?;
            let defaults = cfg.handshake_options()?;
            let (hs, consumed) = decode_handshake(&data, &defaults)?;
            if consumed < data.len() {
                tracing::warn!(
                    consumed,
                    trailing = data.len() - consumed,
                    "bytes after handshake ignored"
                );
            }
            match (&hs.message, json) {
                (HandshakeMessage::Options(options), true) => {
                    println!("{}", serde_json::to_string_pretty(options)?);
                }
                _ => println!("{}", describe_handshake(&hs)),
            }
        }
        Commands::Goodbye { channel } => {
            let wire = encode_handshake(channel, &HandshakeMessage::Goodbye)?;
            println!("{}", hex::encode(wire));
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
    }

    Ok(())
}
