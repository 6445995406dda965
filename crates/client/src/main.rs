//! SecretD Client
//!
//! Command-line front end for the SecretD RPC client.

use std::path::PathBuf;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ciborium::Value;
use clap::{Parser, Subcommand};
use secretd_client::{Client, ClientConfig};
use secretd_protocol::cbor::display_value;
use secretd_protocol::StaticKeyPair;

/// SecretD Client - call a SecretD server over its Noise-encrypted RPC channel.
#[derive(Parser, Debug)]
#[command(name = "secretd-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Generate a new static key pair
    Keygen,

    /// Print the public key for a base64 private key
    PublicKey {
        /// Base64-encoded 32-byte private key
        private_key: String,
    },

    /// Call a method with JSON arguments and print the result as JSON
    Call {
        /// Remote method name
        method: String,

        /// Arguments as JSON (default: [])
        #[arg(default_value = "[]")]
        args: String,
    },

    /// Forward a base64-encoded sub-request and print the base64 reply
    Subrequest {
        /// Base64-encoded request bytes
        request: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        ClientConfig::load(config_path)?
    } else {
        ClientConfig::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.client.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Keygen => {
            let keypair = StaticKeyPair::generate();
            println!("private_key: {}", keypair.private_key_base64());
            println!("public_key:  {}", keypair.public_key_base64());
            println!("fingerprint: {}", keypair.fingerprint());
        }
        Commands::PublicKey { private_key } => {
            let keypair =
                StaticKeyPair::from_base64(&private_key).context("Invalid private key")?;
            println!("{}", keypair.public_key_base64());
        }
        Commands::Call { method, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("Arguments must be valid JSON")?;
            let client = connect(&config)?;
            let result: Value = client
                .call(&method, &args)
                .with_context(|| format!("Call to {} failed", method))?;
            let _ = client.close();
            println!("{}", serde_json::to_string_pretty(&cbor_to_json(result))?);
        }
        Commands::Subrequest { request } => {
            let request = BASE64
                .decode(request.trim())
                .context("Sub-request must be base64")?;
            let client = connect(&config)?;
            let reply = client
                .system_subrequest(&request)
                .context("Sub-request failed")?;
            let _ = client.close();
            println!("{}", BASE64.encode(reply));
        }
    }

    Ok(())
}

fn connect(config: &ClientConfig) -> anyhow::Result<Client<std::net::TcpStream>> {
    tracing::info!("Connecting to {}", config.server.address);
    Client::from_config(config)
        .with_context(|| format!("Failed to open session with {}", config.server.address))
}

/// Render a CBOR value as JSON. Byte strings become base64 text and
/// non-text map keys are stringified.
fn cbor_to_json(value: Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Integer(i) => {
            let i = i128::from(i);
            if let Ok(i) = i64::try_from(i) {
                Json::from(i)
            } else if let Ok(u) = u64::try_from(i) {
                Json::from(u)
            } else {
                Json::String(i.to_string())
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s),
        Value::Bytes(b) => Json::String(BASE64.encode(b)),
        Value::Array(items) => Json::Array(items.into_iter().map(cbor_to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Text(s) => s,
                        other => display_value(&other),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        Value::Tag(_, inner) => cbor_to_json(*inner),
        other => Json::String(display_value(&other)),
    }
}
