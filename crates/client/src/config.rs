//! Configuration management for the SecretD client.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/secretd/client.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secretd_protocol::keys::decode_public_key_base64;
use secretd_protocol::{CipherChoice, CipherSuite, HashChoice, StaticKeyPair, KEY_LENGTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("server address must not be empty")]
    EmptyAddress,

    #[error("server public_key is not a base64-encoded 32-byte key: {0}")]
    InvalidServerPublicKey(String),

    #[error("static_private_key is not a base64-encoded 32-byte key: {0}")]
    InvalidStaticPrivateKey(String),

    #[error("{0} is not configured")]
    Missing(&'static str),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Default server address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:7100";

/// Main configuration structure for the SecretD client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Server to connect to.
    pub server: ServerConfig,

    /// Client credentials.
    pub auth: AuthConfig,

    /// Noise cipher-suite selection.
    pub handshake: HandshakeSettings,

    /// General client settings.
    pub client: GeneralConfig,
}

/// Server endpoint and identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address, `host:port`.
    pub address: String,

    /// Server static public key, base64.
    pub public_key: String,
}

/// Client credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Client static private key, base64.
    pub static_private_key: String,
}

/// Cipher and hash used by the handshake. Must match the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HandshakeSettings {
    pub cipher: CipherChoice,
    pub hash: HashChoice,
}

/// General client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            public_key: String::new(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("secretd")
        .join("client.toml")
}

impl ClientConfig {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values; empty
    /// values are ignored. Supported variables:
    /// - SECRETD_ADDRESS
    /// - SECRETD_SERVER_PUBLIC_KEY
    /// - SECRETD_STATIC_PRIVATE_KEY
    /// - SECRETD_LOG_LEVEL
    pub fn apply_env_overrides(&mut self) {
        if let Some(address) = env_value("SECRETD_ADDRESS") {
            tracing::info!("Overriding server address from environment: {}", address);
            self.server.address = address;
        }

        if let Some(key) = env_value("SECRETD_SERVER_PUBLIC_KEY") {
            tracing::info!("Overriding server public key from environment");
            self.server.public_key = key;
        }

        if let Some(key) = env_value("SECRETD_STATIC_PRIVATE_KEY") {
            tracing::info!("Overriding static private key from environment");
            self.auth.static_private_key = key;
        }

        if let Some(level) = env_value("SECRETD_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.client.log_level = level;
        }
    }

    /// Validate the configuration values.
    ///
    /// Keys may be left empty here (commands such as `keygen` need none);
    /// present keys must decode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }

        if !self.server.public_key.is_empty() {
            decode_public_key_base64(&self.server.public_key)
                .map_err(|e| ConfigError::InvalidServerPublicKey(e.to_string()))?;
        }

        if !self.auth.static_private_key.is_empty() {
            StaticKeyPair::from_base64(&self.auth.static_private_key)
                .map_err(|e| ConfigError::InvalidStaticPrivateKey(e.to_string()))?;
        }

        let level = self.client.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.client.log_level.clone()));
        }

        Ok(())
    }

    /// Returns the cipher suite selected by the `[handshake]` section.
    pub fn cipher_suite(&self) -> CipherSuite {
        CipherSuite {
            cipher: self.handshake.cipher,
            hash: self.handshake.hash,
            ..CipherSuite::default()
        }
    }

    /// Decode the server public key.
    pub fn server_public_key(&self) -> Result<[u8; KEY_LENGTH], ConfigError> {
        if self.server.public_key.is_empty() {
            return Err(ConfigError::Missing("server.public_key"));
        }
        decode_public_key_base64(&self.server.public_key)
            .map_err(|e| ConfigError::InvalidServerPublicKey(e.to_string()))
    }

    /// Decode the client static key pair.
    pub fn static_keypair(&self) -> Result<StaticKeyPair, ConfigError> {
        if self.auth.static_private_key.is_empty() {
            return Err(ConfigError::Missing("auth.static_private_key"));
        }
        StaticKeyPair::from_base64(&self.auth.static_private_key)
            .map_err(|e| ConfigError::InvalidStaticPrivateKey(e.to_string()))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
