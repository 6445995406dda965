//! Curve25519 static key material.
//!
//! The handshake authenticates both sides with static Diffie-Hellman keys:
//! the client proves possession of its [`StaticKeyPair`], and it must know
//! the server's 32-byte public key before dialing. All length checks happen
//! here, before any network I/O.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{ProtocolError, Result};

/// Length of a Curve25519 private scalar or public point in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of a key fingerprint in bytes (SHA-256 output truncated to 16 bytes).
pub const FINGERPRINT_LENGTH: usize = 16;

/// A static Curve25519 key pair.
///
/// The public point is derived once from the private scalar at construction
/// and never changes afterwards.
#[derive(Clone)]
pub struct StaticKeyPair {
    private: [u8; KEY_LENGTH],
    public: [u8; KEY_LENGTH],
}

impl StaticKeyPair {
    /// Creates a key pair from a 32-byte private scalar.
    ///
    /// The public point is the scalar multiplied by the curve base point.
    /// This is a pure function of the scalar.
    pub fn from_private_key(private: [u8; KEY_LENGTH]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private,
            public: public.to_bytes(),
        }
    }

    /// Creates a key pair from a private scalar of unchecked length.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        let private: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ProtocolError::KeyFormat(format!("invalid private key length: {}", bytes.len()))
        })?;
        Ok(Self::from_private_key(private))
    }

    /// Creates a key pair from a base64 (standard alphabet) private scalar.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
            tracing::error!("cannot decode static private key");
            ProtocolError::from(e)
        })?;
        Self::from_private_bytes(&bytes)
    }

    /// Generates a new random key pair from the operating system RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_private_key(secret.to_bytes())
    }

    /// Returns the private scalar.
    ///
    /// **Security Warning**: only hand this to the handshake state or to
    /// secure storage.
    pub fn private_key(&self) -> &[u8; KEY_LENGTH] {
        &self.private
    }

    /// Returns the public point.
    pub fn public_key(&self) -> &[u8; KEY_LENGTH] {
        &self.public
    }

    /// Returns the private scalar encoded as base64.
    pub fn private_key_base64(&self) -> String {
        BASE64.encode(self.private)
    }

    /// Returns the public point encoded as base64.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public)
    }

    /// Returns the fingerprint of the public point.
    pub fn fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint::of(&self.public)
    }
}

impl std::fmt::Debug for StaticKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyPair")
            .field("public", &self.fingerprint())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Validates a remote static public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<[u8; KEY_LENGTH]> {
    bytes.try_into().map_err(|_| {
        ProtocolError::KeyFormat(format!("invalid public key length: {}", bytes.len()))
    })
}

/// Decodes and validates a base64 (standard alphabet) remote public key.
pub fn decode_public_key_base64(encoded: &str) -> Result<[u8; KEY_LENGTH]> {
    let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
        tracing::error!("cannot decode server public key");
        ProtocolError::from(e)
    })?;
    parse_public_key(&bytes)
}

/// Short, printable identifier of a public key.
///
/// Derived by hashing the key with SHA-256 and keeping the first 16 bytes,
/// so logs can name a peer without printing key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint([u8; FINGERPRINT_LENGTH]);

impl KeyFingerprint {
    /// Computes the fingerprint of a public key.
    pub fn of(public_key: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(public_key);
        let mut id = [0u8; FINGERPRINT_LENGTH];
        id.copy_from_slice(&hash[..FINGERPRINT_LENGTH]);
        Self(id)
    }

    /// Returns the raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }
}

impl std::fmt::Display for KeyFingerprint {
    /// Groups of 4 hex characters separated by colons,
    /// e.g. `a1b2:c3d4:e5f6:7890:1234:5678:9abc:def0`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups = self
            .0
            .chunks(2)
            .map(|chunk| format!("{:02x}{:02x}", chunk[0], chunk[1]))
            .collect::<Vec<_>>();
        f.write_str(&groups.join(":"))
    }
}

impl std::fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyFingerprint({})", self)
    }
}
