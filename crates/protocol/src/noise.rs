//! Noise IK handshake and directional cipher states.
//!
//! The client already knows the server's static key, so the handshake
//! completes in one round trip and authenticates both sides:
//!
//! ```text
//! -> e, es, s, ss          (payload: CBOR client hello)
//! <- e, ee, se, psk
//! ```
//!
//! The all-zero PSK is mixed in at slot 2, which makes the full protocol name
//! `Noise_IKpsk2_25519_AESGCM_SHA256` for the default suite.
//!
//! On the wire both sides send two length-delimited frames: negotiation data
//! (the protocol magic from the client, an empty echo from the server)
//! followed by the Noise message.

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snow::params::NoiseParams;
use snow::{Builder, HandshakeState, StatelessTransportState};

use crate::auth::AuthProvider;
use crate::cbor::to_cbor;
use crate::error::{ProtocolError, Result};
use crate::framing::{read_frame, write_frame};
use crate::keys::{parse_public_key, KeyFingerprint, StaticKeyPair, KEY_LENGTH};
use crate::messages::ClientHello;

/// Negotiation data identifying the protocol and its version.
pub const NEGOTIATION_DATA: &[u8] = b"SecretD_Handshake_1_0";

/// Maximum size for a Noise protocol message.
pub const MAX_NOISE_MESSAGE_SIZE: usize = 65535;

/// Overhead added by Noise encryption (AEAD tag).
pub const NOISE_OVERHEAD: usize = 16;

/// Largest plaintext that fits a single sealed message.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_NOISE_MESSAGE_SIZE - NOISE_OVERHEAD;

/// Length of the pre-shared key.
pub const PSK_LENGTH: usize = 32;

/// Handshake message index the PSK is mixed into.
pub const PSK_LOCATION: u8 = 2;

/// Diffie-Hellman function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DhChoice {
    /// X25519.
    #[default]
    #[serde(rename = "25519")]
    Curve25519,
}

/// AEAD cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherChoice {
    /// AES-256-GCM.
    #[default]
    #[serde(rename = "AESGCM")]
    AesGcm,
    /// ChaCha20-Poly1305.
    #[serde(rename = "ChaChaPoly")]
    ChaChaPoly,
}

/// Hash function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashChoice {
    /// SHA-256.
    #[default]
    #[serde(rename = "SHA256")]
    Sha256,
    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
    /// BLAKE2s.
    #[serde(rename = "BLAKE2s")]
    Blake2s,
    /// BLAKE2b.
    #[serde(rename = "BLAKE2b")]
    Blake2b,
}

/// The DH / AEAD / hash triple used by the handshake.
///
/// The default is what the server speaks: 25519, AES-GCM, SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CipherSuite {
    /// Diffie-Hellman function.
    #[serde(default)]
    pub dh: DhChoice,
    /// AEAD cipher.
    #[serde(default)]
    pub cipher: CipherChoice,
    /// Hash function.
    #[serde(default)]
    pub hash: HashChoice,
}

impl CipherSuite {
    /// Full Noise protocol name for the IK pattern with the PSK at slot 2.
    pub fn protocol_name(&self) -> String {
        let dh = match self.dh {
            DhChoice::Curve25519 => "25519",
        };
        let cipher = match self.cipher {
            CipherChoice::AesGcm => "AESGCM",
            CipherChoice::ChaChaPoly => "ChaChaPoly",
        };
        let hash = match self.hash {
            HashChoice::Sha256 => "SHA256",
            HashChoice::Sha512 => "SHA512",
            HashChoice::Blake2s => "BLAKE2s",
            HashChoice::Blake2b => "BLAKE2b",
        };
        format!("Noise_IKpsk{}_{}_{}_{}", PSK_LOCATION, dh, cipher, hash)
    }

    fn params(&self) -> Result<NoiseParams> {
        self.protocol_name()
            .parse()
            .map_err(|e| ProtocolError::HandshakeSetup(format!("invalid noise pattern: {}", e)))
    }
}

/// Prefix negotiation data with its 2-byte big-endian length.
///
/// The result is the handshake prologue, so tampering with the negotiation
/// data makes the handshake fail.
pub fn make_prologue(negotiation_data: &[u8]) -> Vec<u8> {
    let mut prologue = Vec::with_capacity(negotiation_data.len() + 2);
    prologue.extend_from_slice(&(negotiation_data.len() as u16).to_be_bytes());
    prologue.extend_from_slice(negotiation_data);
    prologue
}

/// Everything needed to build one handshake state.
///
/// Built fresh per connection attempt.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// DH / AEAD / hash selection.
    pub suite: CipherSuite,
    /// True for the side that sends the first message.
    pub initiator: bool,
    /// Data bound into the transcript before the first message.
    pub prologue: Vec<u8>,
    /// Pre-shared key mixed in at [`PSK_LOCATION`].
    pub psk: [u8; PSK_LENGTH],
    /// The peer's static key; required for the initiator of IK.
    pub remote_static: Option<[u8; KEY_LENGTH]>,
    /// Our static key pair.
    pub local_static: StaticKeyPair,
}

impl HandshakeConfig {
    /// Configuration for the connecting side.
    pub fn initiator(
        suite: CipherSuite,
        remote_static: [u8; KEY_LENGTH],
        local_static: StaticKeyPair,
    ) -> Self {
        Self {
            suite,
            initiator: true,
            prologue: make_prologue(NEGOTIATION_DATA),
            psk: [0u8; PSK_LENGTH],
            remote_static: Some(remote_static),
            local_static,
        }
    }

    /// Configuration for the accepting side.
    pub fn responder(suite: CipherSuite, local_static: StaticKeyPair) -> Self {
        Self {
            suite,
            initiator: false,
            prologue: make_prologue(NEGOTIATION_DATA),
            psk: [0u8; PSK_LENGTH],
            remote_static: None,
            local_static,
        }
    }

    /// Build the handshake state.
    pub fn build(&self) -> Result<HandshakeState> {
        let mut builder = Builder::new(self.suite.params()?)
            .prologue(&self.prologue)
            .psk(PSK_LOCATION, &self.psk)
            .local_private_key(self.local_static.private_key());
        if let Some(remote) = &self.remote_static {
            builder = builder.remote_public_key(remote);
        }

        let built = if self.initiator {
            builder.build_initiator()
        } else {
            builder.build_responder()
        };
        built.map_err(|e| {
            ProtocolError::HandshakeSetup(format!("failed to build handshake state: {}", e))
        })
    }
}

/// Drives the client side of the handshake.
///
/// Generic over the authentication method; `&P` works as well as `P`.
#[derive(Debug, Clone)]
pub struct Handshake<P> {
    suite: CipherSuite,
    remote_public_key: [u8; KEY_LENGTH],
    provider: P,
}

impl<P: AuthProvider> Handshake<P> {
    /// Create a handshake against a server whose static key is known.
    ///
    /// Fails with [`ProtocolError::KeyFormat`] if the key is not 32 bytes.
    pub fn new(suite: CipherSuite, remote_public_key: &[u8], provider: P) -> Result<Self> {
        Ok(Self {
            suite,
            remote_public_key: parse_public_key(remote_public_key)?,
            provider,
        })
    }

    /// Returns the selected cipher suite.
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Returns the server's static public key.
    pub fn remote_public_key(&self) -> &[u8; KEY_LENGTH] {
        &self.remote_public_key
    }

    /// Returns the handshake configuration for a new attempt.
    pub fn config(&self) -> HandshakeConfig {
        HandshakeConfig::initiator(
            self.suite,
            self.remote_public_key,
            self.provider.local_static_keypair().clone(),
        )
    }

    /// Send the client's half of the handshake.
    ///
    /// Writes the negotiation data frame followed by the Noise message whose
    /// payload is the CBOR client hello.
    pub fn initiate<W: Write + ?Sized>(&self, conn: &mut W) -> Result<InitiatedHandshake> {
        tracing::debug!(
            server = %KeyFingerprint::of(&self.remote_public_key),
            method = self.provider.name(),
            protocol = %self.suite.protocol_name(),
            "starting handshake"
        );

        let mut state = self.config().build()?;

        let hello = ClientHello::now(self.provider.name(), self.provider.auth_params());
        let hello_bytes = to_cbor(&hello)?;

        let mut buffer = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let len = state.write_message(&hello_bytes, &mut buffer).map_err(|e| {
            ProtocolError::HandshakeSetup(format!("failed to write handshake message: {}", e))
        })?;

        write_frame(conn, NEGOTIATION_DATA)?;
        write_frame(conn, &buffer[..len])?;
        conn.flush()?;

        Ok(InitiatedHandshake { state })
    }

    /// Run the whole handshake on a connection.
    pub fn perform<S: Read + Write + ?Sized>(&self, conn: &mut S) -> Result<CipherPair> {
        self.initiate(conn)?.finish(conn)
    }
}

/// A handshake whose first message has been sent.
pub struct InitiatedHandshake {
    state: HandshakeState,
}

impl InitiatedHandshake {
    /// Read the server's reply and derive the session keys.
    ///
    /// I/O failures map to [`ProtocolError::ConnectionClosed`]. A non-empty
    /// negotiation echo and a failed Noise read both map to
    /// [`ProtocolError::Handshake`].
    pub fn finish<R: Read + ?Sized>(mut self, conn: &mut R) -> Result<CipherPair> {
        let negotiation_data = read_frame(conn).map_err(connection_closed)?;
        if !negotiation_data.is_empty() {
            tracing::warn!(
                len = negotiation_data.len(),
                "server rejected negotiation data"
            );
            return Err(ProtocolError::Handshake);
        }

        let message = read_frame(conn).map_err(connection_closed)?;
        let mut payload = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        if let Err(e) = self.state.read_message(&message, &mut payload) {
            tracing::warn!(error = %e, "handshake response rejected");
            return Err(ProtocolError::Handshake);
        }
        if !self.state.is_handshake_finished() {
            return Err(ProtocolError::Handshake);
        }

        tracing::debug!("handshake complete");
        CipherPair::from_handshake(self.state)
    }
}

impl std::fmt::Debug for InitiatedHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitiatedHandshake").finish_non_exhaustive()
    }
}

fn connection_closed(err: ProtocolError) -> ProtocolError {
    ProtocolError::ConnectionClosed(err.to_string())
}

/// Send and receive cipher states produced by a finished handshake.
#[derive(Debug)]
pub struct CipherPair {
    /// Seals outgoing messages.
    pub send: SendCipher,
    /// Opens incoming messages.
    pub receive: ReceiveCipher,
}

impl CipherPair {
    /// Split a finished handshake into its two directions.
    ///
    /// Works for either role; the transport knows which key is which.
    pub fn from_handshake(state: HandshakeState) -> Result<Self> {
        let transport = Arc::new(
            state
                .into_stateless_transport_mode()
                .map_err(|_| ProtocolError::Handshake)?,
        );
        Ok(Self {
            send: SendCipher {
                transport: Arc::clone(&transport),
                nonce: 0,
            },
            receive: ReceiveCipher {
                transport,
                nonce: 0,
            },
        })
    }
}

/// Outgoing direction: key plus nonce counter.
pub struct SendCipher {
    transport: Arc<StatelessTransportState>,
    nonce: u64,
}

impl SendCipher {
    /// Seal one message with no associated data.
    ///
    /// Returns the ciphertext including the authentication tag.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: plaintext.len() + NOISE_OVERHEAD,
                max: MAX_NOISE_MESSAGE_SIZE,
            });
        }
        if self.nonce == u64::MAX {
            return Err(ProtocolError::Encryption("nonce space exhausted".to_string()));
        }

        let mut out = vec![0u8; plaintext.len() + NOISE_OVERHEAD];
        let len = self
            .transport
            .write_message(self.nonce, plaintext, &mut out)
            .map_err(|e| ProtocolError::Encryption(e.to_string()))?;
        out.truncate(len);
        self.nonce += 1;
        Ok(out)
    }

    /// Number of messages sealed so far.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl std::fmt::Debug for SendCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendCipher")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

/// Incoming direction: key plus nonce counter.
pub struct ReceiveCipher {
    transport: Arc<StatelessTransportState>,
    nonce: u64,
}

impl ReceiveCipher {
    /// Open one message with no associated data.
    ///
    /// A failed open leaves the counter untouched, but the session it
    /// belongs to must be discarded.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NOISE_OVERHEAD {
            return Err(ProtocolError::Decryption(format!(
                "message of {} bytes is shorter than the authentication tag",
                ciphertext.len()
            )));
        }
        if self.nonce == u64::MAX {
            return Err(ProtocolError::Decryption("nonce space exhausted".to_string()));
        }

        let mut out = vec![0u8; ciphertext.len()];
        let len = self
            .transport
            .read_message(self.nonce, ciphertext, &mut out)
            .map_err(|e| ProtocolError::Decryption(e.to_string()))?;
        out.truncate(len);
        self.nonce += 1;
        Ok(out)
    }

    /// Number of messages opened so far.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl std::fmt::Debug for ReceiveCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveCipher")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}
