//! # SecretD Protocol Library
//!
//! Client side of the SecretD secure channel: a Noise IK handshake over a
//! raw byte stream, an encrypted session built from the resulting cipher
//! states, and the CBOR RPC wire format spoken inside it.
//!
//! ## Overview
//!
//! - **Handshake**: `Noise_IKpsk2_25519_AESGCM_SHA256`, one round trip,
//!   carrying a timestamped client hello with the authentication method
//! - **Framing**: two-byte big-endian length prefix, at most 65535 bytes
//! - **Session**: one sealed frame per write, frame-at-a-time reads behind
//!   `std::io::Read`/`Write`
//! - **Codec**: `[0, seq, method, body]` requests and
//!   `[1, seq, error, body]` responses read in two steps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          RPC Messages (codec)           │  CBOR arrays
//! ├─────────────────────────────────────────┤
//! │       Secure Session (session)          │  AES-256-GCM, per-direction nonce
//! ├─────────────────────────────────────────┤
//! │            Framing (framing)            │  u16 length prefix
//! ├─────────────────────────────────────────┤
//! │        Raw Connection (TCP/Unix)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::net::TcpStream;
//! use secretd_protocol::{
//!     CipherSuite, ClientCodec, Handshake, SecureSession, StaticKeyAuthProvider, StaticKeyPair,
//! };
//!
//! # fn main() -> secretd_protocol::Result<()> {
//! let provider = StaticKeyAuthProvider::new(StaticKeyPair::generate());
//! let server_key = [0u8; 32];
//! let handshake = Handshake::new(CipherSuite::default(), &server_key, provider)?;
//!
//! let conn = TcpStream::connect("127.0.0.1:7100")?;
//! let session = SecureSession::establish(conn, &handshake)?;
//!
//! let mut codec = ClientCodec::new(session);
//! codec.write_request(1, "system.ping", &())?;
//! let header = codec.read_response_header()?;
//! if header.is_error() {
//!     codec.discard_response_body()?;
//! } else {
//!     let _: ciborium::Value = codec.read_response_body()?;
//! }
//! codec.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`noise`]: Handshake parameters, the IK handshake and transport ciphers
//! - [`session`]: Encrypted session over a [`Connection`]
//! - [`codec`]: RPC request writer and response reader
//! - [`framing`]: Length-prefixed frames
//! - [`messages`]: Wire message layouts
//! - [`auth`]: Authentication providers
//! - [`keys`]: X25519 static keys
//! - [`cbor`]: CBOR helpers
//! - [`error`]: Error types

pub mod auth;
pub mod cbor;
pub mod codec;
pub mod error;
pub mod framing;
pub mod keys;
pub mod messages;
pub mod noise;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthProvider, StaticKeyAuthProvider};
pub use codec::{ClientCodec, NextRead};
pub use error::{ProtocolError, Result};
pub use framing::{read_frame, write_frame, LENGTH_PREFIX_SIZE, MAX_FRAME_PAYLOAD};
pub use keys::{KeyFingerprint, StaticKeyPair, KEY_LENGTH};
pub use messages::{ClientHello, MessageType, Request, ResponseHeader};
pub use noise::{
    CipherChoice, CipherPair, CipherSuite, DhChoice, Handshake, HandshakeConfig, HashChoice,
    InitiatedHandshake, ReceiveCipher, SendCipher, MAX_NOISE_MESSAGE_SIZE, MAX_PLAINTEXT_SIZE,
    NEGOTIATION_DATA, NOISE_OVERHEAD,
};
pub use session::{Connection, SecureSession};
