//! # SecretD Client
//!
//! Blocking RPC client for a SecretD server. A [`Client`] owns one encrypted
//! session and runs calls on it one at a time: each call writes a request,
//! reads the matching response header, then decodes or discards the body.
//!
//! Server-side failures come back as [`ClientError::Remote`] and leave the
//! session usable. Anything else (I/O, decryption, a malformed or
//! out-of-sequence response) ends the session; later calls fail with
//! [`ClientError::Shutdown`] and the caller must dial again.

pub mod config;

use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;

use secretd_protocol::keys::decode_public_key_base64;
use secretd_protocol::{
    AuthProvider, CipherSuite, ClientCodec, Connection, Handshake, KeyFingerprint, ProtocolError,
    SecureSession, StaticKeyAuthProvider, KEY_LENGTH,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use thiserror::Error;

pub use config::{ClientConfig, ConfigError};

/// Errors returned by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session failed; it has been closed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server reported an error for this call.
    #[error("{0}")]
    Remote(String),

    /// The response answered a different request.
    #[error("response sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },

    /// An earlier call failed and closed the session.
    #[error("client is shut down")]
    Shutdown,

    /// The TCP connection could not be opened.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Settings needed to connect are missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns true if this error closed the session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientError::Remote(_))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Response of `hdwallet_get_extended_public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedPublicKey {
    pub public_key: String,
    pub extended_public_key: String,
}

struct Inner<S> {
    codec: ClientCodec<SecureSession<S>>,
    next_sequence: u64,
    shutdown: bool,
}

impl<S: Connection> Inner<S> {
    fn round_trip<A, R>(&mut self, sequence: u64, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.codec.write_request(sequence, method, args)?;

        let header = self.codec.read_response_header()?;
        if header.sequence != sequence {
            return Err(ClientError::SequenceMismatch {
                expected: sequence,
                actual: header.sequence,
            });
        }

        if header.is_error() {
            self.codec.discard_response_body()?;
            return Err(ClientError::Remote(header.error));
        }

        Ok(self.codec.read_response_body()?)
    }
}

/// RPC client over an established secure session.
///
/// Safe to share between threads; calls are serialized on the session.
pub struct Client<S> {
    inner: Mutex<Inner<S>>,
}

impl<S: Connection> Client<S> {
    /// Handshake on `conn` with the default cipher suite and wrap the session.
    ///
    /// The connection is closed if the key is malformed or the handshake
    /// fails.
    pub fn new<P: AuthProvider>(
        mut conn: S,
        server_public_key_base64: &str,
        provider: &P,
    ) -> Result<Self> {
        let handshake =
            match client_handshake(CipherSuite::default(), server_public_key_base64, provider) {
                Ok(handshake) => handshake,
                Err(e) => {
                    let _ = conn.close();
                    return Err(e);
                }
            };
        Self::establish(conn, &handshake)
    }

    /// Like [`Client::new`] with an explicit cipher suite and a decoded key.
    pub fn with_suite<P: AuthProvider>(
        conn: S,
        suite: CipherSuite,
        server_public_key: &[u8; KEY_LENGTH],
        provider: &P,
    ) -> Result<Self> {
        Self::establish(conn, &Handshake::new(suite, server_public_key, provider)?)
    }

    /// Run `handshake` on `conn` and wrap the resulting session.
    pub fn establish<P: AuthProvider>(conn: S, handshake: &Handshake<P>) -> Result<Self> {
        let session = SecureSession::establish(conn, handshake)?;
        tracing::debug!(
            server = %KeyFingerprint::of(handshake.remote_public_key()),
            protocol = %handshake.suite().protocol_name(),
            "secure session established"
        );
        Ok(Self::from_session(session))
    }

    /// Wrap a session that has already completed its handshake.
    pub fn from_session(session: SecureSession<S>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                codec: ClientCodec::new(session),
                next_sequence: 0,
                shutdown: false,
            }),
        }
    }

    /// Call `method` and drop whatever it returns.
    pub fn call_discard<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<()> {
        self.call::<A, ciborium::Value>(method, args).map(drop)
    }

    /// Call `method` with `args` and decode the result.
    pub fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut inner = self.inner.lock().map_err(|_| ClientError::Shutdown)?;
        if inner.shutdown {
            return Err(ClientError::Shutdown);
        }

        let sequence = inner.next_sequence;
        inner.next_sequence = inner.next_sequence.wrapping_add(1);

        let result = inner.round_trip(sequence, method, args);
        if let Err(err) = &result {
            if err.is_terminal() {
                tracing::warn!(method, sequence, error = %err, "call failed, closing session");
                inner.shutdown = true;
                let _ = inner.codec.close();
            } else {
                tracing::debug!(method, sequence, error = %err, "server returned an error");
            }
        }
        result
    }

    /// Returns true once the session has been closed.
    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().map(|inner| inner.shutdown).unwrap_or(true)
    }

    /// Close the session. Later calls fail with [`ClientError::Shutdown`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| ClientError::Shutdown)?;
        inner.shutdown = true;
        Ok(inner.codec.close()?)
    }

    /// Forward an opaque sub-request and return the opaque reply.
    pub fn system_subrequest(&self, subrequest: &[u8]) -> Result<Vec<u8>> {
        let args = [serde_bytes::Bytes::new(subrequest)];
        let response: ByteBuf = self.call("system_subrequest", &args).inspect_err(|e| {
            tracing::error!("error occurred when calling secretd: {}", e);
        })?;
        Ok(response.into_vec())
    }

    /// Generate an HD wallet under a policy; returns the server's identifier.
    pub fn hdwallet_generate_with_policy(
        &self,
        oid: &str,
        mnemonic_length: u32,
        attributes: &BTreeMap<String, String>,
        policy_id: &str,
    ) -> Result<String> {
        let attributes: Vec<(&str, &str)> = attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.call(
            "hdwallet_generate_with_policy",
            &(oid, mnemonic_length, attributes, policy_id),
        )
    }

    /// Fetch the public and extended public key at `derive_path`.
    pub fn hdwallet_get_extended_public_key(
        &self,
        oid: &str,
        derive_path: &str,
    ) -> Result<ExtendedPublicKey> {
        self.call("hdwallet_get_extended_public_key", &(oid, derive_path))
    }
}

impl Client<TcpStream> {
    /// Connect over TCP and handshake.
    ///
    /// The server key is checked before the connection is opened.
    pub fn dial<A, P>(address: A, server_public_key_base64: &str, provider: &P) -> Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Display,
        P: AuthProvider,
    {
        let handshake =
            client_handshake(CipherSuite::default(), server_public_key_base64, provider)?;
        let conn = connect(&address)?;
        Self::establish(conn, &handshake)
    }

    /// Connect using the server, key and cipher settings of a config.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let provider = StaticKeyAuthProvider::new(config.static_keypair()?);
        let server_key = config.server_public_key()?;
        let handshake = Handshake::new(config.cipher_suite(), &server_key, &provider)?;

        let conn = connect(&config.server.address)?;
        Self::establish(conn, &handshake)
    }
}

/// Decode the server key and prepare a handshake; no I/O happens here.
fn client_handshake<'p, P: AuthProvider>(
    suite: CipherSuite,
    server_public_key_base64: &str,
    provider: &'p P,
) -> Result<Handshake<&'p P>> {
    let server_key = decode_public_key_base64(server_public_key_base64)?;
    Ok(Handshake::new(suite, &server_key, provider)?)
}

fn connect<A: ToSocketAddrs + std::fmt::Display + ?Sized>(address: &A) -> Result<TcpStream> {
    tracing::debug!("connecting to {}", address);
    TcpStream::connect(address).map_err(|source| ClientError::Connect {
        address: address.to_string(),
        source,
    })
}
