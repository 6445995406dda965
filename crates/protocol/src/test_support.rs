//! Test doubles shared by the unit tests of this crate.

use std::io::{self, Cursor, Read, Write};

use ciborium::Value;
use snow::{HandshakeState, TransportState};

use crate::auth::AuthProvider;
use crate::cbor::from_cbor;
use crate::error::Result;
use crate::framing::{encode_frame, read_frame};
use crate::keys::{StaticKeyPair, KEY_LENGTH};
use crate::messages::ClientHello;
use crate::noise::{
    CipherPair, CipherSuite, Handshake, HandshakeConfig, MAX_NOISE_MESSAGE_SIZE, NEGOTIATION_DATA,
};
use crate::session::Connection;

const CLIENT_PRIVATE_HEX: &str = "0bf8b4563510b9c3e1c7a62b41fbc9e568c34e6d7e880bf7e9d0980f8aa31256";
const SERVER_PRIVATE_HEX: &str = "a4841649e94d627f7055affcb39c4ec000b1c2cc2aaa7e583c476f30eadb3d36";

pub(crate) fn client_keypair() -> StaticKeyPair {
    StaticKeyPair::from_private_bytes(&hex::decode(CLIENT_PRIVATE_HEX).unwrap()).unwrap()
}

pub(crate) fn server_keypair() -> StaticKeyPair {
    StaticKeyPair::from_private_bytes(&hex::decode(SERVER_PRIVATE_HEX).unwrap()).unwrap()
}

/// Auth method named "null" with no parameters.
#[derive(Debug, Clone)]
pub(crate) struct NullAuthProvider {
    keypair: StaticKeyPair,
}

impl NullAuthProvider {
    pub(crate) fn new(keypair: StaticKeyPair) -> Self {
        Self { keypair }
    }
}

impl AuthProvider for NullAuthProvider {
    fn name(&self) -> &str {
        "null"
    }

    fn auth_params(&self) -> Value {
        Value::Null
    }

    fn local_static_keypair(&self) -> &StaticKeyPair {
        &self.keypair
    }
}

/// In-memory connection: reads come from a prepared buffer, writes are
/// captured.
#[derive(Debug, Default)]
pub(crate) struct MockConn {
    incoming: Cursor<Vec<u8>>,
    written: Vec<u8>,
    close_calls: usize,
}

impl MockConn {
    pub(crate) fn new(incoming: Vec<u8>) -> Self {
        Self {
            incoming: Cursor::new(incoming),
            ..Self::default()
        }
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.clone()
    }

    pub(crate) fn unread(&self) -> usize {
        self.incoming.get_ref().len() - self.incoming.position() as usize
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls
    }
}

impl Read for MockConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.incoming.read(buf)
    }
}

impl Write for MockConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConn {
    fn close(&mut self) -> io::Result<()> {
        self.close_calls += 1;
        Ok(())
    }
}

/// Server side of the handshake, driven with the real snow state machine.
pub(crate) struct Responder {
    state: HandshakeState,
}

impl Responder {
    pub(crate) fn new(keypair: StaticKeyPair) -> Self {
        let state = HandshakeConfig::responder(CipherSuite::default(), keypair)
            .build()
            .unwrap();
        Self { state }
    }

    /// Consume the client's two frames and return its hello.
    pub(crate) fn read_client_frames<R: Read>(&mut self, conn: &mut R) -> Result<ClientHello> {
        let negotiation_data = read_frame(conn)?;
        assert_eq!(negotiation_data, NEGOTIATION_DATA);

        let message = read_frame(conn)?;
        let mut payload = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let len = self.state.read_message(&message, &mut payload)?;
        from_cbor(&payload[..len])
    }

    pub(crate) fn remote_static(&self) -> Option<[u8; KEY_LENGTH]> {
        let remote = self.state.get_remote_static()?;
        remote.try_into().ok()
    }

    /// Produce the server's two frames and switch to transport mode.
    pub(crate) fn reply(mut self) -> Result<(Vec<u8>, TransportState)> {
        let mut buffer = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let len = self.state.write_message(&[], &mut buffer)?;
        let wire = server_reply(&[], &buffer[..len]);
        Ok((wire, self.state.into_transport_mode()?))
    }
}

/// Two server frames: negotiation echo, then handshake message.
pub(crate) fn server_reply(negotiation_data: &[u8], message: &[u8]) -> Vec<u8> {
    let mut wire = encode_frame(negotiation_data).unwrap();
    wire.extend_from_slice(&encode_frame(message).unwrap());
    wire
}

/// Complete a handshake in memory; returns the client's ciphers and the
/// server's transport.
pub(crate) fn handshake_pair() -> (CipherPair, TransportState) {
    let handshake = Handshake::new(
        CipherSuite::default(),
        server_keypair().public_key(),
        NullAuthProvider::new(client_keypair()),
    )
    .unwrap();

    let mut conn = MockConn::empty();
    let initiated = handshake.initiate(&mut conn).unwrap();

    let mut responder = Responder::new(server_keypair());
    responder
        .read_client_frames(&mut Cursor::new(conn.written()))
        .unwrap();
    let (reply, server) = responder.reply().unwrap();

    let pair = initiated.finish(&mut Cursor::new(reply)).unwrap();
    (pair, server)
}

/// Seal `plaintext` with the server transport and frame it.
pub(crate) fn server_frame(server: &mut TransportState, plaintext: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
    let len = server.write_message(plaintext, &mut buffer).unwrap();
    encode_frame(&buffer[..len]).unwrap()
}
