//! Encrypted byte stream over a raw connection.
//!
//! [`SecureSession`] looks like any other `Read + Write` stream. Each write
//! is sealed in one AEAD operation and sent as one length-delimited frame;
//! each read opens one frame at a time and hands its plaintext out in as
//! many pieces as the caller asks for. A frame is the unit of
//! authentication, so frames are never merged or split.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::auth::AuthProvider;
use crate::error::{ProtocolError, Result};
use crate::framing::{read_frame, write_frame};
use crate::noise::{CipherPair, Handshake, ReceiveCipher, SendCipher, MAX_PLAINTEXT_SIZE};

/// A raw duplex byte stream that can be shut down.
pub trait Connection: Read + Write {
    /// Close the connection. Closing twice must not fail.
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(unix)]
impl Connection for std::os::unix::net::UnixStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// An established, encrypted session.
pub struct SecureSession<S> {
    conn: S,
    send_cipher: SendCipher,
    recv_cipher: ReceiveCipher,
    /// Plaintext of the most recently opened frame.
    pending: Vec<u8>,
    /// How much of `pending` has been handed out.
    offset: usize,
    closed: bool,
}

impl<S: Connection> SecureSession<S> {
    /// Wrap a connection whose handshake has already completed.
    pub fn new(conn: S, ciphers: CipherPair) -> Self {
        Self {
            conn,
            send_cipher: ciphers.send,
            recv_cipher: ciphers.receive,
            pending: Vec::new(),
            offset: 0,
            closed: false,
        }
    }

    /// Run the handshake on `conn` and wrap it.
    ///
    /// The connection is closed if the handshake fails.
    pub fn establish<P: AuthProvider>(mut conn: S, handshake: &Handshake<P>) -> Result<Self> {
        match handshake.perform(&mut conn) {
            Ok(ciphers) => Ok(Self::new(conn, ciphers)),
            Err(e) => {
                tracing::warn!(error = %e, "handshake failed");
                let _ = conn.close();
                Err(e)
            }
        }
    }

    /// Seal `plaintext` and send it as one frame.
    ///
    /// Returns the number of plaintext bytes sent, which is always all of
    /// them. Inputs larger than [`MAX_PLAINTEXT_SIZE`] are rejected.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let ciphertext = self.send_cipher.encrypt(plaintext)?;
        write_frame(&mut self.conn, &ciphertext)?;
        Ok(plaintext.len())
    }

    /// Copy decrypted bytes into `buf`.
    ///
    /// Reads and opens a new frame only when nothing from the previous one is
    /// left. Frames that open to nothing are skipped, so a non-empty `buf`
    /// always receives at least one byte or an error.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        while self.offset == self.pending.len() {
            let frame = read_frame(&mut self.conn)?;
            self.pending = self.recv_cipher.decrypt(&frame).inspect_err(|e| {
                tracing::warn!(error = %e, "dropping session after failed decryption");
            })?;
            self.offset = 0;
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }

    /// Bytes of the current frame not yet handed to a reader.
    pub fn pending_len(&self) -> usize {
        self.pending.len() - self.offset
    }

    /// Close the underlying connection.
    ///
    /// Only the first call reaches the connection. The cipher states are not
    /// usable afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        self.offset = 0;
        self.conn.close()?;
        Ok(())
    }

    /// Returns whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns a reference to the underlying connection.
    pub fn get_ref(&self) -> &S {
        &self.conn
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ProtocolError::ConnectionClosed("session closed".to_string()));
        }
        Ok(())
    }
}

impl<S: Connection> Read for SecureSession<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.receive(buf).map_err(io::Error::from)
    }
}

impl<S: Connection> Write for SecureSession<S> {
    /// Seals at most [`MAX_PLAINTEXT_SIZE`] bytes per call; `write_all`
    /// spreads larger buffers over several frames.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(MAX_PLAINTEXT_SIZE);
        self.send(&buf[..n]).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.flush()
    }
}

impl<S: Connection> Connection for SecureSession<S> {
    fn close(&mut self) -> io::Result<()> {
        SecureSession::close(self).map_err(io::Error::from)
    }
}

impl<S> std::fmt::Debug for SecureSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("send_cipher", &self.send_cipher)
            .field("recv_cipher", &self.recv_cipher)
            .field("pending", &(self.pending.len() - self.offset))
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::decode_frame;
    use crate::noise::{CipherSuite, MAX_NOISE_MESSAGE_SIZE};
    use crate::test_support::{
        client_keypair, handshake_pair, server_frame, server_keypair, MockConn, NullAuthProvider,
        Responder,
    };
    use std::net::TcpListener;

    #[test]
    fn test_write_emits_one_sealed_frame() {
        let (pair, mut server) = handshake_pair();
        let mut session = SecureSession::new(MockConn::empty(), pair);

        let n = session.send(b"arbitrary payload").unwrap();
        assert_eq!(n, 17);

        let wire = session.get_ref().written();
        let (ciphertext, consumed) = decode_frame(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(ciphertext.len(), 17 + 16);

        let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let len = server.read_message(&ciphertext, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"arbitrary payload");
    }

    #[test]
    fn test_partial_reads_drain_one_frame() {
        let (pair, mut server) = handshake_pair();
        let mut wire = server_frame(&mut server, b"hello world");
        wire.extend_from_slice(&server_frame(&mut server, b"next"));
        let second_frame_len = wire.len() - decode_frame(&wire).unwrap().1;

        let mut session = SecureSession::new(MockConn::new(wire), pair);

        let mut buf = [0u8; 4];
        assert_eq!(session.receive(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"hell");
        assert_eq!(session.pending_len(), 7);
        // Only the first frame has been pulled off the connection.
        assert_eq!(session.get_ref().unread(), second_frame_len);

        assert_eq!(session.receive(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"o wo");
        assert_eq!(session.receive(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"rld");
        assert_eq!(session.pending_len(), 0);

        assert_eq!(session.receive(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"next");
    }

    #[test]
    fn test_read_exact_across_frames() {
        let (pair, mut server) = handshake_pair();
        let mut wire = server_frame(&mut server, b"abc");
        wire.extend_from_slice(&server_frame(&mut server, b"def"));

        let mut session = SecureSession::new(MockConn::new(wire), pair);
        let mut buf = [0u8; 6];
        session.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let (pair, mut server) = handshake_pair();
        let mut wire = server_frame(&mut server, b"");
        wire.extend_from_slice(&server_frame(&mut server, b"data"));

        let mut session = SecureSession::new(MockConn::new(wire), pair);
        let mut buf = [0u8; 8];
        assert_eq!(session.receive(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"data");
    }

    #[test]
    fn test_empty_buffer_reads_nothing() {
        let (pair, mut server) = handshake_pair();
        let wire = server_frame(&mut server, b"data");
        let mut session = SecureSession::new(MockConn::new(wire), pair);

        assert_eq!(session.receive(&mut []).unwrap(), 0);
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_tampered_frame_fails_decryption() {
        for _ in 0..2 {
            let (pair, mut server) = handshake_pair();
            let mut wire = server_frame(&mut server, b"secret message");
            let last = wire.len() - 1;
            wire[last] ^= 0x01;

            let mut session = SecureSession::new(MockConn::new(wire), pair);
            let mut buf = [0u8; 32];
            let result = session.receive(&mut buf);
            assert!(matches!(result, Err(ProtocolError::Decryption(_))));
        }
    }

    #[test]
    fn test_decryption_error_survives_io_read() {
        let (pair, mut server) = handshake_pair();
        let mut wire = server_frame(&mut server, b"secret message");
        wire[2] ^= 0xFF;

        let mut session = SecureSession::new(MockConn::new(wire), pair);
        let mut buf = [0u8; 32];
        let io_err = session.read(&mut buf).unwrap_err();
        let protocol_err = ProtocolError::from(io_err);
        assert!(matches!(protocol_err, ProtocolError::Decryption(_)));
    }

    #[test]
    fn test_eof_is_connection_closed() {
        let (pair, _server) = handshake_pair();
        let mut session = SecureSession::new(MockConn::new(vec![0x00]), pair);
        let mut buf = [0u8; 8];
        let result = session.receive(&mut buf);
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
    }

    #[test]
    fn test_send_rejects_oversized_input() {
        let (pair, _server) = handshake_pair();
        let mut session = SecureSession::new(MockConn::empty(), pair);
        let result = session.send(&vec![0u8; MAX_PLAINTEXT_SIZE + 1]);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
        assert!(session.get_ref().written().is_empty());
    }

    #[test]
    fn test_write_all_spreads_large_buffer_over_frames() {
        let (pair, mut server) = handshake_pair();
        let mut session = SecureSession::new(MockConn::empty(), pair);
        let payload = vec![0x5A; MAX_PLAINTEXT_SIZE + 10];
        session.write_all(&payload).unwrap();

        let wire = session.get_ref().written();
        let (first, consumed) = decode_frame(&wire).unwrap();
        let (second, _) = decode_frame(&wire[consumed..]).unwrap();

        let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let mut received = Vec::new();
        for ciphertext in [first, second] {
            let len = server.read_message(&ciphertext, &mut buf).unwrap();
            received.extend_from_slice(&buf[..len]);
        }
        assert_eq!(received, payload);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (pair, _server) = handshake_pair();
        let mut session = SecureSession::new(MockConn::empty(), pair);

        session.close().unwrap();
        session.close().unwrap();
        assert!(session.is_closed());
        assert_eq!(session.get_ref().close_calls(), 1);

        let mut buf = [0u8; 4];
        assert!(matches!(
            session.receive(&mut buf),
            Err(ProtocolError::ConnectionClosed(_))
        ));
        assert!(matches!(
            session.send(b"late"),
            Err(ProtocolError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn test_establish_over_loopback_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut responder = Responder::new(server_keypair());
            let hello = responder.read_client_frames(&mut stream).unwrap();
            let (reply, mut transport) = responder.reply().unwrap();
            stream.write_all(&reply).unwrap();

            let ciphertext = read_frame(&mut stream).unwrap();
            let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
            let len = transport.read_message(&ciphertext, &mut buf).unwrap();
            let upper = buf[..len].to_ascii_uppercase();
            stream
                .write_all(&server_frame(&mut transport, &upper))
                .unwrap();
            hello.auth_method
        });

        let handshake = Handshake::new(
            CipherSuite::default(),
            server_keypair().public_key(),
            NullAuthProvider::new(client_keypair()),
        )
        .unwrap();
        let stream = TcpStream::connect(address).unwrap();
        let mut session = SecureSession::establish(stream, &handshake).unwrap();

        session.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        session.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"PING");
        session.close().unwrap();

        assert_eq!(server.join().unwrap(), "null");
    }
}
