//! Client side of the CBOR RPC wire format.
//!
//! Requests go out as `[0, seq, method, body]`. Responses come back as
//! `[1, seq, error_or_null, body]` and are read in two steps: the header
//! first, then the body, so the caller can decide from the header how (or
//! whether) to decode the body. The codec tracks which read comes next and
//! refuses calls in the wrong order, since skipping a body would leave the
//! stream in the middle of a message.

use std::io::{ErrorKind, Read};

use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cbor::{display_value, to_cbor};
use crate::error::{ProtocolError, Result};
use crate::messages::{MessageType, Request, ResponseHeader, FOUR_ITEM_ARRAY};
use crate::session::Connection;

/// Zero-length reads tolerated while waiting for the first header byte.
const MAX_EMPTY_READS: usize = 16;

/// Which part of a response the codec reads next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRead {
    /// Start of a new response.
    Header,
    /// Body of the response whose header was just read.
    Body,
}

/// Request writer and response reader over one stream.
///
/// Only one header/body sequence may be in flight; callers sharing a codec
/// must serialize access to it.
#[derive(Debug)]
pub struct ClientCodec<S> {
    stream: Option<S>,
    next: NextRead,
}

impl<S: Connection> ClientCodec<S> {
    /// Create a codec over a stream, usually a [`SecureSession`](crate::SecureSession).
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            next: NextRead::Header,
        }
    }

    /// Returns which read is expected next.
    pub fn next_read(&self) -> NextRead {
        self.next
    }

    /// Returns the underlying stream, if the codec is still open.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Encode `[0, sequence, method, body]` and write it in one piece.
    pub fn write_request<T: Serialize + ?Sized>(
        &mut self,
        sequence: u64,
        method: &str,
        body: &T,
    ) -> Result<()> {
        let bytes = to_cbor(&Request {
            sequence,
            method,
            body,
        })?;
        let stream = self.stream_mut()?;
        stream.write_all(&bytes)?;
        stream.flush()?;
        tracing::trace!(sequence, method, len = bytes.len(), "wrote request");
        Ok(())
    }

    /// Decode the first three elements of a response.
    ///
    /// The body stays on the wire; follow up with
    /// [`read_response_body`](Self::read_response_body) or
    /// [`discard_response_body`](Self::discard_response_body).
    pub fn read_response_header(&mut self) -> Result<ResponseHeader> {
        if self.next == NextRead::Body {
            return Err(ProtocolError::Framing(
                "previous response body has not been read".to_string(),
            ));
        }
        let stream = self.stream_mut()?;

        let first = read_first_byte(stream)?;
        if first != FOUR_ITEM_ARRAY {
            return Err(ProtocolError::Framing(format!(
                "message is not an array - {:x}",
                first
            )));
        }

        let kind: u64 = ciborium::de::from_reader(&mut *stream)?;
        let expected = u64::from(MessageType::Response.as_u8());
        if kind != expected {
            return Err(ProtocolError::UnexpectedMessageType {
                expected,
                actual: kind,
            });
        }

        let sequence: u64 = ciborium::de::from_reader(&mut *stream)?;
        let method_or_error: Value = ciborium::de::from_reader(&mut *stream)?;
        let error = match method_or_error {
            Value::Null => String::new(),
            other => display_value(&other),
        };

        self.next = NextRead::Body;
        tracing::trace!(sequence, failed = !error.is_empty(), "read response header");
        Ok(ResponseHeader { sequence, error })
    }

    /// Decode the body of the response whose header was just read.
    pub fn read_response_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        if self.next != NextRead::Body {
            return Err(ProtocolError::Framing(
                "no response header has been read".to_string(),
            ));
        }
        // Whatever happens below, the body slot has been used up.
        self.next = NextRead::Header;
        let stream = self.stream_mut()?;
        Ok(ciborium::de::from_reader(&mut *stream)?)
    }

    /// Consume the body without keeping it.
    ///
    /// A malformed body is still an error: the stream position after it is
    /// unknown.
    pub fn discard_response_body(&mut self) -> Result<()> {
        self.read_response_body::<Value>().map(drop)
    }

    /// Close the underlying stream. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(mut stream) => Ok(stream.close()?),
            None => Ok(()),
        }
    }

    fn stream_mut(&mut self) -> Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProtocolError::ConnectionClosed("codec closed".to_string()))
    }
}

/// Read one byte, retrying transports that hand back zero-length reads.
fn read_first_byte<R: Read + ?Sized>(stream: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    let mut empty_reads = 0;
    loop {
        match stream.read(&mut byte) {
            Ok(1) => return Ok(byte[0]),
            Ok(_) => {
                empty_reads += 1;
                if empty_reads >= MAX_EMPTY_READS {
                    return Err(ProtocolError::ConnectionClosed(
                        "end of stream while waiting for a response".to_string(),
                    ));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
