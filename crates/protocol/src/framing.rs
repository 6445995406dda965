//! Length-delimited framing over a raw byte stream.
//!
//! # Frame Format
//!
//! Each frame consists of:
//! - 2 bytes: payload length (big-endian)
//! - N bytes: payload
//!
//! The same framing carries the handshake negotiation data, the Noise
//! handshake messages, and afterwards every sealed application message.

use std::io::{Read, Write};

use crate::error::{ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Encode a payload into a frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut output = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    output.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    output.extend_from_slice(payload);
    Ok(output)
}

/// Decode a frame from bytes.
///
/// Returns the payload and the number of bytes consumed.
pub fn decode_frame(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    match try_decode_frame(data)? {
        Some(decoded) => Ok(decoded),
        None => Err(ProtocolError::Framing(format!(
            "truncated frame: have {} bytes",
            data.len()
        ))),
    }
}

/// Try to decode a frame from bytes, returning None if there isn't enough data.
pub fn try_decode_frame(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u16::from_be_bytes([data[0], data[1]]) as usize;
    let total = LENGTH_PREFIX_SIZE + length;
    if data.len() < total {
        return Ok(None);
    }

    Ok(Some((data[LENGTH_PREFIX_SIZE..total].to_vec(), total)))
}

/// Write one frame to a stream.
///
/// Prefix and payload go out in a single `write_all`.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    tracing::trace!(len = payload.len(), "wrote frame");
    Ok(())
}

/// Read exactly one frame from a stream.
///
/// Short reads are retried until the whole frame has arrived; end of stream
/// inside a frame fails with [`ProtocolError::ConnectionClosed`].
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;

    let length = u16::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    tracing::trace!(len = length, "read frame");
    Ok(payload)
}
