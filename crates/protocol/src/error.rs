//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
///
/// Every variant is terminal for the session that produced it: there is no
/// retry anywhere in this crate, callers redial and handshake again.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Key errors
    /// Key material has the wrong length or cannot be decoded.
    #[error("invalid key format: {0}")]
    KeyFormat(String),

    // Handshake errors
    /// The handshake was rejected.
    ///
    /// A non-empty negotiation echo and a cryptographic failure both map here
    /// with the same text, so an active attacker learns nothing from which
    /// step failed.
    #[error("handshake error")]
    Handshake,

    /// Local handshake state could not be built (bad parameters, oversized
    /// payload). Raised before anything is written to the connection.
    #[error("handshake setup failed: {0}")]
    HandshakeSetup(String),

    // Frame errors
    /// The byte stream does not have the expected structure.
    #[error("framing error: {0}")]
    Framing(String),

    /// A message carried a different type discriminant than expected.
    #[error("invalid message - expecting {expected} but got {actual}")]
    UnexpectedMessageType {
        /// Discriminant the reader was waiting for.
        expected: u64,
        /// Discriminant found on the wire.
        actual: u64,
    },

    /// Frame exceeds maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    // Cryptographic errors
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption operation failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to decode a CBOR payload.
    #[error("decode failed: {0}")]
    Decode(String),

    // Connection errors
    /// Connection was closed unexpectedly.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation timed out (deadline set on the raw connection).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Any other I/O failure on the raw connection.
    #[error("i/o error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// Returns true for errors describing a malformed byte stream.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::Framing(_)
                | ProtocolError::UnexpectedMessageType { .. }
                | ProtocolError::FrameTooLarge { .. }
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<snow::Error> for ProtocolError {
    fn from(err: snow::Error) -> Self {
        match err {
            snow::Error::Decrypt => ProtocolError::Decryption(err.to_string()),
            snow::Error::State(_) | snow::Error::Input => ProtocolError::Handshake,
            _ => ProtocolError::Encryption(err.to_string()),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for ProtocolError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        match err {
            ciborium::ser::Error::Io(io) => io.into(),
            ciborium::ser::Error::Value(msg) => ProtocolError::Serialization(msg),
        }
    }
}

impl From<ciborium::de::Error<std::io::Error>> for ProtocolError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        match err {
            ciborium::de::Error::Io(io) => io.into(),
            other => ProtocolError::Decode(other.to_string()),
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::KeyFormat(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        // The session reports its own failures through io::Error; unwrap them
        // so callers keep the original kind.
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<ProtocolError>())
        {
            if let Some(inner) = err.into_inner() {
                if let Ok(protocol) = inner.downcast::<ProtocolError>() {
                    return *protocol;
                }
            }
            return ProtocolError::Io("unrecoverable session error".to_string());
        }
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ProtocolError::Timeout(err.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}

impl From<ProtocolError> for std::io::Error {
    fn from(err: ProtocolError) -> Self {
        std::io::Error::other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_display_is_fixed() {
        assert_eq!(ProtocolError::Handshake.to_string(), "handshake error");
    }

    #[test]
    fn test_key_format_error_display() {
        let err = ProtocolError::KeyFormat("invalid public key length: 31".to_string());
        assert_eq!(
            err.to_string(),
            "invalid key format: invalid public key length: 31"
        );
    }

    #[test]
    fn test_unexpected_message_type_display_names_both_values() {
        let err = ProtocolError::UnexpectedMessageType {
            expected: 1,
            actual: 0,
        };
        assert_eq!(err.to_string(), "invalid message - expecting 1 but got 0");
        assert!(err.is_framing());
    }

    #[test]
    fn test_frame_too_large_error_display() {
        let err = ProtocolError::FrameTooLarge {
            size: 100_000,
            max: 65535,
        };
        assert_eq!(
            err.to_string(),
            "frame too large: 100000 bytes exceeds maximum of 65535 bytes"
        );
    }

    #[test]
    fn test_decryption_is_not_framing() {
        let err = ProtocolError::Decryption("aead tag mismatch".to_string());
        assert!(!err.is_framing());
    }

    #[test]
    fn test_from_io_error_eof_is_connection_closed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::ConnectionClosed(_)));
    }

    #[test]
    fn test_from_io_error_timeout() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Timeout(_)));
    }

    #[test]
    fn test_from_io_error_other() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_wrapped_protocol_error_survives_io_roundtrip() {
        let io_err: std::io::Error =
            ProtocolError::Decryption("aead tag mismatch".to_string()).into();
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Decryption(_)));
    }

    #[test]
    fn test_from_snow_decrypt_error() {
        let protocol_err: ProtocolError = snow::Error::Decrypt.into();
        assert!(matches!(protocol_err, ProtocolError::Decryption(_)));
    }

    #[test]
    fn test_from_base64_error_is_key_format() {
        use base64::Engine as _;
        let err = base64::engine::general_purpose::STANDARD
            .decode("not base64!")
            .unwrap_err();
        let protocol_err: ProtocolError = err.into();
        assert!(matches!(protocol_err, ProtocolError::KeyFormat(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
