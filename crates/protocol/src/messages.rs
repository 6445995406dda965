//! Wire message definitions.
//!
//! All messages are CBOR arrays with a fixed element order and no field
//! names on the wire:
//!
//! ```text
//! client hello: [timestamp, auth_method, auth_params]
//! request:      [0, seq, method, body]
//! response:     [1, seq, error_or_null, body]
//! ```

use ciborium::Value;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeTuple, Serializer};

/// CBOR initial byte of a definite-length array of four items.
pub const FOUR_ITEM_ARRAY: u8 = 0x84;

/// Discriminant in the first element of an RPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client to server call.
    Request = 0,
    /// Server to client reply.
    Response = 1,
}

impl MessageType {
    /// Returns the wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// First payload of the handshake, carried encrypted inside the initiator's
/// Noise message.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientHello {
    /// Nanoseconds since the Unix epoch at the time of the handshake.
    pub timestamp: u64,
    /// Authentication method name.
    pub auth_method: String,
    /// Opaque method parameters.
    pub auth_params: Value,
}

impl ClientHello {
    /// Create a hello stamped with the current time.
    pub fn now(auth_method: impl Into<String>, auth_params: Value) -> Self {
        Self {
            timestamp: unix_nanos(),
            auth_method: auth_method.into(),
            auth_params,
        }
    }
}

impl Serialize for ClientHello {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_tuple(3)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.auth_method)?;
        seq.serialize_element(&self.auth_params)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ClientHello {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (timestamp, auth_method, auth_params) =
            <(u64, String, Value)>::deserialize(deserializer)?;
        Ok(Self {
            timestamp,
            auth_method,
            auth_params,
        })
    }
}

/// Outgoing call, borrowed from the caller.
#[derive(Debug)]
pub struct Request<'a, T: ?Sized> {
    /// Correlates the response; echoed unchanged by the server.
    pub sequence: u64,
    /// Remote method name.
    pub method: &'a str,
    /// Call arguments.
    pub body: &'a T,
}

impl<T: Serialize + ?Sized> Serialize for Request<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_tuple(4)?;
        seq.serialize_element(&MessageType::Request.as_u8())?;
        seq.serialize_element(&self.sequence)?;
        seq.serialize_element(self.method)?;
        seq.serialize_element(self.body)?;
        seq.end()
    }
}

/// The first three elements of a response. The body follows on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Sequence number of the request being answered.
    pub sequence: u64,
    /// Server error text; empty on success.
    pub error: String,
}

impl ResponseHeader {
    /// Returns true when the server reported a failure.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

fn unix_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::{from_cbor, to_cbor};

    #[test]
    fn test_request_encoding_matches_wire_vector() {
        let request = Request {
            sequence: 0,
            method: "hello",
            body: &vec![1u64],
        };
        let bytes = to_cbor(&request).unwrap();
        assert_eq!(hex::encode(bytes), "8400006568656c6c6f8101");
    }

    #[test]
    fn test_client_hello_layout() {
        let hello = ClientHello {
            timestamp: 1_600_000_000_000_000_000,
            auth_method: "null".to_string(),
            auth_params: Value::Null,
        };
        let bytes = to_cbor(&hello).unwrap();

        assert_eq!(bytes[0], 0x83);
        assert_eq!(bytes[1], 0x1b, "timestamp is a full 64-bit integer");
        assert_eq!(hex::encode(&bytes[10..]), "646e756c6cf6");

        let decoded: ClientHello = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn test_client_hello_now_is_recent() {
        let hello = ClientHello::now("static_key", Value::Null);
        // 2020-09-13 in nanoseconds.
        assert!(hello.timestamp > 1_600_000_000_000_000_000);
    }

    #[test]
    fn test_response_header_is_error() {
        let ok = ResponseHeader::default();
        assert!(!ok.is_error());

        let failed = ResponseHeader {
            sequence: 3,
            error: "boom".to_string(),
        };
        assert!(failed.is_error());
    }
}
