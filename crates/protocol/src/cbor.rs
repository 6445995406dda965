//! Generic CBOR helpers.
//!
//! Thin wrappers over `ciborium` so the rest of the crate speaks
//! [`ProtocolError`]. Encoding always produces definite-length items with
//! minimal integer widths, which is what the server's decoder expects.

use std::io::Cursor;

use ciborium::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ProtocolError, Result};

/// Serialize any `T: Serialize` to CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128);
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize exactly one CBOR item from `bytes`.
///
/// Trailing bytes after the item are rejected.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut cursor = Cursor::new(bytes);
    let value: T = ciborium::de::from_reader(&mut cursor).map_err(|e| match e {
        // Running out of slice is malformed input, not a closed connection.
        ciborium::de::Error::Io(io) => ProtocolError::Decode(io.to_string()),
        other => other.into(),
    })?;
    if cursor.position() as usize != bytes.len() {
        return Err(ProtocolError::Decode(format!(
            "{} trailing bytes after CBOR value",
            bytes.len() - cursor.position() as usize
        )));
    }
    Ok(value)
}

/// Render a decoded value as text.
///
/// Strings come out verbatim; everything else gets a compact readable form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Integer(int) => i128::from(*int).to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Float(float) => float.to_string(),
        Value::Null => "null".to_string(),
        Value::Bytes(bytes) => {
            let rendered = bytes.iter().map(u8::to_string).collect::<Vec<_>>();
            format!("[{}]", rendered.join(" "))
        }
        Value::Array(items) => {
            let rendered = items.iter().map(display_value).collect::<Vec<_>>();
            format!("[{}]", rendered.join(" "))
        }
        Value::Map(entries) => {
            let rendered = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", display_value(k), display_value(v)))
                .collect::<Vec<_>>();
            format!("map[{}]", rendered.join(" "))
        }
        Value::Tag(tag, inner) => format!("{}({})", tag, display_value(inner)),
        other => format!("{:?}", other),
    }
}
