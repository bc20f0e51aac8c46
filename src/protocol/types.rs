//! Wire-level vocabulary for the memcached ASCII protocol.
//!
//! Everything is line-oriented and CRLF-terminated. Responses are the fixed
//! tokens below plus the three multi-line readers (`VALUE`, `STATS`,
//! `VERSION`) built by the command handler.

use bytes::Bytes;

/// The line terminator used throughout the protocol.
pub const CRLF: &[u8] = b"\r\n";

/// The byte that means "client disconnect" when it leads a segment.
pub const EOT: u8 = 0x04;

/// Response tokens, exactly as they appear on the wire.
pub mod tokens {
    pub const STORED: &str = "STORED";
    pub const NOT_STORED: &str = "NOT_STORED";
    pub const DELETED: &str = "DELETED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const TOUCHED: &str = "TOUCHED";
    pub const END: &str = "END";
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
    pub const CLIENT_ERROR_PREFIX: &str = "CLIENT_ERROR ";
    pub const VALUE_PREFIX: &str = "VALUE ";
    pub const STATS_PREFIX: &str = "STATS ";
    pub const VERSION_PREFIX: &str = "VERSION ";
}

/// Finds the position of the first CRLF in `buf`, pointing at the `\r`.
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}

/// An in-process value as the embedded API and the client trade it.
///
/// The cache itself only ever stores bytes; this is the adapter type that
/// carries structured values across the byte boundary. JSON serializes on
/// the way in, and anything that reads as a JSON object (`{`…`}`) parses on
/// the way out, falling back to the raw text when parsing fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain text, stored and returned byte-identical.
    Text(String),
    /// A structured value, stored as its JSON serialization.
    Json(serde_json::Value),
}

impl Value {
    /// The wire bytes for this value.
    pub fn to_wire(&self) -> Bytes {
        match self {
            Value::Text(text) => Bytes::from(text.clone()),
            Value::Json(json) => Bytes::from(json.to_string()),
        }
    }

    /// Reconstructs a value from wire bytes, sniffing for JSON objects.
    pub fn from_wire(data: &[u8]) -> Value {
        let text = String::from_utf8_lossy(data).into_owned();
        if text.starts_with('{') && text.ends_with('}') {
            if let Ok(json) = serde_json::from_str(&text) {
                return Value::Json(json);
            }
        }
        Value::Text(text)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Value {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Value {
        Value::Text(text)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Value {
        Value::Json(json)
    }
}
