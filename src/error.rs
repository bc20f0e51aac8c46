//! Error types shared across the server, the protocol layer, and the client.
//!
//! The wire protocol has a fixed set of error tokens; each protocol-level
//! variant here renders as exactly the bytes the server puts on the wire, so
//! the connection handler can write `error.to_string()` without a second
//! mapping table.

use thiserror::Error;

/// Unified error type for embercache.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown verb or malformed syntax. Wire token: `ERROR`.
    #[error("ERROR")]
    BadCommand,

    /// A required positional argument is missing or unparseable.
    #[error("CLIENT_ERROR bad command line format")]
    BadFormat,

    /// Payload longer than the advertised byte count.
    #[error("CLIENT_ERROR bad data chunk")]
    BadPayload,

    /// `incr`/`decr` against a value that does not parse as an integer.
    #[error("CLIENT_ERROR cannot increment or decrement non-numeric value")]
    NonNumeric,

    /// TCP-level failure on either side of the wire.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client-side idle timeout: no bytes arrived within `options.timeout`.
    #[error("timeout")]
    Timeout,

    /// An error line the server sent, surfaced to the caller verbatim.
    #[error("{0}")]
    Server(String),

    /// A location string that does not parse as `host:port`.
    #[error("invalid endpoint: {0}")]
    BadEndpoint(String),
}

/// Convenience Result type for embercache operations.
pub type Result<T> = std::result::Result<T, Error>;
