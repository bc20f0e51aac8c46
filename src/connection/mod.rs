//! Server-side connection management.
//!
//! One task per accepted socket; each owns its parser and shares the cache
//! through its command handler. See [`handler`] for the segment-feeding
//! discipline.

pub mod handler;

pub use handler::{handle_connection, ConnectionHandler};
