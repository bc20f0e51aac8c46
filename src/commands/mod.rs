//! Command execution layer.
//!
//! Sits between the line parser and the cache: the parser hands over a bound
//! command plus any payload, the handler runs it against the [`Cache`] and
//! renders the wire response.
//!
//! ```text
//! bytes ──> line parser ──> (syntax, args, payload) ──> CommandHandler
//!                                                            │
//!                                                            ▼
//!                                                          Cache
//! ```
//!
//! [`Cache`]: crate::cache::Cache

pub mod handler;

pub use handler::CommandHandler;
