//! # embercache - a memcached-wire-compatible in-memory cache
//!
//! One crate, three faces: a TCP server speaking the memcached ASCII
//! protocol, a client library that spreads requests over several servers,
//! and an embeddable in-process cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Server                              │
//! │                                                              │
//! │  ┌───────────┐   ┌─────────────┐   ┌────────────────┐        │
//! │  │ TCP       │──>│ Line Parser │──>│ CommandHandler │        │
//! │  │ Listener  │   │ (per conn)  │   └───────┬────────┘        │
//! │  └───────────┘   └─────────────┘           │                 │
//! │                                            ▼                 │
//! │                 ┌─────────────┐     ┌────────────┐           │
//! │                 │ PurgeWorker │<───>│   Cache    │           │
//! │                 └─────────────┘     └────────────┘           │
//! └──────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │   each op ──> weighted pick ──> ServerConnection ──> TCP     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows in on a connection as raw segments; the per-connection
//! [`LineParser`] walks its header/payload state machine and hands complete
//! commands to a [`CommandHandler`], which is the only thing that touches
//! the shared [`Cache`]. Eviction runs on a separate [`PurgeWorker`] task
//! woken after mutations, so no command ever pays for a purge.
//!
//! ## Quick start (server)
//!
//! ```no_run
//! use embercache::cache::{Cache, CacheConfig, PurgeWorker};
//! use embercache::server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> embercache::Result<()> {
//!     let cache = Cache::new(CacheConfig::ByMaxRecords(100_000));
//!     let _purger = PurgeWorker::start(cache.clone());
//!     let server = Server::start(ServerConfig::default(), cache).await?;
//!     println!("listening on {}", server.local_addr());
//!     tokio::signal::ctrl_c().await.ok();
//!     server.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! [`LineParser`]: protocol::LineParser
//! [`CommandHandler`]: commands::CommandHandler
//! [`Cache`]: cache::Cache
//! [`PurgeWorker`]: cache::PurgeWorker

pub mod cache;
pub mod client;
pub mod commands;
pub mod connection;
pub mod embedded;
pub mod error;
pub mod protocol;
pub mod server;

pub use cache::{Cache, CacheConfig, PurgeWorker, Record};
pub use client::{Client, ClientOptions, ServerConnection};
pub use commands::CommandHandler;
pub use error::{Error, Result};
pub use protocol::{LineParser, Value};
pub use server::{Server, ServerConfig};

/// The port memcached clients expect.
pub const DEFAULT_PORT: u16 = 11211;

/// Crate version, as reported by the `version` command and `stats`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
