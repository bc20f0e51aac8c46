//! The client library.
//!
//! [`ServerConnection`] is the unit: one TCP connection, one request in
//! flight, encoding commands and inverting the server's responses.
//! [`Client`] spreads operations across several connections by weighted
//! random choice.
//!
//! ```no_run
//! use embercache::client::{Client, ClientOptions};
//! use embercache::protocol::Value;
//!
//! #[tokio::main]
//! async fn main() -> embercache::Result<()> {
//!     let mut client = Client::connect("127.0.0.1:11211", ClientOptions::default()).await?;
//!     client.set("greeting", &Value::from("hello"), 0).await?;
//!     let value = client.get("greeting").await?;
//!     println!("{:?}", value);
//!     client.end().await
//! }
//! ```

pub mod connection;
pub mod dispatch;

pub use connection::{ClientOptions, Endpoint, ServerConnection, DEFAULT_TIMEOUT};
pub use dispatch::{Client, Locations};
