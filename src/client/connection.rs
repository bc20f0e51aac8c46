//! One live connection to one server endpoint.
//!
//! Requests take `&mut self`, so a connection has exactly one outstanding
//! request at a time; the ownership system enforces the contract the wire
//! protocol assumes. A caller that wants concurrency pools connections
//! (see the dispatcher) rather than multiplexing one.
//!
//! Every read is guarded by the configured timeout; an idle server surfaces
//! as [`Error::Timeout`]. Error lines from the server (`ERROR`,
//! `CLIENT_ERROR …`) surface verbatim through [`Error::Server`].

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::types::{find_crlf, tokens, Value, CRLF};

/// Default idle timeout for client reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Options shared by every connection a client opens.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long a read may sit idle before the operation fails.
    pub timeout: Duration,
    /// Leave Nagle's algorithm enabled.
    pub delay: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            delay: false,
        }
    }
}

/// A server address with its dispatch weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses a `"host:port"` location string.
    pub fn parse(location: &str) -> Result<Endpoint> {
        let (host, port) = location
            .rsplit_once(':')
            .ok_or_else(|| Error::BadEndpoint(location.to_string()))?;
        if host.is_empty() {
            return Err(Error::BadEndpoint(location.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| Error::BadEndpoint(location.to_string()))?;
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }

    /// The `host:port` form back.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A live, request-at-a-time connection to one endpoint.
pub struct ServerConnection {
    endpoint: Endpoint,
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    timeout: Duration,
}

impl ServerConnection {
    /// Parses the location, opens the TCP connection, and applies socket
    /// options.
    pub async fn connect(location: &str, options: &ClientOptions) -> Result<Self> {
        let endpoint = Endpoint::parse(location)?;
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        if !options.delay {
            let _ = stream.set_nodelay(true);
        }
        debug!(endpoint = %endpoint.address(), "connected");
        Ok(Self {
            endpoint,
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
            timeout: options.timeout,
        })
    }

    /// The endpoint this connection talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Retrieves a value. `None` means the key is absent.
    pub async fn get(&mut self, key: &str) -> Result<Option<Value>> {
        self.send(format!("get {}\r\n", key).as_bytes()).await?;

        let header = self.read_line().await?;
        if header == tokens::END || header == tokens::ERROR {
            return Ok(None);
        }
        if header.starts_with(tokens::CLIENT_ERROR_PREFIX) {
            return Err(Error::Server(header));
        }

        // VALUE <key> <flags> <bytes>
        let length: usize = header
            .split_whitespace()
            .nth(3)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| Error::Server(header.clone()))?;

        let data = self.read_data(length).await?;
        let _terminator = self.read_line().await?;
        Ok(Some(Value::from_wire(&data)))
    }

    /// Stores unconditionally. The server always answers `STORED`.
    pub async fn set(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.store("set", key, value, exptime).await
    }

    /// Stores only if absent.
    pub async fn add(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.store("add", key, value, exptime).await
    }

    /// Stores only if present.
    pub async fn replace(&mut self, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        self.store("replace", key, value, exptime).await
    }

    /// Appends to an existing value.
    pub async fn append(&mut self, key: &str, value: &Value) -> Result<bool> {
        self.store("append", key, value, 0).await
    }

    /// Prefixes an existing value.
    pub async fn prepend(&mut self, key: &str, value: &Value) -> Result<bool> {
        self.store("prepend", key, value, 0).await
    }

    async fn store(&mut self, verb: &str, key: &str, value: &Value, exptime: i64) -> Result<bool> {
        let data = value.to_wire();
        let mut request =
            format!("{} {} 0 {} {}\r\n", verb, key, exptime, data.len()).into_bytes();
        request.extend_from_slice(&data);
        request.extend_from_slice(CRLF);
        self.send(&request).await?;

        match self.read_line().await?.as_str() {
            tokens::STORED => Ok(true),
            tokens::NOT_STORED => Ok(false),
            other => Err(Error::Server(other.to_string())),
        }
    }

    /// Deletes a key; `false` means it was not there.
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        self.send(format!("delete {}\r\n", key).as_bytes()).await?;
        match self.read_line().await?.as_str() {
            tokens::DELETED => Ok(true),
            tokens::NOT_FOUND => Ok(false),
            other => Err(Error::Server(other.to_string())),
        }
    }

    /// Increments a stored integer. `None` means the key is absent; a
    /// non-numeric value surfaces the server's `CLIENT_ERROR` verbatim.
    pub async fn incr(&mut self, key: &str, amount: u64) -> Result<Option<u64>> {
        self.arithmetic("incr", key, amount).await
    }

    /// Decrements a stored integer, clamped at zero by the server.
    pub async fn decr(&mut self, key: &str, amount: u64) -> Result<Option<u64>> {
        self.arithmetic("decr", key, amount).await
    }

    async fn arithmetic(&mut self, verb: &str, key: &str, amount: u64) -> Result<Option<u64>> {
        self.send(format!("{} {} {}\r\n", verb, key, amount).as_bytes())
            .await?;
        let line = self.read_line().await?;
        if line == tokens::NOT_FOUND {
            return Ok(None);
        }
        match line.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(Error::Server(line)),
        }
    }

    /// Updates a key's expiration; `false` means the key was not there.
    pub async fn touch(&mut self, key: &str, exptime: i64) -> Result<bool> {
        self.send(format!("touch {} {}\r\n", key, exptime).as_bytes())
            .await?;
        match self.read_line().await?.as_str() {
            tokens::TOUCHED => Ok(true),
            tokens::NOT_FOUND => Ok(false),
            other => Err(Error::Server(other.to_string())),
        }
    }

    /// Server statistics as ordered name/value pairs.
    pub async fn stats(&mut self) -> Result<Vec<(String, String)>> {
        self.send(b"stats\r\n").await?;
        let mut pairs = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == tokens::END {
                return Ok(pairs);
            }
            match line.strip_prefix(tokens::STATS_PREFIX) {
                Some(rest) => {
                    let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                    pairs.push((name.to_string(), value.to_string()));
                }
                None => return Err(Error::Server(line)),
            }
        }
    }

    /// Empties the remote cache.
    pub async fn flush(&mut self) -> Result<()> {
        self.send(b"flush\r\n").await?;
        match self.read_line().await?.as_str() {
            tokens::OK => Ok(()),
            other => Err(Error::Server(other.to_string())),
        }
    }

    /// The server's version string, prefix stripped.
    pub async fn version(&mut self) -> Result<String> {
        self.send(b"version\r\n").await?;
        let line = self.read_line().await?;
        match line.strip_prefix(tokens::VERSION_PREFIX) {
            Some(version) => Ok(version.to_string()),
            None => Err(Error::Server(line)),
        }
    }

    /// Closes the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn send(&mut self, request: &[u8]) -> Result<()> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// One CRLF-terminated line, terminator stripped.
    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(at) = find_crlf(&self.buffer) {
                let line = self.buffer.split_to(at + 2);
                return Ok(String::from_utf8_lossy(&line[..at]).into_owned());
            }
            self.fill().await?;
        }
    }

    /// Exactly `length` payload bytes plus their trailing CRLF.
    async fn read_data(&mut self, length: usize) -> Result<Bytes> {
        while self.buffer.len() < length + 2 {
            self.fill().await?;
        }
        let mut chunk = self.buffer.split_to(length + 2);
        chunk.truncate(length);
        Ok(chunk.freeze())
    }

    async fn fill(&mut self) -> Result<()> {
        let n = timeout(self.timeout, self.stream.get_mut().read_buf(&mut self.buffer))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheConfig};
    use crate::server::{Server, ServerConfig};
    use serde_json::json;

    async fn connected() -> (Server, ServerConnection) {
        let cache = Cache::new(CacheConfig::Unbounded);
        let server = Server::start(
            ServerConfig {
                port: 0,
                ..Default::default()
            },
            cache,
        )
        .await
        .unwrap();
        let location = server.local_addr().to_string();
        let connection = ServerConnection::connect(&location, &ClientOptions::default())
            .await
            .unwrap();
        (server, connection)
    }

    #[test]
    fn endpoint_parsing() {
        let endpoint = Endpoint::parse("cache.local:11211").unwrap();
        assert_eq!(endpoint.host, "cache.local");
        assert_eq!(endpoint.port, 11211);
        assert_eq!(endpoint.address(), "cache.local:11211");

        assert!(Endpoint::parse("no-port").is_err());
        assert!(Endpoint::parse(":11211").is_err());
        assert!(Endpoint::parse("host:not-a-port").is_err());
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let (_server, mut conn) = connected().await;

        assert!(conn.set("greeting", &Value::from("hello"), 0).await.unwrap());
        assert_eq!(
            conn.get("greeting").await.unwrap(),
            Some(Value::from("hello"))
        );
        assert_eq!(conn.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_values_come_back_structured() {
        let (_server, mut conn) = connected().await;

        let value = Value::Json(json!({"id": 7, "tags": ["a", "b"]}));
        assert!(conn.set("item", &value, 0).await.unwrap());
        assert_eq!(conn.get("item").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn add_replace_append() {
        let (_server, mut conn) = connected().await;

        assert!(!conn.replace("k", &Value::from("x"), 0).await.unwrap());
        assert!(conn.add("k", &Value::from("x"), 0).await.unwrap());
        assert!(!conn.add("k", &Value::from("y"), 0).await.unwrap());
        assert!(conn.append("k", &Value::from("y")).await.unwrap());
        assert!(conn.prepend("k", &Value::from("w")).await.unwrap());
        assert_eq!(conn.get("k").await.unwrap(), Some(Value::from("wxy")));
    }

    #[tokio::test]
    async fn delete_and_touch() {
        let (_server, mut conn) = connected().await;

        assert!(!conn.delete("k").await.unwrap());
        assert!(!conn.touch("k", 10).await.unwrap());
        conn.set("k", &Value::from("v"), 0).await.unwrap();
        assert!(conn.touch("k", 10).await.unwrap());
        assert!(conn.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn incr_decr_and_errors() {
        let (_server, mut conn) = connected().await;

        assert_eq!(conn.incr("n", 1).await.unwrap(), None);

        conn.set("n", &Value::from("10"), 0).await.unwrap();
        assert_eq!(conn.incr("n", 5).await.unwrap(), Some(15));
        assert_eq!(conn.decr("n", 100).await.unwrap(), Some(0));

        conn.set("s", &Value::from("ab"), 0).await.unwrap();
        let error = conn.incr("s", 1).await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "CLIENT_ERROR cannot increment or decrement non-numeric value"
        );
    }

    #[tokio::test]
    async fn stats_and_version() {
        let (_server, mut conn) = connected().await;

        let stats = conn.stats().await.unwrap();
        assert!(stats.iter().any(|(name, _)| name == "curr_items"));
        assert!(stats
            .iter()
            .any(|(name, value)| name == "version" && value.starts_with("embercache-")));

        let version = conn.version().await.unwrap();
        assert!(version.starts_with("embercache-"));
    }

    #[tokio::test]
    async fn flush_clears_remote_state() {
        let (_server, mut conn) = connected().await;

        conn.set("k", &Value::from("v"), 0).await.unwrap();
        conn.flush().await.unwrap();
        assert_eq!(conn.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn idle_server_times_out() {
        // A listener that accepts and then never speaks.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let options = ClientOptions {
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let mut conn = ServerConnection::connect(&addr.to_string(), &options)
            .await
            .unwrap();
        let error = conn.get("k").await.unwrap_err();
        assert!(matches!(error, Error::Timeout));
        assert_eq!(error.to_string(), "timeout");
    }
}
