//! The TCP server.
//!
//! Owns one cache and one listening socket; every accepted connection gets
//! its own handler task (see `connection::handler`). `start` resolves once
//! the listener is bound (a bind failure is the `Err`), and `stop` makes
//! the accept loop quit and waits for it. Connections in flight finish on
//! their own tasks.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::Cache;
use crate::commands::CommandHandler;
use crate::connection::handler::handle_connection;
use crate::error::Result;

/// Server options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Leave Nagle's algorithm enabled on accepted sockets.
    pub delay: bool,
    /// Reply `ERROR` to every segment without parsing it.
    pub fast: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_PORT,
            delay: false,
            fast: false,
        }
    }
}

/// A running server.
pub struct Server {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Server {
    /// Binds and starts accepting. The listening port is recorded on the
    /// cache so `stats` can report it.
    pub async fn start(config: ServerConfig, cache: Cache) -> Result<Server> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        cache.set_port(local_addr.port());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, cache, config, shutdown_rx));
        info!(%local_addr, "server listening");

        Ok(Server {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    /// The address the server is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        info!("server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    cache: Cache,
    config: ServerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        if !config.delay {
                            if let Err(error) = stream.set_nodelay(true) {
                                debug!(%error, "set_nodelay failed");
                            }
                        }
                        let handler = CommandHandler::new(cache.clone());
                        tokio::spawn(handle_connection(stream, addr, handler, config.fast));
                    }
                    Err(error) => {
                        error!(%error, "failed to accept connection");
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("accept loop shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_test_server(fast: bool) -> (Server, SocketAddr, Cache) {
        let cache = Cache::new(CacheConfig::Unbounded);
        let config = ServerConfig {
            port: 0,
            fast,
            ..Default::default()
        };
        let server = Server::start(config, cache.clone()).await.unwrap();
        let addr = server.local_addr();
        (server, addr, cache)
    }

    async fn send(stream: &mut TcpStream, request: &[u8]) -> String {
        stream.write_all(request).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn basic_set_get_delete() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"set foo 0 0 5\r\nhello\r\n").await, "STORED\r\n");
        assert_eq!(
            send(&mut client, b"get foo\r\n").await,
            "VALUE foo 0 5\r\nhello\r\nEND\r\n"
        );
        assert_eq!(send(&mut client, b"delete foo\r\n").await, "DELETED\r\n");
        assert_eq!(send(&mut client, b"get foo\r\n").await, "END\r\n");
    }

    #[tokio::test]
    async fn replace_and_add_semantics() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(
            send(&mut client, b"replace bar 0 0 1\r\nx\r\n").await,
            "NOT_STORED\r\n"
        );
        assert_eq!(send(&mut client, b"add bar 0 0 1\r\nx\r\n").await, "STORED\r\n");
        assert_eq!(
            send(&mut client, b"add bar 0 0 1\r\ny\r\n").await,
            "NOT_STORED\r\n"
        );
        assert_eq!(
            send(&mut client, b"replace bar 0 0 1\r\ny\r\n").await,
            "STORED\r\n"
        );
    }

    #[tokio::test]
    async fn incr_decr_with_clamping() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"set n 0 0 2\r\n10\r\n").await, "STORED\r\n");
        assert_eq!(send(&mut client, b"incr n 5\r\n").await, "15\r\n");
        assert_eq!(send(&mut client, b"decr n 20\r\n").await, "0\r\n");
    }

    #[tokio::test]
    async fn incr_on_non_numeric_value() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"set s 0 0 2\r\nab\r\n").await, "STORED\r\n");
        assert_eq!(
            send(&mut client, b"incr s 5\r\n").await,
            "CLIENT_ERROR cannot increment or decrement non-numeric value\r\n"
        );
    }

    #[tokio::test]
    async fn touch_missing_then_present() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"touch k 10\r\n").await, "NOT_FOUND\r\n");
        assert_eq!(send(&mut client, b"set k 0 0 1\r\nz\r\n").await, "STORED\r\n");
        assert_eq!(send(&mut client, b"touch k 10\r\n").await, "TOUCHED\r\n");
    }

    #[tokio::test]
    async fn stats_response_shape() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let response = send(&mut client, b"stats\r\n").await;
        assert!(response.ends_with("END\r\n"));
        assert!(response.contains("STATS version embercache-"));
        assert!(response.contains(&format!("STATS tcpport {}", addr.port())));
        for line in response.trim_end().split("\r\n") {
            assert!(
                line.starts_with("STATS ") || line == "END",
                "unexpected line: {}",
                line
            );
        }
    }

    #[tokio::test]
    async fn payload_split_with_crlf_on_boundary() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"set foo 0 0 5\r\nhel").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(send(&mut client, b"lo\r\n").await, "STORED\r\n");
        assert_eq!(
            send(&mut client, b"get foo\r\n").await,
            "VALUE foo 0 5\r\nhello\r\nEND\r\n"
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(
            send(&mut client, b"set foo 0 0 3\r\ntoo long for three\r\n").await,
            "CLIENT_ERROR bad data chunk\r\n"
        );
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"bogus\r\n").await, "ERROR\r\n");
    }

    #[tokio::test]
    async fn quit_closes_the_connection() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"quit\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn eot_closes_the_connection() {
        let (_server, addr, _) = start_test_server(false).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&[0x04]).await.unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn fast_mode_replies_error_to_everything() {
        let (_server, addr, _) = start_test_server(true).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert_eq!(send(&mut client, b"get foo\r\n").await, "ERROR\r\n");
        assert_eq!(send(&mut client, b"version\r\n").await, "ERROR\r\n");
    }

    #[tokio::test]
    async fn state_is_shared_across_connections() {
        let (_server, addr, _) = start_test_server(false).await;

        let mut writer = TcpStream::connect(addr).await.unwrap();
        assert_eq!(send(&mut writer, b"set shared 0 0 3\r\nabc\r\n").await, "STORED\r\n");

        let mut reader = TcpStream::connect(addr).await.unwrap();
        assert_eq!(
            send(&mut reader, b"get shared\r\n").await,
            "VALUE shared 0 3\r\nabc\r\nEND\r\n"
        );
    }

    #[tokio::test]
    async fn stop_stops_accepting() {
        let (server, addr, _) = start_test_server(false).await;
        server.stop().await;
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_failure_surfaces_from_start() {
        let cache = Cache::new(CacheConfig::Unbounded);
        let first = Server::start(
            ServerConfig {
                port: 0,
                ..Default::default()
            },
            cache.clone(),
        )
        .await
        .unwrap();

        let taken = first.local_addr().port();
        let result = Server::start(
            ServerConfig {
                port: taken,
                ..Default::default()
            },
            cache,
        )
        .await;
        assert!(result.is_err());
    }
}
