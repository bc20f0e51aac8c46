//! Server-side connection handling.
//!
//! Each accepted socket gets its own handler task running a read loop. A
//! read's worth of bytes is one *segment*: the handler checks for the EOT
//! byte, honors fast mode, then splits the segment at the first CRLF and
//! feeds the pieces to the connection's own [`LineParser`]: the line before
//! the CRLF first, the remainder (payload bytes, usually) second. Responses
//! are framed with CRLF and flushed once per segment.
//!
//! The socket is released on every exit path (clean close, EOT, `quit`,
//! I/O error) because the handler owns it and the task ends.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::error::Result;
use crate::protocol::parser::{LineParser, Step};
use crate::protocol::types::{find_crlf, CRLF, EOT};

/// Initial read buffer capacity.
const READ_BUFFER_SIZE: usize = 4096;

/// Handles a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    parser: LineParser,
    /// Fast mode: answer every segment with `ERROR` and do no work.
    fast: bool,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, addr: SocketAddr, handler: CommandHandler, fast: bool) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            parser: LineParser::new(handler),
            fast,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<()> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;
        match &result {
            Ok(()) => debug!(client = %self.addr, "client disconnected"),
            Err(error) => warn!(client = %self.addr, %error, "connection error"),
        }
        result
    }

    async fn main_loop(&mut self) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

        loop {
            buffer.clear();
            let n = self.stream.get_mut().read_buf(&mut buffer).await?;
            if n == 0 {
                return Ok(());
            }

            let segment = &buffer[..n];
            if segment[0] == EOT {
                debug!(client = %self.addr, "EOT received");
                return Ok(());
            }

            if self.fast {
                self.stream.write_all(b"ERROR\r\n").await?;
                self.stream.flush().await?;
                continue;
            }

            for step in feed_segment(&mut self.parser, segment) {
                match step {
                    Step::Reply(response) => {
                        self.stream.write_all(response.as_bytes()).await?;
                        self.stream.write_all(CRLF).await?;
                    }
                    Step::Quit => {
                        self.stream.flush().await?;
                        debug!(client = %self.addr, "quit");
                        return Ok(());
                    }
                    Step::Pending => {}
                }
            }
            self.stream.flush().await?;
        }
    }
}

/// Splits one read segment at the first CRLF and feeds the pieces in order:
/// the line, then the non-empty remainder. Without a CRLF the segment is fed
/// whole.
pub(crate) fn feed_segment(parser: &mut LineParser, segment: &[u8]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(2);
    match find_crlf(segment) {
        Some(at) => {
            steps.push(parser.feed(&segment[..at]));
            let rest = &segment[at + 2..];
            if !rest.is_empty() {
                steps.push(parser.feed(rest));
            }
        }
        None => steps.push(parser.feed(segment)),
    }
    steps
}

/// Convenience entry point for the accept loop: build a handler, run it,
/// swallow the per-connection error (already logged).
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handler: CommandHandler,
    fast: bool,
) {
    let connection = ConnectionHandler::new(stream, addr, handler, fast);
    let _ = connection.run().await;
}
