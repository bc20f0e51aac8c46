//! Per-connection streaming parser.
//!
//! A tiny two-state machine. In `Header` mode each fed segment is one
//! command line; storage commands that advertise a nonzero byte count flip
//! the parser into `Payload` mode, where segments accumulate raw data until
//! the advertised count is satisfied. The byte count is authoritative; the
//! CRLF is framing only and is trimmed solely from the final payload
//! segment.
//!
//! The parser never searches for CRLF itself; the connection layer splits
//! segments before feeding them (see `connection::handler`). Parse errors
//! recover locally: the state resets to `Header` and the connection stays
//! open.

use bytes::Bytes;

use crate::commands::CommandHandler;
use crate::error::Error;
use crate::protocol::syntax::{self, Arguments, CommandSyntax};
use crate::protocol::types::tokens;

/// What the connection should do after feeding one segment.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing to write; the parser is waiting on payload bytes.
    Pending,
    /// A response to frame and write.
    Reply(String),
    /// The client asked to disconnect.
    Quit,
}

enum State {
    Header,
    Payload {
        syntax: &'static CommandSyntax,
        args: Arguments,
        remaining: usize,
        data: Vec<u8>,
    },
}

/// The per-connection parser; owns the command handler it feeds into.
pub struct LineParser {
    handler: CommandHandler,
    state: State,
}

impl LineParser {
    pub fn new(handler: CommandHandler) -> Self {
        Self {
            handler,
            state: State::Header,
        }
    }

    /// Feeds one pre-split segment: a command line in header mode, a chunk
    /// of payload in payload mode.
    pub fn feed(&mut self, segment: &[u8]) -> Step {
        match std::mem::replace(&mut self.state, State::Header) {
            State::Header => self.feed_header(segment),
            State::Payload {
                syntax,
                args,
                remaining,
                data,
            } => self.feed_payload(syntax, args, remaining, data, segment),
        }
    }

    fn feed_header(&mut self, segment: &[u8]) -> Step {
        let line = String::from_utf8_lossy(segment);
        let mut pieces = line.split_whitespace();

        let verb = match pieces.next() {
            Some(verb) => verb,
            None => return Step::Reply(tokens::ERROR.to_string()),
        };
        if verb == "quit" {
            return Step::Quit;
        }

        let syntax = match syntax::lookup(verb) {
            Some(syntax) => syntax,
            None => return Step::Reply(tokens::ERROR.to_string()),
        };

        let rest: Vec<&str> = pieces.collect();
        let args = match syntax.bind(&rest) {
            Ok(args) => args,
            Err(error) => return Step::Reply(error.to_string()),
        };

        if syntax.takes_payload() {
            let advertised = args.num("bytes").unwrap_or(0);
            if advertised > 0 {
                let remaining = advertised as usize;
                self.state = State::Payload {
                    syntax,
                    args,
                    remaining,
                    data: Vec::with_capacity(remaining),
                };
                return Step::Pending;
            }
        }

        Step::Reply(self.handler.execute(syntax, &args, None))
    }

    fn feed_payload(
        &mut self,
        syntax: &'static CommandSyntax,
        args: Arguments,
        remaining: usize,
        mut data: Vec<u8>,
        segment: &[u8],
    ) -> Step {
        if segment.len() < remaining {
            // Mid-payload: buffer literally, CRLF included if any.
            data.extend_from_slice(segment);
            self.state = State::Payload {
                syntax,
                args,
                remaining: remaining - segment.len(),
                data,
            };
            return Step::Pending;
        }

        let trimmed = trim_trailing_crlf(segment);
        if trimmed.len() > remaining {
            // Overlong chunk; the state has already reset to Header.
            return Step::Reply(Error::BadPayload.to_string());
        }

        data.extend_from_slice(trimmed);
        Step::Reply(self.handler.execute(syntax, &args, Some(Bytes::from(data))))
    }
}

/// Drops one trailing `\n` and then one trailing `\r`, if present.
fn trim_trailing_crlf(segment: &[u8]) -> &[u8] {
    let mut end = segment.len();
    if end > 0 && segment[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && segment[end - 1] == b'\r' {
        end -= 1;
    }
    &segment[..end]
}
