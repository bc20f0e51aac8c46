//! Command execution.
//!
//! The handler binds a parsed command to the cache operation it names and
//! renders the result as the wire response. Errors come back as response
//! strings too: a failed command never tears down the connection, it just
//! reports its token.

use bytes::Bytes;
use tracing::trace;

use crate::cache::Cache;
use crate::protocol::syntax::{Arguments, CommandSyntax, Reply, Target};
use crate::protocol::types::tokens;

/// Executes commands against a shared cache and formats wire responses.
#[derive(Clone)]
pub struct CommandHandler {
    cache: Cache,
}

impl CommandHandler {
    /// Creates a handler over the given cache handle.
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// The cache this handler executes against.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Runs one command and returns the response string (without the final
    /// CRLF; the connection layer frames it).
    pub fn execute(
        &self,
        syntax: &CommandSyntax,
        args: &Arguments,
        payload: Option<Bytes>,
    ) -> String {
        trace!(command = syntax.name, "executing");
        let key = args.str("key").unwrap_or_default();

        match syntax.target {
            Target::Get => self.render_get(key),
            Target::Set | Target::Add | Target::Replace => {
                let value = payload.unwrap_or_default();
                let exptime = args.num("exptime").unwrap_or(0);
                let flags = args.num("flags").unwrap_or(0) as u32;
                let stored = match syntax.target {
                    Target::Set => self.cache.set(key, value, exptime, flags),
                    Target::Add => self.cache.add(key, value, exptime, flags),
                    _ => self.cache.replace(key, value, exptime, flags),
                };
                render_reply(syntax.reply, stored)
            }
            Target::Append | Target::Prepend => {
                let value = payload.unwrap_or_default();
                let stored = if syntax.target == Target::Append {
                    self.cache.append(key, &value)
                } else {
                    self.cache.prepend(key, &value)
                };
                render_reply(syntax.reply, stored)
            }
            Target::Delete => render_reply(syntax.reply, self.cache.delete(key)),
            Target::Incr { negate } => {
                let amount = args.num("amount").unwrap_or(0);
                let amount = if negate { amount.saturating_neg() } else { amount };
                match self.cache.incr(key, amount) {
                    Ok(Some(value)) => value.to_string(),
                    Ok(None) => tokens::NOT_FOUND.to_string(),
                    Err(error) => error.to_string(),
                }
            }
            Target::Touch => {
                let exptime = args.num("exptime").unwrap_or(0);
                render_reply(syntax.reply, self.cache.touch(key, exptime))
            }
            Target::Stats => self.render_stats(),
            Target::Flush => {
                self.cache.flush();
                tokens::OK.to_string()
            }
            Target::FlushAll => {
                let delay = args.num("delay").unwrap_or(0).max(0) as u64;
                self.cache.flush_all(delay);
                tokens::OK.to_string()
            }
            Target::Version => format!("{}{}", tokens::VERSION_PREFIX, self.cache.version()),
            Target::Verbosity => tokens::OK.to_string(),
        }
    }

    fn render_get(&self, key: &str) -> String {
        match self.cache.get_record(key) {
            Some(record) => {
                let data = String::from_utf8_lossy(&record.value);
                format!(
                    "{}{} {} {}\r\n{}\r\n{}",
                    tokens::VALUE_PREFIX,
                    key,
                    record.flags,
                    record.value.len(),
                    data,
                    tokens::END
                )
            }
            None => tokens::END.to_string(),
        }
    }

    fn render_stats(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.cache.stats() {
            out.push_str(tokens::STATS_PREFIX);
            out.push_str(&name);
            out.push(' ');
            out.push_str(&value);
            out.push_str("\r\n");
        }
        out.push_str(tokens::END);
        out
    }
}

fn render_reply(reply: Reply, outcome: bool) -> String {
    let token = match (reply, outcome) {
        (Reply::Store, true) => tokens::STORED,
        (Reply::Store, false) => tokens::NOT_STORED,
        (Reply::Delete, true) => tokens::DELETED,
        (Reply::Delete, false) => tokens::NOT_FOUND,
        (Reply::Touch, true) => tokens::TOUCHED,
        (Reply::Touch, false) => tokens::NOT_FOUND,
        _ => tokens::OK,
    };
    token.to_string()
}
