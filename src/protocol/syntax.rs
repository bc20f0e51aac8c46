//! The static command table.
//!
//! One entry per wire verb: the positional parameters that follow the verb,
//! the cache operation the verb binds to, and how the operation's result
//! renders back onto the wire. Aliases collapse here: `decr` is `incr` with
//! the amount negated, the whole `set` family shares one wire shape, and
//! `flush_all` targets a scheduled flush. `quit` never reaches the table;
//! the line parser intercepts it.

use crate::error::{Error, Result};

/// How a parameter token is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Taken as-is.
    Str,
    /// Base-10 integer.
    Num,
}

/// One positional parameter in a command's wire syntax.
#[derive(Debug)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub optional: bool,
}

/// The cache operation a verb resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Get,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Delete,
    Incr { negate: bool },
    Touch,
    Stats,
    Flush,
    FlushAll,
    Version,
    Verbosity,
}

/// How a result value maps to response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `true` → `STORED`, `false` → `NOT_STORED`.
    Store,
    /// `true` → `DELETED`, `false` → `NOT_FOUND`.
    Delete,
    /// `true` → `TOUCHED`, `false` → `NOT_FOUND`.
    Touch,
    /// Unconditional `OK`.
    Ok,
    /// `VALUE <key> <flags> <bytes>` block or bare `END`.
    GetReader,
    /// The new numeric value in ASCII decimal, or `NOT_FOUND`.
    IncrReader,
    /// `STATS <name> <value>` lines terminated by `END`.
    StatsReader,
    /// `VERSION <appname>-<semver>`.
    VersionReader,
}

/// The wire syntax of one command.
#[derive(Debug)]
pub struct CommandSyntax {
    pub name: &'static str,
    pub target: Target,
    pub params: &'static [Param],
    pub reply: Reply,
}

/// A parsed parameter token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Num(i64),
}

/// Parameter tokens bound by name, in wire order.
#[derive(Debug, Default)]
pub struct Arguments(Vec<(&'static str, Token)>);

impl Arguments {
    /// The string argument named `name`, if bound.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.iter().find_map(|(n, token)| match token {
            Token::Str(s) if *n == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// The numeric argument named `name`, if bound.
    pub fn num(&self, name: &str) -> Option<i64> {
        self.0.iter().find_map(|(n, token)| match token {
            Token::Num(value) if *n == name => Some(*value),
            _ => None,
        })
    }
}

impl CommandSyntax {
    /// Whether this command is followed by a data payload on the wire.
    pub fn takes_payload(&self) -> bool {
        self.params.iter().any(|param| param.name == "bytes")
    }

    /// Binds wire tokens to this syntax's parameters.
    ///
    /// A missing or unparseable required token is a format error; tokens
    /// left over after all parameters are consumed make the whole line a bad
    /// command.
    pub fn bind(&self, tokens: &[&str]) -> Result<Arguments> {
        let mut bound = Vec::with_capacity(self.params.len());
        let mut rest = tokens.iter();

        for param in self.params {
            match rest.next() {
                Some(raw) => {
                    let token = match param.kind {
                        ParamKind::Str => Token::Str((*raw).to_string()),
                        ParamKind::Num => {
                            Token::Num(raw.parse().map_err(|_| Error::BadFormat)?)
                        }
                    };
                    bound.push((param.name, token));
                }
                None if param.optional => break,
                None => return Err(Error::BadFormat),
            }
        }

        if rest.next().is_some() {
            return Err(Error::BadCommand);
        }
        Ok(Arguments(bound))
    }
}

const fn required(name: &'static str, kind: ParamKind) -> Param {
    Param {
        name,
        kind,
        optional: false,
    }
}

const fn optional(name: &'static str, kind: ParamKind) -> Param {
    Param {
        name,
        kind,
        optional: true,
    }
}

/// The wire shape shared by the whole storage family:
/// `<verb> <key> <flags> <exptime> <bytes>`.
static STORAGE_PARAMS: [Param; 4] = [
    required("key", ParamKind::Str),
    required("flags", ParamKind::Num),
    required("exptime", ParamKind::Num),
    required("bytes", ParamKind::Num),
];

static GET: CommandSyntax = CommandSyntax {
    name: "get",
    target: Target::Get,
    params: &[required("key", ParamKind::Str)],
    reply: Reply::GetReader,
};

static SET: CommandSyntax = CommandSyntax {
    name: "set",
    target: Target::Set,
    params: &STORAGE_PARAMS,
    reply: Reply::Store,
};

static ADD: CommandSyntax = CommandSyntax {
    name: "add",
    target: Target::Add,
    params: &STORAGE_PARAMS,
    reply: Reply::Store,
};

static REPLACE: CommandSyntax = CommandSyntax {
    name: "replace",
    target: Target::Replace,
    params: &STORAGE_PARAMS,
    reply: Reply::Store,
};

static APPEND: CommandSyntax = CommandSyntax {
    name: "append",
    target: Target::Append,
    params: &STORAGE_PARAMS,
    reply: Reply::Store,
};

static PREPEND: CommandSyntax = CommandSyntax {
    name: "prepend",
    target: Target::Prepend,
    params: &STORAGE_PARAMS,
    reply: Reply::Store,
};

static DELETE: CommandSyntax = CommandSyntax {
    name: "delete",
    target: Target::Delete,
    params: &[required("key", ParamKind::Str)],
    reply: Reply::Delete,
};

static INCR: CommandSyntax = CommandSyntax {
    name: "incr",
    target: Target::Incr { negate: false },
    params: &[
        required("key", ParamKind::Str),
        required("amount", ParamKind::Num),
    ],
    reply: Reply::IncrReader,
};

static DECR: CommandSyntax = CommandSyntax {
    name: "decr",
    target: Target::Incr { negate: true },
    params: &[
        required("key", ParamKind::Str),
        required("amount", ParamKind::Num),
    ],
    reply: Reply::IncrReader,
};

static TOUCH: CommandSyntax = CommandSyntax {
    name: "touch",
    target: Target::Touch,
    params: &[
        required("key", ParamKind::Str),
        required("exptime", ParamKind::Num),
    ],
    reply: Reply::Touch,
};

static STATS: CommandSyntax = CommandSyntax {
    name: "stats",
    target: Target::Stats,
    params: &[],
    reply: Reply::StatsReader,
};

static FLUSH: CommandSyntax = CommandSyntax {
    name: "flush",
    target: Target::Flush,
    params: &[],
    reply: Reply::Ok,
};

static FLUSH_ALL: CommandSyntax = CommandSyntax {
    name: "flush_all",
    target: Target::FlushAll,
    params: &[optional("delay", ParamKind::Num)],
    reply: Reply::Ok,
};

static VERSION: CommandSyntax = CommandSyntax {
    name: "version",
    target: Target::Version,
    params: &[],
    reply: Reply::VersionReader,
};

static VERBOSITY: CommandSyntax = CommandSyntax {
    name: "verbosity",
    target: Target::Verbosity,
    params: &[optional("level", ParamKind::Num)],
    reply: Reply::Ok,
};

/// Looks up the syntax for a wire verb. `None` means an unknown command.
pub fn lookup(verb: &str) -> Option<&'static CommandSyntax> {
    match verb {
        "get" => Some(&GET),
        "set" => Some(&SET),
        "add" => Some(&ADD),
        "replace" => Some(&REPLACE),
        "append" => Some(&APPEND),
        "prepend" => Some(&PREPEND),
        "delete" => Some(&DELETE),
        "incr" => Some(&INCR),
        "decr" => Some(&DECR),
        "touch" => Some(&TOUCH),
        "stats" => Some(&STATS),
        "flush" => Some(&FLUSH),
        "flush_all" => Some(&FLUSH_ALL),
        "version" => Some(&VERSION),
        "verbosity" => Some(&VERBOSITY),
        _ => None,
    }
}
