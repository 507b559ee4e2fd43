//! Command parsing and execution
//!
//! The supported command set is a closed enum of eight commands. Parsing
//! happens in two steps: the argument vector is extracted from a decoded
//! frame (a command is always an array of bulk strings), then the verb is
//! looked up case-insensitively and each command validates its own
//! arguments. Unknown verbs produce a typed error, never a crash.
//!
//! Each command writes its own reply through the connection, which keeps
//! the replication special cases (suppressed replies on the primary's
//! stream, the raw PSYNC payload, the GETACK answer) local to the handler
//! concerned.

mod replication;
mod server;
mod string;

pub use replication::{Psync, ReplConf, Wait};
pub use server::{Echo, Info, Ping};
pub use string::{Get, Set};

use crate::protocol::Frame;
use crate::server::{Connection, ServerContext};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// The closed set of supported commands
#[derive(Debug)]
pub enum Command {
    Ping(Ping),
    Echo(Echo),
    Set(Set),
    Get(Get),
    Info(Info),
    ReplConf(ReplConf),
    Psync(Psync),
    Wait(Wait),
}

impl Command {
    /// Extract a command's argument vector from a decoded frame
    pub fn args_from_frame(frame: Frame) -> Result<Vec<Bytes>, CommandError> {
        let items = match frame {
            Frame::Array(items) if !items.is_empty() => items,
            Frame::Array(_) => return Err(CommandError::BadFrame("empty command array")),
            _ => return Err(CommandError::BadFrame("expected a command array")),
        };
        items
            .into_iter()
            .map(|item| match item {
                Frame::Bulk(data) => Ok(data),
                _ => Err(CommandError::BadFrame(
                    "command elements must be bulk strings",
                )),
            })
            .collect()
    }

    /// Look up the verb case-insensitively and validate the arguments
    pub fn parse(args: &[Bytes]) -> Result<Command, CommandError> {
        let Some(name) = args.first() else {
            return Err(CommandError::BadFrame("empty command array"));
        };
        let name = std::str::from_utf8(name)
            .map_err(|_| CommandError::BadFrame("command name is not valid UTF-8"))?;
        let rest = &args[1..];

        match name.to_ascii_lowercase().as_str() {
            "ping" => Ok(Command::Ping(Ping::parse(rest)?)),
            "echo" => Ok(Command::Echo(Echo::parse(rest)?)),
            "set" => Ok(Command::Set(Set::parse(rest)?)),
            "get" => Ok(Command::Get(Get::parse(rest)?)),
            "info" => Ok(Command::Info(Info::parse(rest)?)),
            "replconf" => Ok(Command::ReplConf(ReplConf::parse(rest)?)),
            "psync" => Ok(Command::Psync(Psync::parse(rest)?)),
            "wait" => Ok(Command::Wait(Wait::parse(rest)?)),
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }

    /// Command name (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Echo(_) => "ECHO",
            Command::Set(_) => "SET",
            Command::Get(_) => "GET",
            Command::Info(_) => "INFO",
            Command::ReplConf(_) => "REPLCONF",
            Command::Psync(_) => "PSYNC",
            Command::Wait(_) => "WAIT",
        }
    }

    /// Whether this command mutates the keyspace and must be propagated
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set(_))
    }

    /// Execute the command, writing any reply through the connection
    pub async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        match self {
            Command::Ping(cmd) => cmd.apply(conn).await,
            Command::Echo(cmd) => cmd.apply(conn).await,
            Command::Set(cmd) => cmd.apply(ctx, conn).await,
            Command::Get(cmd) => cmd.apply(ctx, conn).await,
            Command::Info(cmd) => cmd.apply(ctx, conn).await,
            Command::ReplConf(cmd) => cmd.apply(ctx, conn).await,
            Command::Psync(cmd) => cmd.apply(ctx, conn).await,
            Command::Wait(cmd) => cmd.apply(ctx, conn).await,
        }
    }
}

/// Errors surfaced while turning a frame into a runnable command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Unrecognized verb
    Unknown(String),

    /// Wrong argument count for a known verb
    WrongArity(&'static str),

    /// An argument failed validation
    Invalid(String),

    /// The decoded frame is not an array of bulk strings
    BadFrame(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unknown(name) => write!(f, "unknown command '{}'", name),
            CommandError::WrongArity(name) => {
                write!(f, "wrong number of arguments for '{}' command", name)
            }
            CommandError::Invalid(msg) => write!(f, "{}", msg),
            CommandError::BadFrame(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse a decimal integer argument
pub(crate) fn parse_int(arg: &[u8], what: &str) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| CommandError::Invalid(format!("{} must be an integer", what)))
}
