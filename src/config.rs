//! Startup configuration
//!
//! The command-line surface: the port to bind and, optionally, the primary
//! this process mirrors. A malformed `--replicaof` value is a fatal startup
//! error reported by the flag parser.

use clap::Parser;
use std::fmt;

/// Server configuration parsed from the command line
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mirrordb",
    about = "An in-memory key-value server with primary/replica replication",
    version
)]
pub struct Config {
    /// Port to bind to (the listener binds 0.0.0.0)
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Run as a replica of the given primary, formatted as "<host> <port>"
    #[arg(long = "replicaof", value_name = "HOST PORT", value_parser = parse_replica_of)]
    pub replica_of: Option<ReplicaOf>,
}

/// Address of the primary this process mirrors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaOf {
    pub host: String,
    pub port: u16,
}

impl ReplicaOf {
    /// Dial string for the primary
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ReplicaOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.port)
    }
}

/// Accept exactly one word host and one decimal port separated by a single
/// space (the `^\w+ \d+$` shape).
fn parse_replica_of(raw: &str) -> Result<ReplicaOf, String> {
    let mut parts = raw.split(' ');
    let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected \"<host> <port>\", got {raw:?}"));
    };
    if host.is_empty() || !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid host in {raw:?}"));
    }
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid port in {raw:?}"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port in {raw:?}: {e}"))?;
    Ok(ReplicaOf {
        host: host.to_string(),
        port,
    })
}
