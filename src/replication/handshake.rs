//! Replica-side handshake client
//!
//! Dials the configured primary and performs the four-step exchange
//! (PING, REPLCONF listening-port, REPLCONF capa, PSYNC), then consumes
//! the bootstrap payload. On success the same connection is handed to the
//! ordinary read loop in replication-stream mode; any failure is fatal to
//! startup, the process must not serve traffic half-initialized.

use crate::protocol::Frame;
use crate::server::{Connection, StreamSource};
use std::fmt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Failure of any step of the replica handshake
#[derive(Debug)]
pub enum HandshakeError {
    /// Connecting or talking to the primary failed
    Io(std::io::Error),

    /// A step got a reply it could not accept
    UnexpectedReply { step: &'static str, reply: String },

    /// The primary closed or corrupted the stream mid-handshake
    Protocol(String),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::Io(e) => write!(f, "i/o error: {}", e),
            HandshakeError::UnexpectedReply { step, reply } => {
                write!(f, "unexpected reply to {}: {}", step, reply)
            }
            HandshakeError::Protocol(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandshakeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HandshakeError {
    fn from(e: std::io::Error) -> Self {
        HandshakeError::Io(e)
    }
}

/// Dial the primary and run the four-step handshake.
///
/// Returns the established connection, marked as the primary's stream and
/// positioned just past the bootstrap payload. Bytes the primary sent
/// after the payload stay buffered and reach the read loop intact.
pub async fn establish(
    primary_addr: &str,
    listening_port: u16,
) -> Result<Connection, HandshakeError> {
    let socket = TcpStream::connect(primary_addr).await?;
    let peer = socket.peer_addr()?;
    let mut conn = Connection::new(socket, peer, StreamSource::Primary);

    exchange(&mut conn, &["PING"], "PONG", "PING").await?;
    exchange(
        &mut conn,
        &["REPLCONF", "listening-port", &listening_port.to_string()],
        "OK",
        "REPLCONF listening-port",
    )
    .await?;
    exchange(&mut conn, &["REPLCONF", "capa", "psync2"], "OK", "REPLCONF capa").await?;

    conn.write_frame(&Frame::command(&["PSYNC", "?", "-1"])).await?;
    let resync = read_reply(&mut conn, "PSYNC").await?;
    // The FULLRESYNC line's content is not validated further.
    debug!("PSYNC reply: {}", resync);

    let snapshot = conn
        .read_snapshot()
        .await
        .map_err(|e| HandshakeError::Protocol(e.to_string()))?;
    info!("bootstrap payload received ({} bytes)", snapshot.len());

    Ok(conn)
}

/// One blocking request/reply step: the reply must be a simple string
/// beginning with `expect`.
async fn exchange(
    conn: &mut Connection,
    parts: &[&str],
    expect: &str,
    step: &'static str,
) -> Result<(), HandshakeError> {
    conn.write_frame(&Frame::command(parts)).await?;
    let reply = read_reply(conn, step).await?;
    match &reply {
        Frame::Simple(text) if text.starts_with(expect) => {
            debug!("{} acknowledged", step);
            Ok(())
        }
        other => Err(HandshakeError::UnexpectedReply {
            step,
            reply: other.to_string(),
        }),
    }
}

async fn read_reply(conn: &mut Connection, step: &'static str) -> Result<Frame, HandshakeError> {
    match conn.read_frame().await {
        Ok(Some(frame)) => Ok(frame),
        Ok(None) => Err(HandshakeError::Protocol(format!(
            "primary closed the connection during {}",
            step
        ))),
        Err(e) => Err(HandshakeError::Protocol(e.to_string())),
    }
}
