//! Replication commands (REPLCONF, PSYNC, WAIT)

use super::{parse_int, CommandError};
use crate::protocol::Frame;
use crate::replication::{ReplicaLink, EMPTY_SNAPSHOT};
use crate::server::{Connection, ServerContext};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// REPLCONF command
///
/// Syntax: REPLCONF option [args...]
///
/// On a primary this acknowledges configuration chatter with OK, except
/// for `ACK <offset>` reports arriving over an attached replica link,
/// which are recorded silently. On a replica only GETACK is meaningful
/// and is answered even though it arrives on the primary's stream.
#[derive(Debug)]
pub struct ReplConf {
    args: Vec<Bytes>,
}

impl ReplConf {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        if args.is_empty() {
            return Err(CommandError::WrongArity("REPLCONF"));
        }
        Ok(ReplConf {
            args: args.to_vec(),
        })
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        if ctx.is_primary() {
            // An OK injected into the replication stream would corrupt it,
            // so ACK intake stays silent.
            if let Some(link) = conn.replica_link() {
                if self.args[0].eq_ignore_ascii_case(b"ack") && self.args.len() == 2 {
                    let offset = parse_int(&self.args[1], "ACK offset")?;
                    if offset >= 0 {
                        link.record_ack(offset as u64);
                        debug!("ack from {}: offset {}", conn.peer_addr(), offset);
                    }
                    return Ok(());
                }
            }
            conn.reply(&Frame::simple("OK")).await?;
            return Ok(());
        }

        if !self.args[0].eq_ignore_ascii_case(b"getack") {
            warn!(
                "REPLCONF on a replica expects GETACK, got {:?}",
                String::from_utf8_lossy(&self.args[0])
            );
            return Ok(());
        }

        // The one reply a replica sends back over the primary's stream.
        // The reported offset does not yet include this GETACK itself.
        let offset = ctx.processed_offset();
        conn.write_frame(&Frame::command(&["REPLCONF", "ACK", &offset.to_string()]))
            .await?;
        Ok(())
    }
}

/// PSYNC command - serve a full resynchronization
///
/// Syntax: PSYNC ? -1
///
/// Replies FULLRESYNC with this primary's replication ID, sends the
/// bootstrap payload as `$<len>\r\n<bytes>` with no trailing CRLF, and
/// attaches the connection to the broadcast set.
#[derive(Debug)]
pub struct Psync;

impl Psync {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        // The replication-id and offset arguments are required but their
        // values are not interpreted; every PSYNC gets a full resync.
        if args.len() != 2 {
            return Err(CommandError::WrongArity("PSYNC"));
        }
        Ok(Psync)
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        let header = format!("FULLRESYNC {} 0", ctx.replication.replication_id());
        conn.write_frame(&Frame::simple(header)).await?;

        conn.write_raw(format!("${}\r\n", EMPTY_SNAPSHOT.len()).as_bytes())
            .await?;
        conn.write_raw(EMPTY_SNAPSHOT).await?;

        let link = ctx
            .replication
            .register(ReplicaLink::new(conn.writer_handle(), conn.peer_addr()))
            .await;
        conn.attach_replica_link(link);
        Ok(())
    }
}

/// WAIT command - block until enough replicas acknowledged the current
/// replication offset
///
/// Syntax: WAIT numreplicas timeout_ms
#[derive(Debug)]
pub struct Wait {
    num_replicas: usize,
    timeout: Duration,
}

impl Wait {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        let [num_replicas, timeout_ms] = args else {
            return Err(CommandError::WrongArity("WAIT"));
        };
        let num_replicas = parse_int(num_replicas, "numreplicas")?;
        let timeout_ms = parse_int(timeout_ms, "timeout")?;
        if num_replicas < 0 || timeout_ms < 0 {
            return Err(CommandError::Invalid(
                "WAIT arguments must not be negative".to_string(),
            ));
        }
        Ok(Wait {
            num_replicas: num_replicas as usize,
            timeout: Duration::from_millis(timeout_ms as u64),
        })
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        let count = ctx
            .replication
            .wait_for_acks(self.num_replicas, self.timeout)
            .await;
        conn.reply(&Frame::integer(count as i64)).await?;
        Ok(())
    }
}
