//! Command dispatcher
//!
//! Routes decoded frames to command handlers and keeps the replication
//! bookkeeping both roles rely on: a replica credits every command
//! consumed from the primary's stream to its processed offset, and a
//! primary propagates client writes to its attached replicas once the
//! client has its reply.

use crate::commands::{Command, CommandError};
use crate::protocol::{codec, Frame};
use crate::server::{Connection, ServerContext};
use std::sync::Arc;
use tracing::{debug, warn};

/// Command dispatcher
pub struct Dispatcher {
    ctx: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Dispatcher { ctx }
    }

    /// Dispatch one decoded frame.
    ///
    /// Command-level problems (unknown verb, bad arity, bad option) are
    /// logged and reported to ordinary clients as an error reply; they
    /// never close the connection. I/O failures bubble up and do.
    pub async fn dispatch(&self, conn: &mut Connection, frame: Frame) -> anyhow::Result<()> {
        let args = match Command::args_from_frame(frame) {
            Ok(args) => args,
            Err(e) => return self.reject(conn, e).await,
        };

        // Re-encoded wire length of the command, credited to the processed
        // offset when the frame came in over the primary's stream.
        let wire_len = codec::command_bytes(&args).len() as u64;

        let command = match Command::parse(&args) {
            Ok(command) => command,
            Err(e) => return self.reject(conn, e).await,
        };

        debug!("dispatching {}", command.name());
        let is_write = command.is_write();
        command.apply(&self.ctx, conn).await?;

        if conn.is_primary_stream() {
            // Mirror the primary's accounting byte for byte, whatever the
            // command was.
            self.ctx.note_stream_bytes(wire_len);
        } else if is_write && self.ctx.is_primary() {
            self.ctx.replication.propagate(&args).await;
        }
        Ok(())
    }

    async fn reject(&self, conn: &Connection, err: CommandError) -> anyhow::Result<()> {
        warn!("rejecting command from {}: {}", conn.peer_addr(), err);
        conn.reply(&Frame::error(format!("ERR {}", err))).await?;
        Ok(())
    }
}
