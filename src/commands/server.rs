//! Connection-level commands (PING, ECHO, INFO)

use super::CommandError;
use crate::protocol::Frame;
use crate::server::{Connection, ServerContext};
use bytes::Bytes;
use std::sync::Arc;

/// PING command
///
/// Syntax: PING
#[derive(Debug)]
pub struct Ping;

impl Ping {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        if !args.is_empty() {
            return Err(CommandError::WrongArity("PING"));
        }
        Ok(Ping)
    }

    pub(crate) async fn apply(self, conn: &mut Connection) -> anyhow::Result<()> {
        conn.reply(&Frame::simple("PONG")).await?;
        Ok(())
    }
}

/// ECHO command
///
/// Syntax: ECHO message
#[derive(Debug)]
pub struct Echo {
    message: Bytes,
}

impl Echo {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        match args {
            [message] => Ok(Echo {
                message: message.clone(),
            }),
            _ => Err(CommandError::WrongArity("ECHO")),
        }
    }

    pub(crate) async fn apply(self, conn: &mut Connection) -> anyhow::Result<()> {
        conn.reply(&Frame::Bulk(self.message)).await?;
        Ok(())
    }
}

/// INFO command - report the replication section
///
/// Syntax: INFO [section]
///
/// The optional section argument is accepted but the reply always carries
/// the replication block.
#[derive(Debug)]
pub struct Info;

impl Info {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        if args.len() > 1 {
            return Err(CommandError::WrongArity("INFO"));
        }
        Ok(Info)
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        let mut lines = vec!["# Replication".to_string()];
        if ctx.is_primary() {
            lines.push("role:master".to_string());
            lines.push(format!(
                "master_replid:{}",
                ctx.replication.replication_id()
            ));
            lines.push(format!("master_repl_offset:{}", ctx.replication.offset()));
        } else {
            lines.push("role:slave".to_string());
        }

        conn.reply(&Frame::bulk(lines.join("\r\n"))).await?;
        Ok(())
    }
}
