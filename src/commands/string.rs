//! Keyspace commands (SET, GET)

use super::{parse_int, CommandError};
use crate::protocol::Frame;
use crate::server::{Connection, ServerContext};
use crate::store::Entry;
use bytes::Bytes;
use std::sync::Arc;

/// SET command - upsert a key
///
/// Syntax: SET key value [PX milliseconds]
#[derive(Debug)]
pub struct Set {
    key: Bytes,
    value: Bytes,
    expire_ms: Option<i64>,
}

impl Set {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        match args.len() {
            2 => Ok(Set {
                key: args[0].clone(),
                value: args[1].clone(),
                expire_ms: None,
            }),
            4 => {
                if !args[2].eq_ignore_ascii_case(b"px") {
                    return Err(CommandError::Invalid(
                        "SET supports only the PX option".to_string(),
                    ));
                }
                let ms = parse_int(&args[3], "PX milliseconds")?;
                Ok(Set {
                    key: args[0].clone(),
                    value: args[1].clone(),
                    expire_ms: Some(ms),
                })
            }
            _ => Err(CommandError::WrongArity("SET")),
        }
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        let entry = match self.expire_ms {
            Some(ms) => Entry::with_expiry(self.value, ms),
            None => Entry::new(self.value),
        };
        ctx.store.lock().await.set(self.key, entry);

        conn.reply(&Frame::simple("OK")).await?;
        Ok(())
    }
}

/// GET command - read the live value of a key
///
/// Syntax: GET key
#[derive(Debug)]
pub struct Get {
    key: Bytes,
}

impl Get {
    pub(crate) fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        match args {
            [key] => Ok(Get { key: key.clone() }),
            _ => Err(CommandError::WrongArity("GET")),
        }
    }

    pub(crate) async fn apply(
        self,
        ctx: &Arc<ServerContext>,
        conn: &mut Connection,
    ) -> anyhow::Result<()> {
        let value = ctx.store.lock().await.get(&self.key);

        let reply = match value {
            Some(data) => Frame::Bulk(data),
            None => Frame::NullBulk,
        };
        conn.reply(&reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|part| Bytes::copy_from_slice(part.as_bytes()))
            .collect()
    }

    #[test]
    fn test_set_parses_px_case_insensitively() {
        for px in ["PX", "px", "Px"] {
            let set = Set::parse(&args(&["key", "value", px, "250"])).unwrap();
            assert_eq!(set.expire_ms, Some(250));
        }
    }

    #[test]
    fn test_set_accepts_negative_px() {
        let set = Set::parse(&args(&["key", "value", "px", "-5"])).unwrap();
        assert_eq!(set.expire_ms, Some(-5));
    }

    #[test]
    fn test_set_rejects_other_options() {
        assert!(Set::parse(&args(&["key", "value", "EX", "250"])).is_err());
        assert!(Set::parse(&args(&["key", "value", "px", "soon"])).is_err());
    }

    #[test]
    fn test_get_requires_one_key() {
        assert!(Get::parse(&args(&["key"])).is_ok());
        assert!(Get::parse(&args(&[])).is_err());
        assert!(Get::parse(&args(&["key", "other"])).is_err());
    }
}
