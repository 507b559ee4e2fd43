//! Server module
//!
//! Handles TCP connections and manages the accept loop. Each accepted
//! connection runs in its own task; per-connection failures never affect
//! siblings or the accept loop itself.

mod connection;
mod context;

pub use connection::{Connection, StreamSource};
pub use context::ServerContext;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accept incoming connections forever, one task per client
pub async fn run(listener: TcpListener, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("new connection from {}", addr);

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let conn = Connection::new(socket, addr, StreamSource::Client);
            if let Err(e) = conn.handle(ctx).await {
                error!("connection error from {}: {}", addr, e);
            }
            info!("connection closed: {}", addr);
        });
    }
}
