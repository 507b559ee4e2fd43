use clap::Parser;
use mirrordb::replication::handshake;
use mirrordb::server::{self, ServerContext};
use mirrordb::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let port = config.port;
    info!("MirrorDB starting on port {}", port);

    let ctx = Arc::new(ServerContext::new(config));

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    // A replica completes its handshake before serving any client traffic;
    // a half-initialized replica must not come up at all.
    if let Some(primary) = ctx.config.replica_of.clone() {
        info!("running as a replica of {}", primary);
        let conn = match handshake::establish(&primary.addr(), port).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("replication handshake failed: {}", e);
                std::process::exit(1);
            }
        };
        info!("handshake complete, consuming the replication stream");

        let stream_ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.handle(stream_ctx).await {
                error!("primary stream error: {}", e);
            }
            info!("primary stream closed");
        });
    }

    if let Err(e) = server::run(listener, ctx).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}
