//! Replica server entry point.

use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

/// Backend replica behind the load balancer
#[derive(Parser, Debug)]
#[command(name = "replica-server")]
struct Args {
    /// Identity reported by /home
    #[arg(long, env = "SERVER_ID", default_value = "Unknown")]
    server_id: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    balancer::trace::init(&args.log_level)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(server_id = %args.server_id, %addr, "replica server listening");

    axum::serve(listener, balancer::replica::router(args.server_id)).await?;
    Ok(())
}
