//! HTTP server binary.
//!
//! Usage: `colloquy-server [--config <path>] [--speak]`
//!
//! Speech is off by default here; `--speak` plays replies on the host.

use std::path::PathBuf;
use std::sync::Arc;

use colloquy::config::{default_config_path, load_config};
use colloquy::engine::bootstrap;
use colloquy::server::ChatServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config_path = default_config_path();
    let mut speak = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
            }
            "--speak" => speak = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let config = load_config(&config_path)?;
    let engine = Arc::new(bootstrap(&config, speak).await?);
    let server = ChatServer::start(Arc::clone(&engine), &config.server).await?;
    tracing::info!(addr = %server.addr(), "colloquy-server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown();
    engine.shutdown().await;
    Ok(())
}
