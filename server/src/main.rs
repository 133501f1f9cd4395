mod config;
mod service;
mod session;

use std::sync::Arc;

use anyhow::Context;
use peci_shared::sim::SimTarget;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::ServerConfig;
use service::RawService;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::from_env();
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Raw PECI service listening on {}", config.listen_addr);

    let service = Arc::new(Mutex::new(RawService::new(SimTarget::new())));

    loop {
        let (socket, addr) = listener.accept().await?;
        debug!("Connection from {}", addr);

        let service = service.clone();
        tokio::spawn(async move {
            match session::handle_connection(socket, service).await {
                Ok(()) => debug!("Client disconnected: {}", addr),
                Err(e) => warn!("Dropped connection from {}: {}", addr, e),
            }
        });
    }
}
