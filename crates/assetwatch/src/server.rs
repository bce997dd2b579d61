use std::net::SocketAddr;

use anyhow::{Context, Result};
use assetwatch_service::metric;

use assetwatch_service::config::Config;

use crate::endpoints;
use crate::service::GatewayService;

/// Starts the HTTP server based on the loaded config.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("assetwatch-web")
        .enable_all()
        .build()?;

    let socket = config.bind.parse::<SocketAddr>()?;
    let service = GatewayService::create(config).context("failed to create service state")?;

    tracing::info!("Starting HTTP server on {}", socket);
    web_pool.block_on(
        axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service()),
    )?;
    tracing::info!("System shutdown complete");

    Ok(())
}
