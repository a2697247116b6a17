mod assess;
mod config;
mod error;
mod model;
mod recommendation;
mod references;
mod sections;
mod server;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use heart_common::openai::AssistantClient;

use config::Config;
use server::HeartServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting heart-server");

    let config = Config::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        assistant_id = %config.assistant_id,
        base_url = %config.openai.base_url,
        timeout_ms = config.openai.default_timeout.as_millis(),
        poll_interval_ms = config.poll.interval.as_millis(),
        poll_timeout_ms = config.poll.timeout.as_millis(),
        "configuration loaded"
    );

    let assistant = Arc::new(AssistantClient::new(config.openai.clone())?);

    let audit = Arc::new(config.audit.open()?);
    info!(backend = audit.backend(), "audit store ready");

    let server = HeartServer::new(assistant, &config.assistant_id, audit, config.poll);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "heart-server ready, serving HTTP");
    axum::serve(listener, server.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("heart-server shut down");
    Ok(())
}
