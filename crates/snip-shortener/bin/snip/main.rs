mod cli;

use crate::cli::{LogFormat, CLI};
use anyhow::{ensure, Context};
use clap::Parser;
use snip_generator::RandomGenerator;
use snip_shortener::{ShortenerService, ShortenerSettings};
use snip_storage::StorageBackend;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    ensure!(
        (1..=32).contains(&config.code_length),
        "code length must be between 1 and 32, got {}",
        config.code_length
    );
    ensure!(config.sweep_interval_secs > 0, "sweep interval must be positive");

    let storage = config.storage_config();
    info!(
        storage_backend = %storage.kind(),
        requested_backend = ?config.storage.map(|b| b.to_string()),
        code_length = config.code_length,
        max_attempts = config.max_attempts,
        sweep_interval_secs = config.sweep_interval_secs,
        "starting snip"
    );

    let backend = StorageBackend::open(&storage)
        .await
        .context("failed to open storage backend")?;

    let settings = ShortenerSettings::builder()
        .max_attempts(config.max_attempts)
        .sweep_interval(Duration::from_secs(config.sweep_interval_secs))
        .build();
    let generator = RandomGenerator::builder()
        .length(config.code_length)
        .build();

    let shutdown = CancellationToken::new();
    let (service, sweep) = ShortenerService::start(backend, generator, settings, &shutdown);

    service.ping_store().await.context("storage is not reachable")?;
    let stats = service.stats().await.context("failed to read store stats")?;
    info!(urls = stats.urls, users = stats.users, "snip ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    shutdown.cancel();
    sweep.shutdown().await;
    service.store().close().await;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}
