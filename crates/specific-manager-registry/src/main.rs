// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Specific Manager Registry server.
//!
//! Serves the SSM lifecycle topics:
//! - on-board (pull an SSM image)
//! - instantiate (start an SSM and wait for it to register)
//! - registration (SSMs announcing themselves)
//! - update and kill

use std::sync::Arc;
use tracing::{info, warn};

use specific_manager_registry::config::Config;
use specific_manager_registry::engine::{ContainerEngine, DockerEngine};
use specific_manager_registry::runtime::RegistryRuntime;
use specific_manager_registry::store;
use specific_manager_registry::transport::LocalBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "specific_manager_registry=info".into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        registration_timeout_ms = config.waiter.timeout.as_millis() as u64,
        poll_interval_ms = config.waiter.poll_interval.as_millis() as u64,
        default_kill_target = %config.default_kill_target,
        persistence = ?config.database.backend,
        "Starting Specific Manager Registry"
    );

    let repository = store::connect(&config.database).await?;

    let engine = Arc::new(DockerEngine::new(config.docker.clone()));
    info!(engine_type = engine.engine_type(), "Container engine initialized");

    let transport = Arc::new(LocalBus::new(config.bus_reply_timeout));

    let mut builder = RegistryRuntime::builder()
        .config(&config)
        .engine(engine)
        .transport(transport);
    if let Some(repository) = repository {
        builder = builder.repository(repository);
    }

    let runtime = builder.build()?.start().await?;

    info!("Specific Manager Registry ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Specific Manager Registry shut down");

    Ok(())
}
