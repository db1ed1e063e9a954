// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the Specific Manager Registry.
//!
//! [`RegistryRuntime`] wires a transport, a container engine and optional
//! persistence into a running registry, so it can be embedded in an existing
//! tokio application instead of running as a standalone binary.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use specific_manager_registry::engine::DockerEngine;
//! use specific_manager_registry::runtime::RegistryRuntime;
//! use specific_manager_registry::transport::LocalBus;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = RegistryRuntime::builder()
//!         .engine(Arc::new(DockerEngine::from_env()))
//!         .transport(Arc::new(LocalBus::default()))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{DEFAULT_KILL_TARGET, Config};
use crate::engine::ContainerEngine;
use crate::messages::{PluginAnnouncement, TOPIC_PLUGIN_REGISTER, encode};
use crate::orchestrator::Orchestrator;
use crate::registry::Registry;
use crate::server::RegistryServer;
use crate::store::SsmRepository;
use crate::transport::Transport;
use crate::waiter::WaiterConfig;

/// Name the registry announces itself under.
pub const PLUGIN_NAME: &str = "SMR";

/// Description sent with the plugin announcement.
pub const PLUGIN_DESCRIPTION: &str = "Specific Manager Registry";

/// Builder for creating a [`RegistryRuntime`].
pub struct RegistryRuntimeBuilder {
    engine: Option<Arc<dyn ContainerEngine>>,
    transport: Option<Arc<dyn Transport>>,
    repository: Option<Arc<dyn SsmRepository>>,
    registry: Option<Arc<Registry>>,
    waiter: WaiterConfig,
    default_kill_target: String,
}

impl Default for RegistryRuntimeBuilder {
    fn default() -> Self {
        Self {
            engine: None,
            transport: None,
            repository: None,
            registry: None,
            waiter: WaiterConfig::default(),
            default_kill_target: DEFAULT_KILL_TARGET.to_string(),
        }
    }
}

impl RegistryRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take waiter timing and the default kill target from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.waiter = config.waiter;
        self.default_kill_target = config.default_kill_target.clone();
        self
    }

    /// Set the container engine (required).
    pub fn engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the transport (required).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Mirror SSM requests to a repository.
    pub fn repository(mut self, repository: Arc<dyn SsmRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Share an existing registry instead of creating one.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the registration wait timing.
    pub fn waiter(mut self, waiter: WaiterConfig) -> Self {
        self.waiter = waiter;
        self
    }

    /// Set the SSM killed by update when a request names none.
    pub fn default_kill_target(mut self, target: impl Into<String>) -> Self {
        self.default_kill_target = target.into();
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<RegistryRuntimeConfig> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("engine is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("transport is required"))?;

        let registry = self.registry.unwrap_or_default();
        let mut orchestrator = Orchestrator::new(registry.clone(), engine.clone(), self.waiter)
            .with_default_kill_target(self.default_kill_target);
        if let Some(repository) = self.repository {
            orchestrator = orchestrator.with_repository(repository);
        }

        Ok(RegistryRuntimeConfig {
            transport,
            registry,
            engine_type: engine.engine_type(),
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// Configuration for a [`RegistryRuntime`].
pub struct RegistryRuntimeConfig {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    engine_type: &'static str,
    orchestrator: Arc<Orchestrator>,
}

impl RegistryRuntimeConfig {
    /// Bind the topics, spawn the server and announce the plugin.
    pub async fn start(self) -> Result<RegistryRuntime> {
        let server = RegistryServer::bind(self.transport.as_ref(), self.orchestrator.clone()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(server.run(shutdown_rx));

        announce(self.transport.as_ref()).await;

        info!(
            transport = self.transport.name(),
            engine = self.engine_type,
            default_kill_target = %self.orchestrator.default_kill_target(),
            "RegistryRuntime started"
        );

        Ok(RegistryRuntime {
            server_handle,
            shutdown_tx,
            registry: self.registry,
            orchestrator: self.orchestrator,
        })
    }
}

async fn announce(transport: &dyn Transport) {
    let announcement = PluginAnnouncement {
        name: PLUGIN_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: PLUGIN_DESCRIPTION.to_string(),
    };

    let payload = match encode(&announcement) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to encode plugin announcement");
            return;
        }
    };

    if let Err(e) = transport.publish(TOPIC_PLUGIN_REGISTER, payload).await {
        warn!(error = %e, "Failed to publish plugin announcement");
    }
}

/// A running registry.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct RegistryRuntime {
    server_handle: JoinHandle<Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    registry: Arc<Registry>,
    orchestrator: Arc<Orchestrator>,
}

impl RegistryRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> RegistryRuntimeBuilder {
        RegistryRuntimeBuilder::new()
    }

    /// The registry maintained by this runtime.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The orchestrator serving requests.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("RegistryRuntime shutting down...");

        let _ = self.shutdown_tx.send(true);

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("RegistryRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Registry server error during shutdown");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Registry server task panicked");
                Err(e.into())
            }
        }
    }
}
