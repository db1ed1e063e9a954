// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for registry integration tests.
//!
//! Provides payload builders and a TestContext running the full registry on
//! an in-process bus with a mock engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use specific_manager_registry::engine::MockEngine;
use specific_manager_registry::messages::{RegistrationCommand, SsmImage, TOPIC_REGISTRATION};
use specific_manager_registry::orchestrator::Orchestrator;
use specific_manager_registry::registry::{Registry, SsmRegistration};
use specific_manager_registry::runtime::RegistryRuntime;
use specific_manager_registry::store::SsmRepository;
use specific_manager_registry::transport::{LocalBus, Transport};
use specific_manager_registry::waiter::WaiterConfig;

/// Registration timeout used by tests (5 "time units").
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval used by tests.
pub const POLL: Duration = Duration::from_millis(100);

pub fn waiter_config() -> WaiterConfig {
    WaiterConfig {
        timeout: TIMEOUT,
        poll_interval: POLL,
    }
}

pub fn registration(name: &str) -> SsmRegistration {
    SsmRegistration {
        name: name.to_string(),
        version: "1.0".to_string(),
        description: "x".to_string(),
    }
}

pub fn registration_command(name: &str) -> RegistrationCommand {
    RegistrationCommand {
        registration: registration(name),
        audit: Default::default(),
    }
}

pub fn ssm_image(image: &str, name: &str) -> SsmImage {
    SsmImage {
        image: image.to_string(),
        name: name.to_string(),
    }
}

/// Orchestrator over a fresh registry and the given engine.
pub fn orchestrator(engine: &MockEngine) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(Registry::new()),
        Arc::new(engine.clone()),
        waiter_config(),
    ))
}

/// Orchestrator mirroring to `repository`.
pub fn orchestrator_with_repository(
    engine: &MockEngine,
    repository: Arc<dyn SsmRepository>,
) -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::new(
            Arc::new(Registry::new()),
            Arc::new(engine.clone()),
            waiter_config(),
        )
        .with_repository(repository),
    )
}

// ============================================================================
// Payloads
// ============================================================================

pub fn on_board_payload(image: &str, id: &str) -> String {
    format!(
        "service_specific_managers:\n  - image: {}\n    id: {}\n",
        image, id
    )
}

pub fn instantiate_payload(image: &str, id: &str) -> String {
    format!(
        "NSD:\n  service_specific_managers:\n    - image: {}\n      id: {}\n",
        image, id
    )
}

pub fn registration_payload(name: &str) -> String {
    format!("name: {}\nversion: '1.0'\ndescription: x\n", name)
}

pub fn update_payload(image: &str, id: &str, address: &str, target: Option<&str>) -> String {
    let mut payload = format!(
        concat!(
            "NSD:\n",
            "  service_specific_managers:\n",
            "    - image: {}\n",
            "      id: {}\n",
            "NSR:\n",
            "  - virtual_deployment_units:\n",
            "      - vnfc_instance:\n",
            "          - connection_points:\n",
            "              - type:\n",
            "                  address: {}\n",
        ),
        image, id, address
    );
    if let Some(target) = target {
        payload.push_str(&format!("target: {}\n", target));
    }
    payload
}

pub fn kill_payload(name: &str) -> String {
    format!("name: {}\n", name)
}

pub fn yaml(reply: &str) -> serde_yaml::Value {
    serde_yaml::from_str(reply).expect("reply should be valid YAML")
}

// ============================================================================
// Full stack
// ============================================================================

/// A running registry on an in-process bus.
pub struct TestContext {
    pub bus: Arc<LocalBus>,
    pub engine: MockEngine,
    pub runtime: RegistryRuntime,
}

impl TestContext {
    pub async fn new(engine: MockEngine) -> Self {
        let bus = Arc::new(LocalBus::new(Duration::from_secs(60)));
        let runtime = RegistryRuntime::builder()
            .engine(Arc::new(engine.clone()))
            .transport(bus.clone())
            .waiter(waiter_config())
            .build()
            .expect("runtime should build")
            .start()
            .await
            .expect("runtime should start");

        Self {
            bus,
            engine,
            runtime,
        }
    }

    pub async fn request(&self, topic: &str, payload: String) -> serde_yaml::Value {
        let reply = self
            .bus
            .request(topic, payload)
            .await
            .expect("request should get a reply");
        yaml(&reply)
    }

    /// Register `name` over the bus after `delay`.
    pub fn register_later(&self, name: &str, delay: Duration) -> tokio::task::JoinHandle<()> {
        let bus = self.bus.clone();
        let payload = registration_payload(name);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.request(TOPIC_REGISTRATION, payload)
                .await
                .expect("registration should get a reply");
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.runtime.registry()
    }

    pub async fn shutdown(self) {
        self.runtime
            .shutdown()
            .await
            .expect("runtime should shut down cleanly");
    }
}
