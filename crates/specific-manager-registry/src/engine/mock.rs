// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock engine for testing.
//!
//! Records every call and simulates container state in memory, without
//! touching a real container runtime.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::*;

/// A call received by the mock engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `pull(image_uri, name)`
    Pull {
        /// Image URI.
        image: String,
        /// SSM name.
        name: String,
    },
    /// `start(image, name, host_ip)`
    Start {
        /// Image URI.
        image: String,
        /// SSM name.
        name: String,
        /// Host address, if given.
        host_ip: Option<String>,
    },
    /// `stop(name)`
    Stop {
        /// SSM name.
        name: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<EngineCall>,
    pulled: HashSet<String>,
    running: HashSet<String>,
}

/// Mock engine for testing.
#[derive(Debug, Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    /// Optional delay to simulate engine latency (in milliseconds)
    pub delay_ms: u64,
    /// If true, `pull` fails
    pub fail_pull: bool,
    /// If true, `start` fails
    pub fail_start: bool,
    /// If true, `stop` fails
    pub fail_stop: bool,
    /// Restrict scripted failures to this SSM name
    pub fail_only: Option<String>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a mock engine where every operation succeeds.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            delay_ms: 0,
            fail_pull: false,
            fail_start: false,
            fail_stop: false,
            fail_only: None,
        }
    }

    /// Restrict scripted failures to the SSM `name`.
    pub fn only_for(mut self, name: impl Into<String>) -> Self {
        self.fail_only = Some(name.into());
        self
    }

    /// Create a mock engine whose pulls fail.
    pub fn failing_pull() -> Self {
        Self {
            fail_pull: true,
            ..Self::new()
        }
    }

    /// Create a mock engine whose starts fail.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Create a mock engine whose stops fail.
    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::new()
        }
    }

    /// All calls received so far, in order.
    pub async fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().await.calls.clone()
    }

    /// Whether a container named `name` is currently running.
    pub async fn is_running(&self, name: &str) -> bool {
        self.state.lock().await.running.contains(name)
    }

    /// Whether an image was pulled for `name`.
    pub async fn is_pulled(&self, name: &str) -> bool {
        self.state.lock().await.pulled.contains(name)
    }

    fn should_fail(&self, flag: bool, name: &str) -> bool {
        flag && self.fail_only.as_deref().is_none_or(|only| only == name)
    }

    async fn simulate_latency(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    fn engine_type(&self) -> &'static str {
        "mock"
    }

    async fn pull(&self, image_uri: &str, name: &str) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock().await;
        state.calls.push(EngineCall::Pull {
            image: image_uri.to_string(),
            name: name.to_string(),
        });

        if self.should_fail(self.fail_pull, name) {
            return Err(EngineError::PullFailed(format!(
                "mock pull failure for {}",
                image_uri
            )));
        }

        state.pulled.insert(name.to_string());
        Ok(())
    }

    async fn start(&self, image: &str, name: &str, host_ip: Option<&str>) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock().await;
        state.calls.push(EngineCall::Start {
            image: image.to_string(),
            name: name.to_string(),
            host_ip: host_ip.map(str::to_string),
        });

        if self.should_fail(self.fail_start, name) {
            return Err(EngineError::StartFailed(format!(
                "mock start failure for {}",
                name
            )));
        }

        state.running.insert(name.to_string());
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock().await;
        state.calls.push(EngineCall::Stop {
            name: name.to_string(),
        });

        if self.should_fail(self.fail_stop, name) {
            return Err(EngineError::StopFailed(format!(
                "mock stop failure for {}",
                name
            )));
        }

        state.running.remove(name);
        Ok(())
    }
}
