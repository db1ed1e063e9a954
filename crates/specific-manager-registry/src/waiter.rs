// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded wait for SSM self-registration.
//!
//! A started SSM announces itself on a separate topic, so the flow that
//! started it has to wait until the registry reflects it. The wait polls the
//! registry on a fixed tick and is also woken early by registry change
//! notifications. Elapsed time is counted in whole ticks, so the worst-case
//! blocking time is the timeout plus at most one poll interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::Registry;

/// Default registration timeout (5 seconds).
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval (100 milliseconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Waiter timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterConfig {
    /// How long to wait for the SSM to appear
    pub timeout: Duration,
    /// Time between registry checks
    pub poll_interval: Duration,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REGISTRATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Blocks a flow until a named SSM is present in the registry or the
/// timeout elapses.
#[derive(Debug, Clone)]
pub struct RegistrationWaiter {
    registry: Arc<Registry>,
    config: WaiterConfig,
}

impl RegistrationWaiter {
    /// Create a waiter over `registry`.
    pub fn new(registry: Arc<Registry>, config: WaiterConfig) -> Self {
        Self { registry, config }
    }

    /// The configured timing.
    pub fn config(&self) -> WaiterConfig {
        self.config
    }

    /// Wait with the configured timeout and poll interval.
    ///
    /// Returns whether `name` is present when the wait ends. Never errors.
    pub async fn wait(&self, name: &str) -> bool {
        self.wait_with(name, self.config.timeout, self.config.poll_interval)
            .await
    }

    /// Wait with explicit timing.
    pub async fn wait_with(&self, name: &str, timeout: Duration, poll_interval: Duration) -> bool {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let max_ticks = tick_count(timeout, poll_interval);
        let start = Instant::now();
        let mut tick: u32 = 0;

        loop {
            let notified = self.registry.changed();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.registry.contains(name) {
                debug!(
                    ssm_name = %name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "SSM registration observed"
                );
                return true;
            }

            if tick >= max_ticks {
                debug!(
                    ssm_name = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Gave up waiting for SSM registration"
                );
                return false;
            }

            let next_tick = start + poll_interval * (tick + 1);
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => tick += 1,
                _ = &mut notified => {}
            }
        }
    }

    /// Like [`wait`](Self::wait), but reports a miss as
    /// [`Error::RegistrationTimeout`].
    pub async fn expect_registration(&self, name: &str) -> Result<()> {
        if self.wait(name).await {
            Ok(())
        } else {
            Err(Error::RegistrationTimeout(name.to_string()))
        }
    }
}

/// Number of whole poll intervals needed to cover `timeout`.
fn tick_count(timeout: Duration, poll_interval: Duration) -> u32 {
    let ticks = timeout.as_nanos().div_ceil(poll_interval.as_nanos());
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
