// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SSM lifecycle orchestration.
//!
//! Drives the pull → start → await registration → confirm sequence for each
//! request and folds the outcome of every phase into a single verdict.
//! Nothing here returns an error to the caller: failures are logged and
//! reported through the structured response of the topic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use crate::messages::{
    InstantiateResponse, OnBoardResponse, RegisteredSsm, RegistrationCommand,
    RegistrationResponse, SsmImage, StatusResponse, UpdatePlan, UpdateResponse, Verdict,
};
use crate::registry::{Registry, SsmStatus};
use crate::store::{SsmRepository, SsmRequestRecord};
use crate::waiter::{RegistrationWaiter, WaiterConfig};

// ============================================================================
// Deployment phases
// ============================================================================

/// Where a single deployment attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPhase {
    /// Request accepted
    Requested,
    /// Image pulled
    Pulled,
    /// Container started
    Started,
    /// Waiting for the SSM to register
    AwaitingRegistration,
    /// The SSM registered
    Registered,
    /// Confirmed running
    Running,
    /// Stopped on request
    Killed,
    /// Some phase failed
    Failed,
}

impl DeploymentPhase {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Requested => "requested",
            DeploymentPhase::Pulled => "pulled",
            DeploymentPhase::Started => "started",
            DeploymentPhase::AwaitingRegistration => "awaiting_registration",
            DeploymentPhase::Registered => "registered",
            DeploymentPhase::Running => "running",
            DeploymentPhase::Killed => "killed",
            DeploymentPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(name: &str, phase: DeploymentPhase) {
    info!(ssm_name = %name, phase = %phase, "SSM deployment phase");
}

// ============================================================================
// Per-name locks
// ============================================================================

/// One async lock per SSM name.
///
/// Entries are never removed; the set of names is bounded by the SSMs the
/// platform deploys.
#[derive(Debug, Default)]
struct NameLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    fn handle(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        self.handle(name).lock_owned().await
    }

    /// Lock two names in a fixed order so concurrent callers cannot deadlock.
    async fn lock_pair(&self, a: &str, b: &str) -> Vec<OwnedMutexGuard<()>> {
        if a == b {
            return vec![self.lock(a).await];
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        vec![first, second]
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates the registry, the container engine and the registration
/// waiter for every SSM lifecycle request.
pub struct Orchestrator {
    registry: Arc<Registry>,
    engine: Arc<dyn ContainerEngine>,
    waiter: RegistrationWaiter,
    repository: Option<Arc<dyn SsmRepository>>,
    default_kill_target: String,
    locks: NameLocks,
}

impl Orchestrator {
    /// Create an orchestrator without persistence.
    pub fn new(
        registry: Arc<Registry>,
        engine: Arc<dyn ContainerEngine>,
        waiter_config: WaiterConfig,
    ) -> Self {
        Self {
            waiter: RegistrationWaiter::new(registry.clone(), waiter_config),
            registry,
            engine,
            repository: None,
            default_kill_target: crate::config::DEFAULT_KILL_TARGET.to_string(),
            locks: NameLocks::default(),
        }
    }

    /// Mirror registrations and status changes to `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn SsmRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// SSM killed by update when the plan names no target.
    pub fn with_default_kill_target(mut self, target: impl Into<String>) -> Self {
        self.default_kill_target = target.into();
        self
    }

    /// The registry this orchestrator maintains.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The configured fallback kill target.
    pub fn default_kill_target(&self) -> &str {
        &self.default_kill_target
    }

    // ------------------------------------------------------------------------
    // On-board
    // ------------------------------------------------------------------------

    /// Pull the SSM image. The registry is not touched.
    pub async fn on_board(&self, ssm: &SsmImage) -> OnBoardResponse {
        enter(&ssm.name, DeploymentPhase::Requested);
        let verdict = Verdict::from_success(self.pull(ssm).await.is_ok());
        info!(ssm_name = %ssm.name, on_board = ?verdict, "On-board finished");
        OnBoardResponse { on_board: verdict }
    }

    async fn pull(&self, ssm: &SsmImage) -> Result<()> {
        match self.engine.pull(&ssm.image, &ssm.name).await {
            Ok(()) => {
                enter(&ssm.name, DeploymentPhase::Pulled);
                Ok(())
            }
            Err(e) => {
                let err = Error::PullFailure {
                    name: ssm.name.clone(),
                    reason: e.to_string(),
                };
                error!(ssm_name = %ssm.name, image = %ssm.image, error = %err, "Pull failed");
                enter(&ssm.name, DeploymentPhase::Failed);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Instantiate
    // ------------------------------------------------------------------------

    /// Start the SSM and wait for it to register.
    pub async fn instantiate(&self, ssm: &SsmImage) -> InstantiateResponse {
        let _guard = self.locks.lock(&ssm.name).await;
        enter(&ssm.name, DeploymentPhase::Requested);

        let verdict = Verdict::from_success(self.start_and_await(ssm, None).await.is_ok());
        info!(ssm_name = %ssm.name, instantiation = ?verdict, "Instantiation finished");
        InstantiateResponse {
            instantiation: verdict,
        }
    }

    /// Caller must hold the lock for `ssm.name`.
    async fn start_and_await(&self, ssm: &SsmImage, host_ip: Option<&str>) -> Result<()> {
        if let Err(e) = self.engine.start(&ssm.image, &ssm.name, host_ip).await {
            let err = Error::StartFailure {
                name: ssm.name.clone(),
                reason: e.to_string(),
            };
            error!(ssm_name = %ssm.name, image = %ssm.image, error = %err, "Start failed");
            enter(&ssm.name, DeploymentPhase::Failed);
            return Err(err);
        }
        enter(&ssm.name, DeploymentPhase::Started);

        enter(&ssm.name, DeploymentPhase::AwaitingRegistration);
        if let Err(err) = self.waiter.expect_registration(&ssm.name).await {
            warn!(
                ssm_name = %ssm.name,
                timeout_ms = self.waiter.config().timeout.as_millis() as u64,
                error = %err,
                "SSM did not register"
            );
            enter(&ssm.name, DeploymentPhase::Failed);
            return Err(err);
        }

        enter(&ssm.name, DeploymentPhase::Registered);
        enter(&ssm.name, DeploymentPhase::Running);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Record a self-registering SSM.
    ///
    /// Identifier and status are assigned here. Any failure, including a
    /// duplicate name, is reported as `status: failed`.
    pub async fn register(&self, command: RegistrationCommand) -> RegistrationResponse {
        let RegistrationCommand {
            registration,
            audit,
        } = command;
        let name = registration.name.clone();

        let record = match self.registry.register(registration) {
            Ok(record) => record,
            Err(Error::DuplicateRegistration(_)) => {
                warn!(ssm_name = %name, "Rejected duplicate SSM registration");
                return RegistrationResponse::failed();
            }
            Err(e) => {
                error!(ssm_name = %name, error = %e, "SSM registration failed");
                return RegistrationResponse::failed();
            }
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&self.registry.list()) {
                Ok(dump) => debug!(registry = %dump, "Registry contents"),
                Err(e) => debug!(error = %e, "Failed to dump registry"),
            }
        }

        if let Some(repository) = &self.repository {
            let row = SsmRequestRecord::from_registration(&record, &audit);
            if let Err(e) = repository.save(&row).await {
                warn!(
                    ssm_name = %name,
                    backend = repository.backend(),
                    error = %e,
                    "Failed to persist SSM registration"
                );
            }
        }

        RegistrationResponse::Registered(RegisteredSsm::from(record))
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Replace an SSM: pull and start the new one on the plan's host, wait
    /// for it to register, then kill the target.
    ///
    /// Every phase runs even when an earlier one failed.
    pub async fn update(&self, plan: &UpdatePlan) -> UpdateResponse {
        let target = plan
            .target
            .as_deref()
            .unwrap_or(&self.default_kill_target)
            .to_string();
        let _guards = self.locks.lock_pair(&plan.ssm.name, &target).await;

        info!(
            ssm_name = %plan.ssm.name,
            target = %target,
            host_ip = %plan.host_address,
            "Updating SSM"
        );
        enter(&plan.ssm.name, DeploymentPhase::Requested);

        let on_board = Verdict::from_success(self.pull(&plan.ssm).await.is_ok());
        let instantiation = Verdict::from_success(
            self.start_and_await(&plan.ssm, Some(&plan.host_address))
                .await
                .is_ok(),
        );
        let status = self.kill_locked(&target).await.status;

        let succeeded = on_board.is_ok() && instantiation.is_ok() && status == SsmStatus::Killed;
        let verdict = Verdict::from_success(succeeded);

        info!(
            ssm_name = %plan.ssm.name,
            target = %target,
            on_board = ?on_board,
            instantiation = ?instantiation,
            target_status = %status,
            update = ?verdict,
            "Update finished"
        );

        UpdateResponse { update: verdict }
    }

    // ------------------------------------------------------------------------
    // Kill
    // ------------------------------------------------------------------------

    /// Stop an SSM and report its resulting status.
    ///
    /// Unknown SSMs report `failed`; already killed SSMs report `killed`.
    /// Neither reaches the engine.
    pub async fn kill(&self, name: &str) -> StatusResponse {
        let _guard = self.locks.lock(name).await;
        self.kill_locked(name).await
    }

    /// Caller must hold the lock for `name`.
    async fn kill_locked(&self, name: &str) -> StatusResponse {
        let record = match self.registry.get(name) {
            Ok(record) => record,
            Err(e) => {
                warn!(ssm_name = %name, error = %e, "Kill requested for unknown SSM");
                return StatusResponse {
                    status: SsmStatus::Failed,
                };
            }
        };

        if record.status == SsmStatus::Killed {
            debug!(ssm_name = %name, "SSM already killed");
            return StatusResponse {
                status: SsmStatus::Killed,
            };
        }

        if let Err(e) = self.engine.stop(name).await {
            let err = Error::StopFailure {
                name: name.to_string(),
                reason: e.to_string(),
            };
            error!(ssm_name = %name, error = %err, "Stop failed");
            return StatusResponse {
                status: record.status,
            };
        }

        match self.registry.update_status(name, SsmStatus::Killed, None) {
            Ok(updated) => {
                enter(name, DeploymentPhase::Killed);
                self.mirror_status(name, updated.status, None).await;
                StatusResponse {
                    status: updated.status,
                }
            }
            Err(e) => {
                warn!(ssm_name = %name, error = %e, "Container stopped but status kept");
                StatusResponse {
                    status: record.status,
                }
            }
        }
    }

    async fn mirror_status(&self, name: &str, status: SsmStatus, error: Option<&str>) {
        let Some(repository) = &self.repository else {
            return;
        };
        match repository.update_status(name, status, error).await {
            Ok(0) => debug!(ssm_name = %name, "No persisted record to update"),
            Ok(_) => {}
            Err(e) => warn!(
                ssm_name = %name,
                backend = repository.backend(),
                error = %e,
                "Failed to persist SSM status"
            ),
        }
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    /// Log a result reported by an SSM.
    pub fn registration_result(&self, result: &str) {
        info!(result = %result, "SSM result received");
    }
}
