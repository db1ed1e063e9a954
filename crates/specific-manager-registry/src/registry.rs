// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SSM Registry
//!
//! In-memory registry of service-specific managers keyed by name.
//! Names are unique for the lifetime of the process and statuses only move
//! forward through the lifecycle state machine.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{Error, Result};

/// SSM status as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsmStatus {
    /// Known but not yet confirmed running.
    Pending,
    /// Registered and running.
    Running,
    /// Failed; terminal until a fresh registration.
    Failed,
    /// Stopped on request; terminal until a fresh registration.
    Killed,
}

impl SsmStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, SsmStatus::Failed | SsmStatus::Killed)
    }

    /// Get the status string
    pub fn as_str(&self) -> &'static str {
        match self {
            SsmStatus::Pending => "pending",
            SsmStatus::Running => "running",
            SsmStatus::Failed => "failed",
            SsmStatus::Killed => "killed",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Re-applying the current status is always allowed and is a no-op.
    pub fn can_transition_to(&self, next: SsmStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (SsmStatus::Pending, SsmStatus::Running)
                | (SsmStatus::Pending, SsmStatus::Failed)
                | (SsmStatus::Running, SsmStatus::Killed)
                | (SsmStatus::Running, SsmStatus::Failed)
        )
    }
}

impl fmt::Display for SsmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SsmStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SsmStatus::Pending),
            "running" => Ok(SsmStatus::Running),
            "failed" => Ok(SsmStatus::Failed),
            "killed" => Ok(SsmStatus::Killed),
            other => Err(Error::InvalidRequest(format!("unknown SSM status '{}'", other))),
        }
    }
}

/// Self-reported details of an SSM announcing itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsmRegistration {
    /// Unique SSM name chosen by the SSM.
    pub name: String,
    /// SSM version.
    pub version: String,
    /// Free-text description.
    pub description: String,
}

/// Registry entry for one SSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsmRecord {
    /// Unique SSM name
    pub name: String,
    /// SSM version
    pub version: String,
    /// Free-text description
    pub description: String,
    /// Server-assigned identifier, fixed at registration
    pub identifier: Uuid,
    /// Current status
    pub status: SsmStatus,
    /// Diagnostic, only set while status is failed
    pub error: Option<String>,
    /// When the SSM registered
    pub registered_at: DateTime<Utc>,
}

/// Registry of known SSMs.
///
/// Constructed once per process and shared by reference. Mutation is
/// internally synchronized; callers that need a name to stay stable across
/// several calls serialize on that name themselves.
#[derive(Debug, Default)]
pub struct Registry {
    records: RwLock<HashMap<String, SsmRecord>>,
    changed: Notify,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new SSM.
    ///
    /// Assigns a fresh identifier and marks the SSM as running. Fails with
    /// [`Error::DuplicateRegistration`] if the name is taken; the existing
    /// record is left untouched.
    pub fn register(&self, registration: SsmRegistration) -> Result<SsmRecord> {
        let record = {
            let mut records = self.records.write();
            if records.contains_key(&registration.name) {
                return Err(Error::DuplicateRegistration(registration.name));
            }

            let record = SsmRecord {
                name: registration.name,
                version: registration.version,
                description: registration.description,
                identifier: Uuid::new_v4(),
                status: SsmStatus::Running,
                error: None,
                registered_at: Utc::now(),
            };
            records.insert(record.name.clone(), record.clone());
            record
        };

        self.changed.notify_waiters();

        tracing::info!(
            ssm_name = %record.name,
            identifier = %record.identifier,
            version = %record.version,
            "Registered SSM"
        );

        Ok(record)
    }

    /// Get a copy of the record for `name`
    pub fn get(&self, name: &str) -> Result<SsmRecord> {
        self.records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Update the status of an existing SSM.
    ///
    /// `error` is kept only when the new status is [`SsmStatus::Failed`].
    pub fn update_status(
        &self,
        name: &str,
        status: SsmStatus,
        error: Option<String>,
    ) -> Result<SsmRecord> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if !record.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                name: name.to_string(),
                from: record.status,
                to: status,
            });
        }

        let previous = record.status;
        record.status = status;
        record.error = if status == SsmStatus::Failed {
            error
        } else {
            None
        };

        tracing::debug!(
            ssm_name = %name,
            from = %previous,
            to = %status,
            "Updated SSM status"
        );

        Ok(record.clone())
    }

    /// Check whether an SSM with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.records.read().contains_key(name)
    }

    /// All records, sorted by name
    pub fn list(&self) -> Vec<SsmRecord> {
        let mut records: Vec<SsmRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Number of registered SSMs
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Resolves on the next successful registration.
    ///
    /// Only futures that exist (and are enabled or polled) at the time of
    /// the registration are woken.
    pub fn changed(&self) -> tokio::sync::futures::Notified<'_> {
        self.changed.notified()
    }
}
