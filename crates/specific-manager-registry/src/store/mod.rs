// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for SSM request records.
//!
//! The registry itself lives in memory; repositories mirror each SSM request
//! as an audit trail. A repository failure is never allowed to change the
//! outcome of an orchestration step.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresRepository;
pub use self::sqlite::SqliteRepository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DatabaseConfig, PersistenceBackend};
use crate::error::Result;
use crate::messages::AuditInfo;
use crate::registry::{SsmRecord, SsmStatus};

/// Default manager type recorded when the SSM does not report one.
pub const DEFAULT_MANAGER_TYPE: &str = "ssm";

/// One SSM request as stored in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SsmRequestRecord {
    /// Opaque repository key, distinct from the SSM name
    pub repo_id: String,
    /// Identifier assigned by the registry
    pub identifier: String,
    /// Name of the managed service
    pub service_name: String,
    /// SSM version
    pub version: String,
    /// Description
    pub description: Option<String>,
    /// SSM name
    pub specific_manager_id: String,
    /// Manager type
    pub specific_manager_type: String,
    /// Service function UUID
    pub sfuuid: Option<String>,
    /// Managed function name
    pub function_name: Option<String>,
    /// Last known status
    pub status: Option<String>,
    /// Last error
    pub error: Option<String>,
    /// When the request was recorded
    pub created_at: DateTime<Utc>,
    /// When the row last changed
    pub updated_at: DateTime<Utc>,
}

impl SsmRequestRecord {
    /// Build the audit row for a fresh registration.
    pub fn from_registration(record: &SsmRecord, audit: &AuditInfo) -> Self {
        let now = Utc::now();
        Self {
            repo_id: uuid::Uuid::new_v4().to_string(),
            identifier: record.identifier.to_string(),
            service_name: audit
                .service_name
                .clone()
                .unwrap_or_else(|| record.name.clone()),
            version: record.version.clone(),
            description: Some(record.description.clone()),
            specific_manager_id: record.name.clone(),
            specific_manager_type: audit
                .specific_manager_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MANAGER_TYPE.to_string()),
            sfuuid: audit.sfuuid.clone(),
            function_name: audit.function_name.clone(),
            status: Some(record.status.as_str().to_string()),
            error: record.error.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for SSM request records.
#[async_trait]
pub trait SsmRepository: Send + Sync {
    /// Backend identifier (e.g., "postgres", "sqlite")
    fn backend(&self) -> &'static str;

    /// Insert a new request record.
    async fn save(&self, record: &SsmRequestRecord) -> Result<()>;

    /// Update status and error on the latest record for an SSM.
    ///
    /// Returns the number of rows changed (0 when the SSM has no record).
    async fn update_status(
        &self,
        specific_manager_id: &str,
        status: SsmStatus,
        error: Option<&str>,
    ) -> Result<u64>;

    /// Latest record for an SSM.
    async fn find_latest(&self, specific_manager_id: &str) -> Result<Option<SsmRequestRecord>>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<SsmRequestRecord>>;

    /// Delete every record. Returns the number of rows removed.
    async fn clear(&self) -> Result<u64>;

    /// Check that the backing database answers.
    async fn health_check(&self) -> Result<bool>;
}

/// Open the repository described by `config`, if persistence is enabled.
///
/// Runs migrations and, when `clear_on_start` is set, drops all old records.
pub async fn connect(config: &DatabaseConfig) -> Result<Option<Arc<dyn SsmRepository>>> {
    let repository: Arc<dyn SsmRepository> = match config.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::Postgres => Arc::new(PostgresRepository::connect(config).await?),
        PersistenceBackend::Sqlite => {
            let url = config.url.as_deref().unwrap_or("sqlite::memory:");
            Arc::new(SqliteRepository::connect(url).await?)
        }
    };

    info!(
        backend = repository.backend(),
        database = %config.name,
        "Connected to SSM repository"
    );

    if config.clear_on_start {
        let removed = repository.clear().await?;
        info!(removed, "Cleared SSM repository");
    }

    Ok(Some(repository))
}
