// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed SSM repository.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{Error, Result};
use crate::migrations;
use crate::registry::SsmStatus;

use super::{SsmRepository, SsmRequestRecord};

/// SQLite-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a repository from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    ///
    /// In-memory databases are held on a single connection that is never
    /// recycled, otherwise every pooled connection would see its own empty
    /// database.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(url).await?;
        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Create the database file (and parent directories) if needed, then
    /// connect.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Other(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }
}

#[async_trait]
impl SsmRepository for SqliteRepository {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn save(&self, record: &SsmRequestRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ssm_requests (
                repo_id, identifier, service_name, version, description,
                specific_manager_id, specific_manager_type, sfuuid, function_name,
                status, error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.repo_id)
        .bind(&record.identifier)
        .bind(&record.service_name)
        .bind(&record.version)
        .bind(&record.description)
        .bind(&record.specific_manager_id)
        .bind(&record.specific_manager_type)
        .bind(&record.sfuuid)
        .bind(&record.function_name)
        .bind(&record.status)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(
        &self,
        specific_manager_id: &str,
        status: SsmStatus,
        error: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ssm_requests
            SET status = ?, error = ?, updated_at = ?
            WHERE repo_id = (
                SELECT repo_id FROM ssm_requests
                WHERE specific_manager_id = ?
                ORDER BY created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(specific_manager_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_latest(&self, specific_manager_id: &str) -> Result<Option<SsmRequestRecord>> {
        let record = sqlx::query_as::<_, SsmRequestRecord>(
            r#"
            SELECT * FROM ssm_requests
            WHERE specific_manager_id = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(specific_manager_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list(&self) -> Result<Vec<SsmRequestRecord>> {
        let records = sqlx::query_as::<_, SsmRequestRecord>(
            "SELECT * FROM ssm_requests ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ssm_requests")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
