// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed SSM repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::migrations;
use crate::registry::SsmStatus;

use super::{SsmRepository, SsmRequestRecord};

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Create a repository from an existing pool.
    ///
    /// The caller is responsible for running migrations.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `config` and run migrations.
    ///
    /// `config.url` wins over the host/port/name triple when set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = match &config.url {
            Some(url) => url.parse::<PgConnectOptions>()?,
            None => PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .database(&config.name),
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SsmRepository for PostgresRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn save(&self, record: &SsmRequestRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ssm_requests (
                repo_id, identifier, service_name, version, description,
                specific_manager_id, specific_manager_type, sfuuid, function_name,
                status, error, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
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

        tracing::debug!(
            repo_id = %record.repo_id,
            ssm_name = %record.specific_manager_id,
            "Saved SSM request record"
        );

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
            SET status = $1, error = $2, updated_at = $3
            WHERE repo_id = (
                SELECT repo_id FROM ssm_requests
                WHERE specific_manager_id = $4
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
            WHERE specific_manager_id = $1
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
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
