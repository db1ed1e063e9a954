// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the Specific Manager Registry.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::DockerEngineConfig;
use crate::waiter::{DEFAULT_POLL_INTERVAL, DEFAULT_REGISTRATION_TIMEOUT, WaiterConfig};

/// Kill target used by update when the request names none.
pub const DEFAULT_KILL_TARGET: &str = "ssm1";

/// Default database name.
pub const DEFAULT_DB_NAME: &str = "son-mano-specific-manager-registry";

/// Default database host.
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";

/// Default database port.
pub const DEFAULT_DB_PORT: u16 = 27017;

/// Default request/reply timeout on the bus.
pub const DEFAULT_BUS_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Registration wait window and poll interval
    pub waiter: WaiterConfig,
    /// SSM killed by update when the request carries no target
    pub default_kill_target: String,
    /// Persistence settings
    pub database: DatabaseConfig,
    /// How long a bus request waits for its reply
    pub bus_reply_timeout: Duration,
    /// Docker engine settings
    pub docker: DockerEngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            waiter: WaiterConfig::default(),
            default_kill_target: DEFAULT_KILL_TARGET.to_string(),
            database: DatabaseConfig::default(),
            bus_reply_timeout: DEFAULT_BUS_REPLY_TIMEOUT,
            docker: DockerEngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout = env_millis(
            "SMR_REGISTRATION_TIMEOUT_MS",
            DEFAULT_REGISTRATION_TIMEOUT,
        )?;
        let poll_interval = env_millis("SMR_REGISTRATION_POLL_MS", DEFAULT_POLL_INTERVAL)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "SMR_REGISTRATION_POLL_MS",
                value: "0".to_string(),
            });
        }

        let default_kill_target = std::env::var("SMR_DEFAULT_KILL_TARGET")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KILL_TARGET.to_string());

        Ok(Self {
            waiter: WaiterConfig {
                timeout,
                poll_interval,
            },
            default_kill_target,
            database: DatabaseConfig::from_env()?,
            bus_reply_timeout: env_millis("SMR_BUS_REPLY_TIMEOUT_MS", DEFAULT_BUS_REPLY_TIMEOUT)?,
            docker: DockerEngineConfig::from_env(),
        })
    }
}

/// Which database the SSM audit trail is written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistenceBackend {
    /// No persistence; the registry is memory-only
    #[default]
    None,
    /// PostgreSQL via sqlx
    Postgres,
    /// SQLite via sqlx
    Sqlite,
}

impl FromStr for PersistenceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::InvalidValue {
                var: "SMR_PERSISTENCE",
                value: s.to_string(),
            }),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Backend to use
    pub backend: PersistenceBackend,
    /// Full connection URL; overrides host, port and name
    pub url: Option<String>,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database name
    pub name: String,
    /// Drop all stored records on startup
    pub clear_on_start: bool,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::None,
            url: None,
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            clear_on_start: true,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load persistence settings from environment variables.
    ///
    /// `mongo_host` and `mongo_port` are honoured for deployments that still
    /// set the legacy names.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match std::env::var("SMR_PERSISTENCE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.backend,
        };

        let url = std::env::var("SMR_DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let host = std::env::var("SMR_DB_HOST")
            .or_else(|_| std::env::var("mongo_host"))
            .unwrap_or(defaults.host);

        let port = match std::env::var("SMR_DB_PORT").or_else(|_| std::env::var("mongo_port")) {
            Ok(v) => v.trim().parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => defaults.port,
        };

        let name = std::env::var("SMR_DB_NAME").unwrap_or(defaults.name);

        let clear_on_start = match std::env::var("SMR_DB_CLEAR") {
            Ok(v) => parse_bool("SMR_DB_CLEAR", &v)?,
            Err(_) => defaults.clear_on_start,
        };

        Ok(Self {
            backend,
            url,
            host,
            port,
            name,
            clear_on_start,
            max_connections: defaults.max_connections,
        })
    }
}

fn env_millis(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue { var, value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A variable holds a value that cannot be used.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}
