// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the Specific Manager Registry.

use thiserror::Error;

use crate::registry::SsmStatus;

/// Registry errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// YAML serialization/deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Container engine operation failed.
    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    /// Transport operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// An SSM with this name is already registered.
    #[error("SSM already registered: {0}")]
    DuplicateRegistration(String),

    /// No SSM with this name is known.
    #[error("SSM not found: {0}")]
    NotFound(String),

    /// The SSM did not register within the wait window.
    #[error("SSM did not register in time: {0}")]
    RegistrationTimeout(String),

    /// Pulling the SSM image failed.
    #[error("Pull failed for {name}: {reason}")]
    PullFailure {
        /// SSM name.
        name: String,
        /// Failure reason reported by the engine.
        reason: String,
    },

    /// Starting the SSM container failed.
    #[error("Start failed for {name}: {reason}")]
    StartFailure {
        /// SSM name.
        name: String,
        /// Failure reason reported by the engine.
        reason: String,
    },

    /// Stopping the SSM container failed.
    #[error("Stop failed for {name}: {reason}")]
    StopFailure {
        /// SSM name.
        name: String,
        /// Failure reason reported by the engine.
        reason: String,
    },

    /// The requested status change is not allowed.
    #[error("Invalid status transition for {name}: {from} -> {to}")]
    InvalidTransition {
        /// SSM name.
        name: String,
        /// Current status.
        from: SsmStatus,
        /// Requested status.
        to: SsmStatus,
    },

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using the registry Error.
pub type Result<T> = std::result::Result<T, Error>;
