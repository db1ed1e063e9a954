// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container engine trait definitions.
//!
//! Defines the abstract interface the orchestrator uses to fetch, start and
//! stop SSM containers.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Image could not be pulled.
    #[error("Pull failed: {0}")]
    PullFailed(String),

    /// Container failed to start.
    #[error("Container start failed: {0}")]
    StartFailed(String),

    /// Container could not be stopped.
    #[error("Container stop failed: {0}")]
    StopFailed(String),

    /// Engine command exited with a non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code from the process.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Trait for container engines.
///
/// Engines are pure execution backends: they never touch the registry.
/// Every call blocks the calling flow until the engine has answered.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine type identifier (e.g., "docker", "mock")
    fn engine_type(&self) -> &'static str;

    /// Fetch the image for SSM `name`.
    async fn pull(&self, image_uri: &str, name: &str) -> Result<()>;

    /// Start a container named `name` from `image`.
    ///
    /// `host_ip` is the address of the deployment unit the SSM manages,
    /// when known.
    async fn start(&self, image: &str, name: &str, host_ip: Option<&str>) -> Result<()>;

    /// Stop and remove the container named `name`.
    async fn stop(&self, name: &str) -> Result<()>;
}
