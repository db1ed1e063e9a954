// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine module - container lifecycle backends.

pub mod docker;
pub mod mock;
mod traits;

pub use docker::{DockerEngine, DockerEngineConfig};
pub use mock::{EngineCall, MockEngine};
pub use traits::*;
