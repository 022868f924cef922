// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors that can stop a session from starting.
//!
//! Once a session is running, anomalies are absorbed and surfaced as data
//! (counters, quality transitions, telemetry events); these are the only hard
//! failures.

use crate::config::ConfigError;
use crate::extension::ExtensionId;
use crate::telemetry::MetricsError;
use thiserror::Error;

/// A fatal error raised while starting a session.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The host time source is missing or inconsistent.
    #[error("host clock unavailable: {0}")]
    ClockUnavailable(String),
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker '{name}': {source}")]
    WorkerSpawn {
        /// Name of the worker thread.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// An extension supplied at build time was rejected.
    #[error("extension '{id}' rejected: {reason}")]
    ExtensionRejected {
        /// The rejected extension.
        id: ExtensionId,
        /// Why it was rejected.
        reason: String,
    },
    /// The session metrics could not be registered.
    #[error("metrics registration failed: {0}")]
    Metrics(#[from] MetricsError),
}
