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

//! # Cadence Control
//!
//! The closed loop that keeps a session inside its deadline: rolling tick
//! statistics, the hysteresis-based adaptation controller, device forcing,
//! and the guard that runs extensions under measured budgets.

#![warn(missing_docs)]

pub mod adaptation;
pub mod analysis;
pub mod context;
pub mod guard;
pub mod metrics;
pub mod snapshot;

pub use adaptation::AdaptationController;
pub use analysis::TickHealth;
pub use context::DeviceContext;
pub use guard::{ExtensionBudgetGuard, GuardError, GuardReport, ShutdownSummary};
pub use metrics::TickStatistics;
pub use snapshot::{ControlSnapshot, SnapshotCell};
