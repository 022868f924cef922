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

//! The state shared between the tick loop and its observers.
//!
//! The tick loop is the only writer. The quality level is additionally
//! mirrored in an atomic so the hottest read never touches the lock.

use cadence_core::extension::ExtensionId;
use cadence_core::quality::QualityLevel;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, TryLockError};

/// A consistent view of the controller state after one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlSnapshot {
    /// The last completed tick.
    pub tick_id: u64,
    /// Quality level in effect for the next tick.
    pub quality: QualityLevel,
    /// Mean tick duration over the rolling window.
    pub avg_tick_ms: f32,
    /// 95th percentile tick duration over the rolling window.
    pub p95_tick_ms: f32,
    /// Overrunning ticks since the session started.
    pub overrun_count: u64,
    /// Extensions currently throttled.
    pub throttled_extensions: Vec<ExtensionId>,
}

/// A cloneable handle to the published snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCell {
    snapshot: Arc<RwLock<ControlSnapshot>>,
    quality: Arc<AtomicU8>,
}

impl SnapshotCell {
    /// Creates a cell holding `initial`.
    pub fn new(initial: ControlSnapshot) -> Self {
        Self {
            quality: Arc::new(AtomicU8::new(initial.quality.as_u8())),
            snapshot: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replaces the snapshot.
    ///
    /// Never blocks: if a reader currently holds the lock, the update is
    /// skipped and `false` is returned. The next tick publishes again.
    /// The quality mirror only moves together with the snapshot.
    pub fn publish(&self, snapshot: ControlSnapshot) -> bool {
        let mut guard = match self.snapshot.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        self.quality.store(snapshot.quality.as_u8(), Ordering::Release);
        *guard = snapshot;
        true
    }

    /// A copy of the latest snapshot.
    pub fn load(&self) -> ControlSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest quality level, without locking.
    pub fn quality(&self) -> QualityLevel {
        QualityLevel::from_u8(self.quality.load(Ordering::Acquire))
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(ControlSnapshot::default())
    }
}
