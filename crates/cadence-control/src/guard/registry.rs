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

//! Extension registry with priority ordering.

use super::worker::ExtensionWorker;
use cadence_core::extension::{ExtensionHandle, ExtensionId};

/// A registered extension: its bookkeeping, priority, and worker.
pub(crate) struct ExtensionEntry {
    pub handle: ExtensionHandle,
    pub priority: f32,
    pub worker: ExtensionWorker,
}

/// Keeps entries sorted by priority, highest first. Entries with equal
/// priority keep their registration order.
#[derive(Default)]
pub(crate) struct ExtensionRegistry {
    entries: Vec<ExtensionEntry>,
}

impl ExtensionRegistry {
    pub fn register(&mut self, entry: ExtensionEntry) {
        log::info!(
            "ExtensionRegistry: Registered '{}' (priority={:.2}, budget={:.2} ms)",
            entry.handle.id,
            entry.priority,
            entry.handle.budget_ms
        );
        self.entries.push(entry);
        self.entries.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn contains(&self, id: &ExtensionId) -> bool {
        self.entries.iter().any(|e| &e.handle.id == id)
    }

    pub fn get(&self, id: &ExtensionId) -> Option<&ExtensionEntry> {
        self.entries.iter().find(|e| &e.handle.id == id)
    }

    pub fn get_mut(&mut self, id: &ExtensionId) -> Option<&mut ExtensionEntry> {
        self.entries.iter_mut().find(|e| &e.handle.id == id)
    }

    pub fn remove(&mut self, id: &ExtensionId) -> Option<ExtensionEntry> {
        let index = self.entries.iter().position(|e| &e.handle.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExtensionEntry> {
        self.entries.iter_mut()
    }

    pub fn drain(&mut self) -> Vec<ExtensionEntry> {
        std::mem::take(&mut self.entries)
    }
}
