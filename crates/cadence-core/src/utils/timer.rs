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

//! A monotonic stopwatch.

use std::time::{Duration, Instant};

/// Measures elapsed time from a starting instant.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Creates a stopwatch running from now.
    #[inline]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Creates a stopwatch running from `started`.
    #[inline]
    pub fn started_at(started: Instant) -> Self {
        Self { started }
    }

    /// Time since the stopwatch started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in fractional milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }

    /// Elapsed time in fractional seconds.
    #[inline]
    pub fn elapsed_secs_f64(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Returns the elapsed time and restarts from now.
    #[inline]
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now.saturating_duration_since(self.started);
        self.started = now;
        lap
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
