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

//! Provides RAII-based timers for automatically recording metrics.

use crate::metrics::registry::HistogramHandle;
use cadence_core::utils::Stopwatch;

/// Times a scope and records the result in a histogram when dropped.
///
/// The measurement is recorded on every exit path, early returns included.
pub struct ScopedMetricTimer<'a> {
    stopwatch: Stopwatch,
    histogram: &'a HistogramHandle,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Creates a new timer for the given histogram and starts it immediately.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            stopwatch: Stopwatch::new(),
            histogram,
        }
    }
}

/// When the timer goes out of scope, it records the elapsed time in milliseconds.
impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.stopwatch.elapsed_secs_f64() * 1000.0;
        if let Err(e) = self.histogram.observe(elapsed_ms) {
            log::warn!("Telemetry: failed to record scoped timing: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use std::time::Duration;

    #[test]
    fn test_records_on_drop() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram("stage", "ms", "", "ms", vec![1.0, 1000.0])
            .unwrap();
        {
            let _timer = ScopedMetricTimer::new(&histogram);
            std::thread::sleep(Duration::from_millis(2));
        }
        let snapshot = histogram.snapshot().unwrap();
        assert_eq!(snapshot.count, 1);
        assert!(snapshot.sum >= 2.0);
    }
}
