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

use cadence_core::telemetry::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::fmt::Debug;

/// Trait defining the interface for metrics storage backends
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Store or replace a metric
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Retrieve a copy of a metric by ID
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Check if a metric exists
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Remove a metric
    fn remove_metric(&self, id: &MetricId) -> MetricsResult<()>;

    /// Get all metric IDs currently stored
    fn list_metric_ids(&self) -> Vec<MetricId>;

    /// Get all metrics (potentially expensive operation)
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Clear all metrics
    fn clear_all(&self) -> MetricsResult<()>;

    /// Get the number of metrics stored
    fn metric_count(&self) -> usize;

    /// Applies `update` to a stored value in place, under a single lock, and
    /// refreshes its timestamp on success.
    fn update_value(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    // Convenience methods for common operations

    /// Increment a counter by the given amount
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut result = 0;
        self.update_value(id, &mut |value| match value {
            MetricValue::Counter(count) => {
                *count = count.saturating_add(delta);
                result = *count;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })?;
        Ok(result)
    }

    /// Set a gauge value
    fn set_gauge(&self, id: &MetricId, gauge: f64) -> MetricsResult<()> {
        self.update_value(id, &mut |value| match value {
            MetricValue::Gauge(current) => {
                *current = gauge;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// Add a sample to a histogram
    fn record_histogram_sample(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update_value(id, &mut |value| match value {
            MetricValue::Histogram(histogram) => {
                histogram.observe(sample);
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        })
    }
}

/// Statistics about the metrics backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Total number of metrics stored
    pub total_metrics: usize,
    /// Number of counters
    pub counter_count: usize,
    /// Number of gauges
    pub gauge_count: usize,
    /// Number of histograms
    pub histogram_count: usize,
}
