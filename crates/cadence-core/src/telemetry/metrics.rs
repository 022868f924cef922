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

//! Abstract definitions for pipeline metrics.

use std::fmt::{self, Display};
use std::time::Instant;
use thiserror::Error;

/// A structured identifier for a metric: a namespace, a name, and optional
/// key-value labels kept sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    /// The broad category (e.g. `"tick"`, `"emitter"`).
    pub namespace: String,
    /// The metric name (e.g. `"overruns"`).
    pub name: String,
    /// Sorted key-value pairs for dimensional filtering.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates an unlabelled id.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a label, keeping labels sorted by key.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self.labels.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "[{labels}]")?;
        }
        Ok(())
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonically increasing count.
    Counter,
    /// A value that can go up or down.
    Gauge,
    /// A bucketed distribution.
    Histogram,
}

/// A fixed-bucket distribution. Individual samples are not retained, so
/// memory stays constant however long the session runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Inclusive upper bound of each bucket, ascending.
    pub bucket_bounds: Vec<f64>,
    /// Samples that fell at or below each bound (non-cumulative).
    pub bucket_counts: Vec<u64>,
    /// Samples above the last bound.
    pub overflow: u64,
    /// Total samples observed.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// Largest sample observed.
    pub max: f64,
}

impl Histogram {
    /// Creates an empty histogram. Bounds are sorted.
    pub fn new(mut bucket_bounds: Vec<f64>) -> Self {
        bucket_bounds.sort_by(|a, b| a.total_cmp(b));
        let bucket_counts = vec![0; bucket_bounds.len()];
        Self {
            bucket_bounds,
            bucket_counts,
            overflow: 0,
            count: 0,
            sum: 0.0,
            max: f64::MIN,
        }
    }

    /// Records one sample.
    pub fn observe(&mut self, sample: f64) {
        match self.bucket_bounds.iter().position(|&bound| sample <= bound) {
            Some(i) => self.bucket_counts[i] += 1,
            None => self.overflow += 1,
        }
        self.count += 1;
        self.sum += sample;
        self.max = self.max.max(sample);
    }

    /// Mean of all samples, or `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Counter value.
    Counter(u64),
    /// Gauge value.
    Gauge(f64),
    /// Histogram state.
    Histogram(Histogram),
}

impl MetricValue {
    /// Returns the [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram(_) => MetricType::Histogram,
        }
    }

    /// Returns counters and gauges as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Counter(v) => Some(*v as f64),
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Histogram(_) => None,
        }
    }

    /// Returns the counter value.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the histogram state.
    pub fn as_histogram(&self) -> Option<&Histogram> {
        match self {
            MetricValue::Histogram(h) => Some(h),
            _ => None,
        }
    }
}

/// A metric with its descriptive metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Identifier.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// Unit of measurement (e.g. `"ms"`, `"frames"`).
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
    /// Last time the value changed.
    pub last_updated: Instant,
}

impl Metric {
    /// A counter starting at zero.
    pub fn counter(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_value(id, description, unit, MetricValue::Counter(0))
    }

    /// A gauge starting at zero.
    pub fn gauge(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_value(id, description, unit, MetricValue::Gauge(0.0))
    }

    /// An empty histogram.
    pub fn histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        bucket_bounds: Vec<f64>,
    ) -> Self {
        Self::with_value(
            id,
            description,
            unit,
            MetricValue::Histogram(Histogram::new(bucket_bounds)),
        )
    }

    fn with_value(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            last_updated: Instant::now(),
        }
    }

    /// The metric type.
    pub fn metric_type(&self) -> MetricType {
        self.value.metric_type()
    }
}

/// A specialized `Result` type for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error that can occur within the metrics system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// The requested metric was never registered.
    #[error("metric not found: {0}")]
    MetricNotFound(MetricId),
    /// The operation does not apply to the metric's type.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// Type the operation needs.
        expected: MetricType,
        /// Type actually registered.
        found: MetricType,
    },
    /// The storage layer failed (e.g. a poisoned lock).
    #[error("storage error: {0}")]
    StorageError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_id_labels_sorted() {
        let id = MetricId::new("feed", "samples_dropped")
            .with_label("stream", "model-a")
            .with_label("reason", "out_of_order");
        assert_eq!(id.labels[0].0, "reason");
        assert_eq!(
            id.to_string(),
            "feed:samples_dropped[reason=out_of_order,stream=model-a]"
        );
    }

    #[test]
    fn test_histogram_buckets() {
        let mut h = Histogram::new(vec![16.67, 4.0, 8.0]);
        assert_eq!(h.bucket_bounds, vec![4.0, 8.0, 16.67]);
        h.observe(3.0);
        h.observe(8.0);
        h.observe(20.0);
        assert_eq!(h.bucket_counts, vec![1, 1, 0]);
        assert_eq!(h.overflow, 1);
        assert_eq!(h.count, 3);
        assert_eq!(h.max, 20.0);
        assert!((h.mean() - 31.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_value_accessors() {
        assert_eq!(MetricValue::Counter(3).as_f64(), Some(3.0));
        assert_eq!(MetricValue::Gauge(1.5).as_counter(), None);
        let metric = Metric::histogram(MetricId::new("tick", "ms"), "tick time", "ms", vec![1.0]);
        assert_eq!(metric.metric_type(), MetricType::Histogram);
        assert!(metric.value.as_histogram().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = MetricsError::TypeMismatch {
            expected: MetricType::Counter,
            found: MetricType::Gauge,
        };
        assert_eq!(err.to_string(), "type mismatch: expected Counter, found Gauge");
    }
}
