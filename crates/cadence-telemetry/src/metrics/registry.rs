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

//! The session's metric registry and typed handles onto it.

use crate::storage::{backend::MetricsBackend, memory_backend::InMemoryBackend};
use cadence_core::telemetry::{Histogram, Metric, MetricId, MetricType, MetricsError, MetricsResult};
use std::sync::Arc;

/// Central registry for the metrics of a session.
///
/// Registration is idempotent: registering an id that already exists with
/// the same type returns a handle to the existing metric and keeps its
/// value. Handles are cheap to clone and can be moved to other threads.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// A registry over a fresh [`InMemoryBackend`].
    pub fn new() -> Self {
        Self::over(Arc::new(InMemoryBackend::new()))
    }

    /// A registry over an existing backend, shared with whoever else holds it.
    pub fn over(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Registers (or re-binds) a counter. Counters are unitless counts.
    pub fn register_counter(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> MetricsResult<CounterHandle> {
        self.register_labelled_counter(namespace, name, description, &[])
    }

    /// Registers a counter distinguished by `labels`.
    pub fn register_labelled_counter(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        labels: &[(&str, &str)],
    ) -> MetricsResult<CounterHandle> {
        let id = labels
            .iter()
            .fold(MetricId::new(namespace, name), |id, (k, v)| id.with_label(*k, *v));
        self.bind(Metric::counter(id, description, "count"))
            .map(CounterHandle)
    }

    /// Registers a gauge.
    pub fn register_gauge(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        unit: &str,
    ) -> MetricsResult<GaugeHandle> {
        self.bind(Metric::gauge(MetricId::new(namespace, name), description, unit))
            .map(GaugeHandle)
    }

    /// Registers a fixed-bucket histogram.
    pub fn register_histogram(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        unit: &str,
        bucket_bounds: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        let metric = Metric::histogram(MetricId::new(namespace, name), description, unit, bucket_bounds);
        self.bind(metric).map(HistogramHandle)
    }

    fn bind(&self, metric: Metric) -> MetricsResult<Binding> {
        let wanted = metric.metric_type();
        match self.backend.get_metric(&metric.id) {
            Ok(existing) if existing.metric_type() != wanted => {
                return Err(MetricsError::TypeMismatch {
                    expected: wanted,
                    found: existing.metric_type(),
                })
            }
            Ok(_) => {}
            Err(MetricsError::MetricNotFound(_)) => self.backend.put_metric(metric.clone())?,
            Err(e) => return Err(e),
        }
        Ok(Binding {
            id: metric.id,
            backend: Arc::clone(&self.backend),
        })
    }

    /// A copy of one metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend.get_metric(id)
    }

    /// `true` if `id` is registered.
    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.backend.contains_metric(id)
    }

    /// Every metric in `namespace`, sorted by id.
    pub fn namespace_metrics(&self, namespace: &str) -> Vec<Metric> {
        self.sorted(|m| m.id.namespace == namespace)
    }

    /// Every metric of one type, sorted by id.
    pub fn metrics_of_type(&self, metric_type: MetricType) -> Vec<Metric> {
        self.sorted(|m| m.metric_type() == metric_type)
    }

    fn sorted(&self, keep: impl Fn(&Metric) -> bool) -> Vec<Metric> {
        let mut selected: Vec<Metric> = self
            .backend
            .list_all_metrics()
            .into_iter()
            .filter(|m| keep(m))
            .collect();
        selected.sort_by(|a, b| a.id.cmp(&b.id));
        selected
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.backend.metric_count()
    }

    /// Removes every metric. Existing handles fail with `MetricNotFound`
    /// afterwards.
    pub fn clear_all(&self) -> MetricsResult<()> {
        self.backend.clear_all()
    }
}

/// A registered id plus the backend that stores it.
#[derive(Debug, Clone)]
struct Binding {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl Binding {
    fn read<T>(
        &self,
        expected: MetricType,
        extract: impl FnOnce(&Metric) -> Option<T>,
    ) -> MetricsResult<T> {
        let metric = self.backend.get_metric(&self.id)?;
        extract(&metric).ok_or(MetricsError::TypeMismatch {
            expected,
            found: metric.metric_type(),
        })
    }
}

/// A monotonically increasing count.
#[derive(Debug, Clone)]
pub struct CounterHandle(Binding);

impl CounterHandle {
    /// Adds one and returns the new total.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.increment_by(1)
    }

    /// Adds `amount` and returns the new total.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.0.backend.increment_counter(&self.0.id, amount)
    }

    /// Current total.
    pub fn get(&self) -> MetricsResult<u64> {
        self.0.read(MetricType::Counter, |m| m.value.as_counter())
    }

    /// The counter's id.
    pub fn id(&self) -> &MetricId {
        &self.0.id
    }
}

/// A value that moves both ways.
#[derive(Debug, Clone)]
pub struct GaugeHandle(Binding);

impl GaugeHandle {
    /// Overwrites the value.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.0.backend.set_gauge(&self.0.id, value)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<f64> {
        self.0.read(MetricType::Gauge, |m| match m.metric_type() {
            MetricType::Gauge => m.value.as_f64(),
            _ => None,
        })
    }

    /// The gauge's id.
    pub fn id(&self) -> &MetricId {
        &self.0.id
    }
}

/// A bucketed distribution.
#[derive(Debug, Clone)]
pub struct HistogramHandle(Binding);

impl HistogramHandle {
    /// Records one sample.
    pub fn observe(&self, sample: f64) -> MetricsResult<()> {
        self.0.backend.record_histogram_sample(&self.0.id, sample)
    }

    /// A copy of the distribution so far.
    pub fn snapshot(&self) -> MetricsResult<Histogram> {
        self.0
            .read(MetricType::Histogram, |m| m.value.as_histogram().cloned())
    }

    /// The histogram's id.
    pub fn id(&self) -> &MetricId {
        &self.0.id
    }
}
