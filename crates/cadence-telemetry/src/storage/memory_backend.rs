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

use crate::storage::backend::{BackendStats, MetricsBackend};
use cadence_core::telemetry::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

/// In-memory metrics backend using `RwLock<HashMap>`.
///
/// Readers share the lock; every update takes it exclusively for the length
/// of a single value change.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory backend with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    fn write(&self) -> MetricsResult<RwLockWriteGuard<'_, HashMap<MetricId, Metric>>> {
        self.storage
            .write()
            .map_err(|_| MetricsError::StorageError("Failed to acquire write lock".to_string()))
    }

    fn read_with<R>(&self, f: impl FnOnce(&HashMap<MetricId, Metric>) -> R) -> R {
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        f(&storage)
    }

    /// Get statistics about this backend
    pub fn stats(&self) -> BackendStats {
        self.read_with(|storage| {
            let mut stats = BackendStats {
                total_metrics: storage.len(),
                ..BackendStats::default()
            };
            for metric in storage.values() {
                match metric.metric_type() {
                    MetricType::Counter => stats.counter_count += 1,
                    MetricType::Gauge => stats.gauge_count += 1,
                    MetricType::Histogram => stats.histogram_count += 1,
                }
            }
            stats
        })
    }

    /// Get metrics by namespace
    pub fn metrics_by_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.read_with(|storage| {
            storage
                .values()
                .filter(|metric| metric.id.namespace == namespace)
                .cloned()
                .collect()
        })
    }

    /// Get metrics by type
    pub fn metrics_by_type(&self, metric_type: MetricType) -> Vec<Metric> {
        self.read_with(|storage| {
            storage
                .values()
                .filter(|metric| metric.metric_type() == metric_type)
                .cloned()
                .collect()
        })
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        self.write()?.insert(metric.id.clone(), metric);
        Ok(())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.read_with(|storage| storage.get(id).cloned())
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.read_with(|storage| storage.contains_key(id))
    }

    fn remove_metric(&self, id: &MetricId) -> MetricsResult<()> {
        self.write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn list_metric_ids(&self) -> Vec<MetricId> {
        self.read_with(|storage| storage.keys().cloned().collect())
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.read_with(|storage| storage.values().cloned().collect())
    }

    fn clear_all(&self) -> MetricsResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn metric_count(&self) -> usize {
        self.read_with(|storage| storage.len())
    }

    fn update_value(
        &self,
        id: &MetricId,
        update: &mut dyn FnMut(&mut MetricValue) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self.write()?;
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
        update(&mut metric.value)?;
        metric.last_updated = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(name: &str) -> Metric {
        Metric::counter(MetricId::new("test", name), "a counter", "count")
    }

    #[test]
    fn test_put_get_remove() {
        let backend = InMemoryBackend::new();
        let metric = counter("c");
        let id = metric.id.clone();

        backend.put_metric(metric).unwrap();
        assert!(backend.contains_metric(&id));
        assert_eq!(backend.get_metric(&id).unwrap().value, MetricValue::Counter(0));

        backend.remove_metric(&id).unwrap();
        assert!(matches!(
            backend.get_metric(&id),
            Err(MetricsError::MetricNotFound(_))
        ));
        assert!(backend.remove_metric(&id).is_err());
    }

    #[test]
    fn test_increment_counter() {
        let backend = InMemoryBackend::new();
        let metric = counter("c");
        let id = metric.id.clone();
        backend.put_metric(metric).unwrap();

        assert_eq!(backend.increment_counter(&id, 2).unwrap(), 2);
        assert_eq!(backend.increment_counter(&id, 3).unwrap(), 5);
    }

    #[test]
    fn test_type_mismatch() {
        let backend = InMemoryBackend::new();
        let metric = counter("c");
        let id = metric.id.clone();
        backend.put_metric(metric).unwrap();

        assert_eq!(
            backend.set_gauge(&id, 1.0),
            Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: MetricType::Counter,
            })
        );
        assert_eq!(backend.get_metric(&id).unwrap().value, MetricValue::Counter(0));
    }

    #[test]
    fn test_histogram_samples() {
        let backend = InMemoryBackend::new();
        let id = MetricId::new("tick", "ms");
        backend
            .put_metric(Metric::histogram(id.clone(), "tick time", "ms", vec![8.0, 16.0]))
            .unwrap();
        backend.record_histogram_sample(&id, 4.0).unwrap();
        backend.record_histogram_sample(&id, 20.0).unwrap();

        let metric = backend.get_metric(&id).unwrap();
        let histogram = metric.value.as_histogram().unwrap();
        assert_eq!(histogram.count, 2);
        assert_eq!(histogram.bucket_counts, vec![1, 0]);
        assert_eq!(histogram.overflow, 1);
    }

    #[test]
    fn test_stats_and_filters() {
        let backend = InMemoryBackend::with_capacity(4);
        backend.put_metric(counter("a")).unwrap();
        backend.put_metric(counter("b")).unwrap();
        backend
            .put_metric(Metric::gauge(MetricId::new("other", "g"), "a gauge", "unit"))
            .unwrap();

        let stats = backend.stats();
        assert_eq!(stats.total_metrics, 3);
        assert_eq!(stats.counter_count, 2);
        assert_eq!(stats.gauge_count, 1);
        assert_eq!(backend.metrics_by_namespace("test").len(), 2);
        assert_eq!(backend.metrics_by_type(MetricType::Gauge).len(), 1);

        backend.clear_all().unwrap();
        assert_eq!(backend.metric_count(), 0);
    }
}
