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

//! A bounded rolling window of samples.

use std::collections::VecDeque;

/// A circular buffer with a capacity chosen at runtime.
///
/// Pushing into a full buffer evicts the oldest value. Iteration is always
/// chronological (oldest to newest).
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a value, returning the evicted one if the buffer was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.data.len() == self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(value);
        evicted
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if no value has been pushed since creation or the last clear.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of values held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` once the buffer holds `capacity` values.
    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// The most recent value.
    pub fn last(&self) -> Option<&T> {
        self.data.back()
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.data.iter()
    }

    /// The newest `n` values, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.data.iter().skip(self.data.len().saturating_sub(n))
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl RingBuffer<f32> {
    /// Arithmetic mean, or `0.0` when empty.
    pub fn average(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Population variance, or `0.0` with fewer than two values.
    pub fn variance(&self) -> f32 {
        if self.data.len() < 2 {
            return 0.0;
        }
        let avg = self.average();
        let sum_sq: f32 = self.data.iter().map(|v| (v - avg) * (v - avg)).sum();
        sum_sq / self.data.len() as f32
    }

    /// Difference between the mean of the newer half and the older half.
    ///
    /// Positive when values are increasing.
    pub fn trend(&self) -> f32 {
        let count = self.data.len();
        if count < 2 {
            return 0.0;
        }
        let half = count / 2;
        let older: f32 = self.data.iter().take(half).sum::<f32>() / half as f32;
        let newer: f32 = self.data.iter().skip(count - half).sum::<f32>() / half as f32;
        newer - older
    }

    /// Largest value, or `0.0` when empty.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().reduce(f32::max).unwrap_or(0.0)
    }

    /// Nearest-rank percentile for `p` in `[0, 1]`, or `0.0` when empty.
    pub fn percentile(&self, p: f32) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f32> = self.data.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = (p.clamp(0.0, 1.0) * sorted.len() as f32).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut rb = RingBuffer::new(3);
        assert_eq!(rb.push(1.0), None);
        rb.push(2.0);
        rb.push(3.0);
        assert_eq!(rb.push(4.0), Some(1.0));

        let values: Vec<f32> = rb.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(rb.len(), 3);
        assert!(rb.is_full());
        assert_eq!(rb.last(), Some(&4.0));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut rb = RingBuffer::new(0);
        rb.push(1u32);
        rb.push(2u32);
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_tail() {
        let mut rb = RingBuffer::new(5);
        for v in 1..=5 {
            rb.push(v);
        }
        assert_eq!(rb.tail(2).copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(rb.tail(10).count(), 5);
    }

    #[test]
    fn test_average_and_variance() {
        let mut rb = RingBuffer::new(4);
        for v in [5.0, 15.0, 5.0, 15.0] {
            rb.push(v);
        }
        assert_eq!(rb.average(), 10.0);
        assert!((rb.variance() - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_trend() {
        let mut rb = RingBuffer::new(4);
        for v in [1.0, 1.1, 2.0, 2.1] {
            rb.push(v);
        }
        assert!((rb.trend() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let mut rb = RingBuffer::new(20);
        for v in 1..=20 {
            rb.push(v as f32);
        }
        assert_eq!(rb.percentile(0.95), 19.0);
        assert_eq!(rb.percentile(1.0), 20.0);
        assert_eq!(rb.percentile(0.0), 1.0);
        assert_eq!(rb.max(), 20.0);
    }

    #[test]
    fn test_empty_statistics() {
        let rb: RingBuffer<f32> = RingBuffer::new(4);
        assert_eq!(rb.average(), 0.0);
        assert_eq!(rb.variance(), 0.0);
        assert_eq!(rb.trend(), 0.0);
        assert_eq!(rb.percentile(0.95), 0.0);
        assert!(rb.is_empty());
    }
}
