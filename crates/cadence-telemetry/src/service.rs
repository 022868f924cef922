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

//! The telemetry service: periodic reports and off-thread event delivery.

use crate::metrics::{MetricsRegistry, PipelineMetrics};
use cadence_core::config::TelemetryConfig;
use cadence_core::telemetry::{TelemetryEvent, TelemetryReport, TelemetrySink};
use cadence_core::{ExtensionId, QualityLevel, SessionId, StartupError};
use crossbeam_channel::{Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Owns the session metrics and forwards [`TelemetryEvent`]s to a sink
/// running on its own thread.
///
/// [`record`](Self::record) never blocks: when the sink falls behind and the
/// channel is full, the event is dropped and counted.
#[derive(Debug)]
pub struct TelemetryService {
    session_id: SessionId,
    report_interval: u64,
    registry: MetricsRegistry,
    metrics: PipelineMetrics,
    sender: Option<Sender<TelemetryEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl TelemetryService {
    /// Registers the session metrics and spawns the sink worker.
    pub fn start(
        session_id: SessionId,
        config: &TelemetryConfig,
        registry: MetricsRegistry,
        mut sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, StartupError> {
        let metrics = PipelineMetrics::register(&registry)?;
        let (sender, receiver) = crossbeam_channel::bounded::<TelemetryEvent>(config.channel_capacity.max(1));

        let name = "cadence-telemetry".to_string();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for event in receiver.iter() {
                    sink.record(&event);
                }
                log::debug!("Telemetry: sink worker finished");
            })
            .map_err(|source| StartupError::WorkerSpawn { name, source })?;

        Ok(Self {
            session_id,
            report_interval: config.report_interval_ticks,
            registry,
            metrics,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// The session this service reports for.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The registry backing the session metrics.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// The session metrics.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Queues an event for the sink. Returns `false` if it was dropped.
    pub fn record(&self, event: TelemetryEvent) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.telemetry_dropped();
                log::trace!("Telemetry: sink lagging, event dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Telemetry: sink worker gone, event dropped");
                false
            }
        }
    }

    /// Whether `tick_id` closes a reporting interval.
    pub fn report_due(&self, tick_id: u64) -> bool {
        self.report_interval > 0 && (tick_id + 1) % self.report_interval == 0
    }

    /// Builds the periodic aggregate from the controller's view of the
    /// session and the counters held here.
    pub fn build_report(
        &self,
        tick_id: u64,
        quality_level: QualityLevel,
        avg_tick_ms: f32,
        p95_tick_ms: f32,
        throttled_extensions: Vec<ExtensionId>,
    ) -> TelemetryReport {
        TelemetryReport {
            session_id: self.session_id,
            tick_id,
            quality_level,
            avg_tick_ms,
            p95_tick_ms,
            overrun_count: self.metrics.tick_overruns_total(),
            throttled_extensions,
            frames_dropped: self.metrics.frames_dropped_total(),
            samples_dropped: self.metrics.samples_dropped_total(),
            clock_skipped_ticks: self.metrics.clock_skipped_total(),
        }
    }

    /// Closes the channel and waits up to `grace` for the sink to drain.
    ///
    /// Returns `true` if the worker finished in time. A worker still busy
    /// after the grace period is detached.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        self.sender = None;
        let Some(worker) = self.worker.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("Telemetry: sink did not drain within {grace:?}, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if worker.join().is_err() {
            log::error!("Telemetry: sink worker panicked");
        }
        true
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::ChannelTelemetrySink;
    use std::sync::mpsc;

    fn config(capacity: usize) -> TelemetryConfig {
        TelemetryConfig {
            report_interval_ticks: 60,
            channel_capacity: capacity,
        }
    }

    #[test]
    fn test_events_reach_sink_in_order() {
        let (sink, events) = ChannelTelemetrySink::unbounded();
        let mut service =
            TelemetryService::start(SessionId::new(), &config(16), MetricsRegistry::new(), Box::new(sink))
                .unwrap();

        assert!(service.record(TelemetryEvent::FrameDropped { tick_id: 1 }));
        assert!(service.record(TelemetryEvent::FrameDropped { tick_id: 2 }));
        assert!(service.shutdown(Duration::from_secs(1)));

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                TelemetryEvent::FrameDropped { tick_id: 1 },
                TelemetryEvent::FrameDropped { tick_id: 2 },
            ]
        );
        assert!(!service.record(TelemetryEvent::FrameDropped { tick_id: 3 }));
    }

    struct GatedSink(mpsc::Receiver<()>);

    impl TelemetrySink for GatedSink {
        fn record(&mut self, _event: &TelemetryEvent) {
            let _ = self.0.recv();
        }
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let (gate, gated) = mpsc::channel();
        let mut service = TelemetryService::start(
            SessionId::new(),
            &config(1),
            MetricsRegistry::new(),
            Box::new(GatedSink(gated)),
        )
        .unwrap();

        let mut accepted = 0;
        for tick_id in 0..10 {
            if service.record(TelemetryEvent::FrameDropped { tick_id }) {
                accepted += 1;
            }
        }
        // At most one event in the sink and one in the channel.
        assert!(accepted <= 2);
        assert_eq!(service.metrics().telemetry_dropped_total(), 10 - accepted);

        drop(gate);
        assert!(service.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn test_report_due_every_interval() {
        let (sink, _events) = ChannelTelemetrySink::unbounded();
        let service =
            TelemetryService::start(SessionId::new(), &config(4), MetricsRegistry::new(), Box::new(sink))
                .unwrap();
        assert!(!service.report_due(0));
        assert!(service.report_due(59));
        assert!(!service.report_due(60));
        assert!(service.report_due(119));
    }

    #[test]
    fn test_report_carries_counters() {
        let (sink, _events) = ChannelTelemetrySink::unbounded();
        let session_id = SessionId::new();
        let service =
            TelemetryService::start(session_id, &config(4), MetricsRegistry::new(), Box::new(sink))
                .unwrap();
        service.metrics().frames_dropped(3);
        service.metrics().samples_dropped(2);
        service.metrics().clock_skipped(1);

        let report = service.build_report(59, QualityLevel::Medium, 4.0, 9.0, vec![ExtensionId::new("x")]);
        assert_eq!(report.session_id, session_id);
        assert_eq!(report.frames_dropped, 3);
        assert_eq!(report.samples_dropped, 2);
        assert_eq!(report.clock_skipped_ticks, 1);
        assert_eq!(report.overrun_count, 0);
        assert_eq!(report.throttled_extensions.len(), 1);
    }
}
