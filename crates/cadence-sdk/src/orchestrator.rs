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

//! The per-tick pipeline.
//!
//! [`SessionState`] owns everything a session mutates from one tick to the
//! next. [`CycleOrchestrator`] owns the inputs (clock, commands, device
//! readings) and runs one tick over that state at a time:
//!
//! 1. start the tick budget and apply pending commands,
//! 2. drain every stream feed without blocking,
//! 3. compute per-stream energy,
//! 4. fuse the streams (interference gated by quality),
//! 5. run extensions with whatever budget remains,
//! 6. feed the finalized timing to the adaptation controller,
//! 7. hand the frame to the emitter queue without blocking,
//! 8. account the tick and publish the snapshot.

use crate::command::Command;
use crate::emitter::{EmitterWorker, FrameQueue};
use crate::feed::FeedReceiver;
use cadence_control::{
    AdaptationController, ControlSnapshot, ExtensionBudgetGuard, GuardReport, SnapshotCell,
};
use cadence_core::budget::duration_ms;
use cadence_core::{
    Clock, DeviceTelemetry, EnergySample, ExtensionId, FrameEvent, FusedEnergyFrame, QualityLevel,
    QualityTransition, SessionConfig, SessionId, StreamConfig, StreamId, TelemetryEvent,
    TickBudget, TickTiming, TickView,
};
use cadence_infra::DevicePoller;
use cadence_lanes::{StreamCoordinator, TokenEnergyCalculator};
use cadence_telemetry::{MetricsRegistry, PipelineMetrics, ScopedMetricTimer, TelemetryService};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// The tick.
    pub tick_id: u64,
    /// Its finalized timing, as seen by the adaptation controller.
    pub timing: TickTiming,
    /// Quality level in effect during the tick.
    pub quality: QualityLevel,
    /// The transition this tick caused, effective from the next tick.
    pub transition: Option<QualityTransition>,
    /// Frames evicted from the emitter queue to make room for this one.
    pub dropped_frames: Vec<u64>,
    /// What happened to the extensions.
    pub extensions: GuardReport,
}

/// The final accounting of a stopped session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// The session.
    pub session_id: SessionId,
    /// Ticks run, the terminal tick included.
    pub ticks: u64,
    /// Quality level at shutdown.
    pub final_quality: QualityLevel,
    /// Frames delivered to the event sink.
    pub frames_emitted: u64,
    /// Frames dropped ahead of the event sink.
    pub frames_dropped: u64,
    /// Token samples discarded.
    pub samples_dropped: u64,
    /// Extensions whose workers did not stop within the grace period.
    pub extensions_abandoned: Vec<ExtensionId>,
    /// Whether the event sink took the terminal frame in time.
    pub sink_drained: bool,
}

struct StreamLane {
    calculator: TokenEnergyCalculator,
    feed: FeedReceiver,
}

/// Everything a session mutates from one tick to the next.
pub struct SessionState {
    session_id: SessionId,
    config: SessionConfig,
    lanes: BTreeMap<StreamId, StreamLane>,
    coordinator: StreamCoordinator,
    guard: ExtensionBudgetGuard,
    controller: AdaptationController,
    snapshot: SnapshotCell,
    telemetry: TelemetryService,
    emitter: EmitterWorker,
    queue: FrameQueue,
    quality: QualityLevel,
}

impl SessionState {
    pub(crate) fn new(
        session_id: SessionId,
        config: SessionConfig,
        guard: ExtensionBudgetGuard,
        telemetry: TelemetryService,
        emitter: EmitterWorker,
        queue: FrameQueue,
    ) -> Self {
        let controller = AdaptationController::new(&config.adaptation);
        let quality = controller.level();
        telemetry.metrics().set_quality(quality);
        Self {
            session_id,
            coordinator: StreamCoordinator::new(config.fusion.interference_window),
            snapshot: SnapshotCell::new(ControlSnapshot {
                quality,
                ..ControlSnapshot::default()
            }),
            lanes: BTreeMap::new(),
            guard,
            controller,
            telemetry,
            emitter,
            queue,
            quality,
            config,
        }
    }

    /// The session.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Quality level in effect for the next tick.
    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    /// A handle to the published snapshot.
    pub fn snapshot(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    /// Streams currently fused, in id order.
    pub fn stream_ids(&self) -> impl Iterator<Item = &StreamId> {
        self.lanes.keys()
    }

    /// The extension guard.
    pub fn guard(&self) -> &ExtensionBudgetGuard {
        &self.guard
    }

    /// The adaptation controller.
    pub fn controller(&self) -> &AdaptationController {
        &self.controller
    }

    /// The session metrics.
    pub fn metrics(&self) -> &PipelineMetrics {
        self.telemetry.metrics()
    }

    /// The registry backing the session metrics.
    pub fn registry(&self) -> &MetricsRegistry {
        self.telemetry.registry()
    }

    pub(crate) fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    /// Adds a stream or, if it exists, updates its weight and replaces its
    /// feed. Energy history is kept across a replacement.
    ///
    /// A stream whose weight is negative or not finite is rejected and its
    /// feed dropped, so the producer sees the feed as closed.
    pub(crate) fn add_stream(&mut self, config: StreamConfig, feed: FeedReceiver) -> bool {
        if !config.has_valid_weight() {
            log::warn!(
                "Orchestrator: stream '{}' rejected, invalid weight {}",
                config.id,
                config.weight
            );
            return false;
        }
        self.coordinator.add_stream(&config);
        match self.lanes.get_mut(&config.id) {
            Some(lane) => {
                log::warn!("Orchestrator: stream '{}' re-added, feed replaced", config.id);
                lane.feed = feed;
            }
            None => {
                log::info!("Orchestrator: stream '{}' added (weight {})", config.id, config.weight);
                let calculator = TokenEnergyCalculator::new(config.id.clone(), self.config.energy.clone());
                self.lanes.insert(config.id, StreamLane { calculator, feed });
            }
        }
        true
    }

    pub(crate) fn remove_stream(&mut self, id: &StreamId) -> bool {
        self.coordinator.remove_stream(id);
        let removed = self.lanes.remove(id).is_some();
        if removed {
            log::info!("Orchestrator: stream '{id}' removed");
        }
        removed
    }

    fn apply(&mut self, command: Command, device: &mut Option<DeviceTelemetry>) {
        match command {
            Command::AddStream { config, feed } => {
                self.add_stream(config, feed);
            }
            Command::RemoveStream(id) => {
                if !self.remove_stream(&id) {
                    log::warn!("Orchestrator: cannot remove unknown stream '{id}'");
                }
            }
            Command::RegisterExtension {
                id,
                extension,
                budget_ms,
                priority,
            } => {
                if let Err(e) = self.guard.register(id, extension, budget_ms, priority) {
                    log::warn!("Orchestrator: extension registration failed: {e}");
                }
            }
            Command::UnregisterExtension(id) => {
                if !self.guard.unregister(&id) {
                    log::warn!("Orchestrator: cannot unregister unknown extension '{id}'");
                }
            }
            Command::ResetExtension(id) => {
                if !self.guard.reset(&id) {
                    log::warn!("Orchestrator: cannot reset unknown extension '{id}'");
                }
            }
            Command::Device(reading) => *device = Some(reading),
        }
    }

    /// Drains every feed and computes this tick's energy per stream.
    fn compute_streams(&mut self, tick_id: u64) -> BTreeMap<StreamId, EnergySample> {
        let max = self.config.energy.max_samples_per_tick;
        let mut per_stream = BTreeMap::new();
        let mut dropped = 0u64;

        for (id, lane) in &mut self.lanes {
            let overflow = lane.feed.take_overflow();
            if overflow > 0 {
                log::warn!("Orchestrator: feed of '{id}' overflowed, {overflow} sample(s) dropped");
                dropped += overflow;
            }

            let output = lane.calculator.compute(tick_id, lane.feed.drain(max));
            for discarded in output.discarded {
                dropped += 1;
                self.telemetry.record(TelemetryEvent::SampleDiscarded {
                    stream: id.clone(),
                    sequence_no: discarded.sequence_no,
                    last_accepted: discarded.last_accepted,
                });
            }
            per_stream.insert(id.clone(), output.sample);
        }

        self.telemetry.metrics().samples_dropped(dropped);
        per_stream
    }

    fn run_extensions(
        &mut self,
        frame: &FusedEnergyFrame,
        quality: QualityLevel,
        budget: &TickBudget,
    ) -> GuardReport {
        if self.guard.is_empty() {
            return GuardReport::default();
        }
        let view = TickView::from_frame(frame, quality);
        let report = {
            let _timer = ScopedMetricTimer::new(self.telemetry.metrics().extension_stage());
            self.guard.run_tick(&view, budget)
        };

        self.telemetry
            .metrics()
            .extension_overruns(report.overruns() as u64);
        for event in &report.events {
            self.telemetry.record(event.clone());
        }
        report
    }

    fn hand_off(&mut self, event: FrameEvent) -> Vec<u64> {
        let dropped = self.queue.push(event);
        for &tick_id in &dropped {
            log::trace!("Orchestrator: frame {tick_id} dropped, sink lagging");
            self.telemetry.record(TelemetryEvent::FrameDropped { tick_id });
        }
        self.telemetry.metrics().frames_dropped(dropped.len() as u64);
        dropped
    }

    fn publish(&self, tick_id: u64) {
        let stats = self.controller.statistics();
        let snapshot = ControlSnapshot {
            tick_id,
            quality: self.quality,
            avg_tick_ms: stats.average_ms(),
            p95_tick_ms: stats.p95_ms(),
            overrun_count: stats.overrun_count(),
            throttled_extensions: self.guard.throttled(),
        };
        if !self.snapshot.publish(snapshot) {
            log::trace!("Orchestrator: snapshot busy, publish skipped at tick {tick_id}");
        }
    }

    fn report(&self, tick_id: u64) {
        let stats = self.controller.statistics();
        let report = self.telemetry.build_report(
            tick_id,
            self.quality,
            stats.average_ms(),
            stats.p95_ms(),
            self.guard.throttled(),
        );
        self.telemetry.record(TelemetryEvent::Report(report));
    }
}

/// Runs ticks over a [`SessionState`].
pub struct CycleOrchestrator {
    clock: Arc<dyn Clock>,
    nominal: Duration,
    commands: Receiver<Command>,
    command_budget: usize,
    device: Option<DevicePoller>,
    next_tick_id: u64,
    last_timestamp_ms: u64,
}

impl CycleOrchestrator {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        nominal: Duration,
        commands: Receiver<Command>,
        command_budget: usize,
        device: Option<DevicePoller>,
    ) -> Self {
        Self {
            clock,
            nominal,
            commands,
            command_budget: command_budget.max(1),
            device,
            next_tick_id: 0,
            last_timestamp_ms: 0,
        }
    }

    /// The host clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// The nominal tick interval.
    pub fn nominal(&self) -> Duration {
        self.nominal
    }

    /// The id the next tick will get.
    pub fn next_tick_id(&self) -> u64 {
        self.next_tick_id
    }

    /// Wall-clock stamp for the current tick, never going backwards.
    fn timestamp_ms(&mut self) -> u64 {
        let now = self.clock.unix_millis().unwrap_or(self.last_timestamp_ms);
        self.last_timestamp_ms = self.last_timestamp_ms.max(now);
        self.last_timestamp_ms
    }

    /// Runs one complete tick.
    pub fn run_tick(&mut self, state: &mut SessionState) -> TickOutcome {
        let tick_id = self.next_tick_id;
        self.next_tick_id += 1;
        let mut budget = TickBudget::begin(tick_id, self.nominal);
        let quality = state.quality;

        let mut device = self.device.as_ref().and_then(DevicePoller::latest);
        for command in self.commands.try_iter().take(self.command_budget) {
            state.apply(command, &mut device);
        }

        let timestamp_ms = self.timestamp_ms();
        let per_stream = state.compute_streams(tick_id);
        let frame = state
            .coordinator
            .fuse(tick_id, timestamp_ms, per_stream, quality);

        let extensions = state.run_extensions(&frame, quality, &budget);

        let timing = budget.finalize();
        let transition = state.controller.observe(&timing, device.as_ref());
        if let Some(change) = transition {
            state.quality = change.to;
            state.telemetry.metrics().set_quality(change.to);
            state.telemetry.record(TelemetryEvent::QualityChanged(change));
        }

        let dropped_frames = state.hand_off(FrameEvent::from_frame(frame, quality, transition));

        let total = budget.started().elapsed();
        if total > self.nominal {
            log::debug!(
                "Orchestrator: tick {tick_id} overran ({:.3} ms of {:.3} ms)",
                duration_ms(total),
                duration_ms(self.nominal)
            );
        }
        state.telemetry.metrics().record_tick(&timing);
        state.telemetry.record(TelemetryEvent::TickTimed(timing));
        state.publish(tick_id);
        if state.telemetry.report_due(tick_id) {
            state.report(tick_id);
        }

        TickOutcome {
            tick_id,
            timing,
            quality,
            transition,
            dropped_frames,
            extensions,
        }
    }

    /// Emits the terminal frame and releases every worker.
    ///
    /// Extensions get `cancel_grace_ticks` intervals to stop; the event sink
    /// gets `shutdown_grace_ms` to take the terminal frame. Anything still
    /// running after that is abandoned.
    pub fn finish(mut self, mut state: SessionState) -> SessionSummary {
        let tick_id = self.next_tick_id;
        self.next_tick_id += 1;
        let quality = state.quality;

        let timestamp_ms = self.timestamp_ms();
        let per_stream = state.compute_streams(tick_id);
        let frame = state
            .coordinator
            .fuse(tick_id, timestamp_ms, per_stream, quality);
        state.hand_off(FrameEvent::from_frame(frame, quality, None).into_terminal());

        let extension_grace = self
            .nominal
            .saturating_mul(state.config.extensions.cancel_grace_ticks);
        let extensions = state.guard.shutdown(extension_grace);

        let sink_grace = Duration::from_millis(state.config.emitter.shutdown_grace_ms);
        let sink_drained = state.emitter.join_until(Instant::now() + sink_grace);

        if let Some(poller) = self.device.as_mut() {
            poller.stop();
        }

        let metrics = state.telemetry.metrics();
        let summary = SessionSummary {
            session_id: state.session_id,
            ticks: self.next_tick_id,
            final_quality: quality,
            frames_emitted: metrics.frames_emitted_total(),
            frames_dropped: metrics.frames_dropped_total(),
            samples_dropped: metrics.samples_dropped_total(),
            extensions_abandoned: extensions.abandoned,
            sink_drained,
        };

        state.telemetry.record(TelemetryEvent::SessionStopped {
            session_id: state.session_id,
            tick_id,
        });
        state.telemetry.shutdown(sink_grace);
        log::info!(
            "Session {}: stopped after {} ticks at {}",
            summary.session_id,
            summary.ticks,
            summary.final_quality
        );
        summary
    }
}
