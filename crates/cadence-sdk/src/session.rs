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

//! Building, running and stopping sessions.

use crate::clock::FrameClock;
use crate::command::{self, CommandSender};
use crate::emitter::EmitterWorker;
use crate::error::{CommandError, SessionError};
use crate::feed::{self, FeedSender};
use crate::orchestrator::{CycleOrchestrator, SessionState, SessionSummary, TickOutcome};
use cadence_control::{ControlSnapshot, ExtensionBudgetGuard, GuardError, SnapshotCell};
use cadence_core::{
    Clock, DeviceTelemetry, EventSink, Extension, ExtensionId, HardwareMonitor, QualityLevel,
    SessionConfig, SessionId, StartupError, StreamConfig, StreamId, SystemClock, TelemetryEvent,
    TelemetrySink,
};
use cadence_infra::DevicePoller;
use cadence_telemetry::{LogTelemetrySink, MetricsRegistry, PipelineMetrics, TelemetryService};
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct PendingExtension {
    id: ExtensionId,
    extension: Box<dyn Extension>,
    budget_ms: Option<f32>,
    priority: f32,
}

/// Configures and starts a session.
///
/// ```no_run
/// use cadence_core::SessionConfig;
/// use cadence_sdk::{JsonLinesSink, SessionBuilder};
///
/// let handle = SessionBuilder::new(SessionConfig::default(), JsonLinesSink::stdout())
///     .build()?
///     .spawn()?;
/// let _summary = handle.stop();
/// # Ok::<(), cadence_core::StartupError>(())
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    event_sink: Box<dyn EventSink>,
    telemetry_sink: Box<dyn TelemetrySink>,
    registry: MetricsRegistry,
    monitor: Option<(Arc<dyn HardwareMonitor>, Duration)>,
    extensions: Vec<PendingExtension>,
}

impl SessionBuilder {
    /// Starts from `config`, emitting frames to `event_sink`.
    ///
    /// Defaults: the system clock, telemetry written to the log, a fresh
    /// metrics registry and no hardware monitor.
    pub fn new(config: SessionConfig, event_sink: impl EventSink) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            event_sink: Box::new(event_sink),
            telemetry_sink: Box::new(LogTelemetrySink),
            registry: MetricsRegistry::new(),
            monitor: None,
            extensions: Vec::new(),
        }
    }

    /// Replaces the host clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the telemetry sink.
    pub fn telemetry_sink(mut self, sink: impl TelemetrySink) -> Self {
        self.telemetry_sink = Box::new(sink);
        self
    }

    /// Registers the session metrics in an existing registry.
    pub fn metrics_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Samples `monitor` every `interval` on a background thread and feeds
    /// the readings to the adaptation controller.
    pub fn hardware_monitor(mut self, monitor: Arc<dyn HardwareMonitor>, interval: Duration) -> Self {
        self.monitor = Some((monitor, interval));
        self
    }

    /// Registers an extension before the first tick.
    pub fn extension(
        mut self,
        id: impl Into<ExtensionId>,
        extension: impl Extension,
        budget_ms: Option<f32>,
        priority: f32,
    ) -> Self {
        self.extensions.push(PendingExtension {
            id: id.into(),
            extension: Box::new(extension),
            budget_ms,
            priority,
        });
        self
    }

    /// Validates the configuration, checks the clock and starts the
    /// session's workers. No tick runs until the session is stepped or
    /// spawned.
    pub fn build(self) -> Result<Session, StartupError> {
        let SessionBuilder {
            config,
            clock,
            event_sink,
            telemetry_sink,
            registry,
            monitor,
            extensions,
        } = self;

        config.validate()?;
        clock.check()?;
        let session_id = SessionId::new();

        let telemetry = TelemetryService::start(session_id, &config.telemetry, registry, telemetry_sink)?;
        let (emitter, queue) = EmitterWorker::spawn(
            event_sink,
            config.emitter.queue_capacity,
            telemetry.metrics().clone(),
        )?;

        let mut guard = ExtensionBudgetGuard::new(&config.extensions);
        for pending in extensions {
            let id = pending.id.clone();
            guard
                .register(pending.id, pending.extension, pending.budget_ms, pending.priority)
                .map_err(|e| startup_error(id, e))?;
        }

        let device = monitor
            .map(|(monitor, interval)| DevicePoller::spawn(monitor, interval))
            .transpose()?;

        let (commands, command_rx) = command::channel(config.feeds.command_capacity);
        let orchestrator = CycleOrchestrator::new(
            clock,
            config.clock.interval(),
            command_rx,
            config.feeds.command_capacity,
            device,
        );

        let feed_capacity = config.feeds.channel_capacity;
        let streams = config.streams.clone();
        let mut state = SessionState::new(session_id, config, guard, telemetry, emitter, queue);
        let mut feeds = BTreeMap::new();
        for stream in streams {
            let (sender, receiver) = feed::channel(stream.id.clone(), feed_capacity);
            feeds.insert(stream.id.clone(), sender);
            state.add_stream(stream, receiver);
        }

        state.telemetry().record(TelemetryEvent::SessionStarted {
            session_id,
            quality_level: state.quality(),
        });
        log::info!(
            "Session {session_id}: ready with {} stream(s), {} extension(s), {:?} ticks at {}",
            feeds.len(),
            state.guard().len(),
            orchestrator.nominal(),
            state.quality()
        );

        Ok(Session {
            orchestrator,
            state,
            commands,
            feeds,
            feed_capacity,
        })
    }
}

fn startup_error(id: ExtensionId, error: GuardError) -> StartupError {
    match error {
        GuardError::Spawn { source, .. } => StartupError::WorkerSpawn {
            name: format!("cadence-ext-{id}"),
            source,
        },
        other => StartupError::ExtensionRejected {
            id,
            reason: other.to_string(),
        },
    }
}

/// A built session, stepped by hand or spawned onto its own tick thread.
pub struct Session {
    orchestrator: CycleOrchestrator,
    state: SessionState,
    commands: CommandSender,
    feeds: BTreeMap<StreamId, FeedSender>,
    feed_capacity: usize,
}

impl Session {
    /// The session id.
    pub fn session_id(&self) -> SessionId {
        self.state.session_id()
    }

    /// The feed of a stream configured at build time.
    pub fn feed(&self, id: &StreamId) -> Option<FeedSender> {
        self.feeds.get(id).cloned()
    }

    /// Queues a stream addition; it is fused from the next tick on.
    pub fn add_stream(&mut self, config: StreamConfig) -> Result<FeedSender, CommandError> {
        let id = config.id.clone();
        let sender = self.commands.add_stream(config, self.feed_capacity)?;
        self.feeds.insert(id, sender.clone());
        Ok(sender)
    }

    /// The command channel.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// The session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs one tick immediately, outside of any schedule.
    pub fn run_tick(&mut self) -> TickOutcome {
        self.orchestrator.run_tick(&mut self.state)
    }

    /// Emits the terminal frame and stops every worker.
    pub fn finish(self) -> SessionSummary {
        self.orchestrator.finish(self.state)
    }

    /// Moves the session onto a dedicated tick thread driven by a
    /// [`FrameClock`].
    pub fn spawn(self) -> Result<SessionHandle, StartupError> {
        let Session {
            mut orchestrator,
            mut state,
            commands,
            feeds,
            feed_capacity,
        } = self;

        let mut frame_clock = FrameClock::new(orchestrator.clock(), orchestrator.nominal())?;
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let session_id = state.session_id();
        let snapshot = state.snapshot();
        let metrics = state.metrics().clone();
        let registry = state.registry().clone();

        let name = "cadence-tick".to_string();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(frame_clock.time_until_next()) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    if let Some(tick) = frame_clock.poll() {
                        state.metrics().clock_skipped(tick.skipped);
                        orchestrator.run_tick(&mut state);
                    }
                }
                orchestrator.finish(state)
            })
            .map_err(|source| StartupError::WorkerSpawn { name, source })?;

        Ok(SessionHandle {
            session_id,
            commands,
            feeds,
            feed_capacity,
            snapshot,
            metrics,
            registry,
            stop,
            thread: Some(thread),
        })
    }
}

/// Controls a session running on its tick thread.
///
/// Dropping the handle stops the session and waits for it.
pub struct SessionHandle {
    session_id: SessionId,
    commands: CommandSender,
    feeds: BTreeMap<StreamId, FeedSender>,
    feed_capacity: usize,
    snapshot: SnapshotCell,
    metrics: PipelineMetrics,
    registry: MetricsRegistry,
    stop: Sender<()>,
    thread: Option<JoinHandle<SessionSummary>>,
}

impl SessionHandle {
    /// The session id.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The feed of a known stream.
    pub fn feed(&self, id: &StreamId) -> Option<FeedSender> {
        self.feeds.get(id).cloned()
    }

    /// Adds a stream and returns its feed. Fused from the next tick on.
    pub fn add_stream(&mut self, config: StreamConfig) -> Result<FeedSender, CommandError> {
        let id = config.id.clone();
        let sender = self.commands.add_stream(config, self.feed_capacity)?;
        self.feeds.insert(id, sender.clone());
        Ok(sender)
    }

    /// Removes a stream and closes its feed.
    pub fn remove_stream(&mut self, id: &StreamId) -> Result<(), CommandError> {
        self.commands.remove_stream(id.clone())?;
        self.feeds.remove(id);
        Ok(())
    }

    /// Registers an extension.
    pub fn register_extension(
        &self,
        id: impl Into<ExtensionId>,
        extension: impl Extension,
        budget_ms: Option<f32>,
        priority: f32,
    ) -> Result<(), CommandError> {
        self.commands
            .register_extension(id.into(), Box::new(extension), budget_ms, priority)
    }

    /// Unregisters an extension.
    pub fn unregister_extension(&self, id: impl Into<ExtensionId>) -> Result<(), CommandError> {
        self.commands.unregister_extension(id.into())
    }

    /// Clears an extension's throttle.
    pub fn reset_extension(&self, id: impl Into<ExtensionId>) -> Result<(), CommandError> {
        self.commands.reset_extension(id.into())
    }

    /// Pushes a device reading to the adaptation controller.
    pub fn push_device(&self, reading: DeviceTelemetry) -> Result<(), CommandError> {
        self.commands.push_device(reading)
    }

    /// The command channel.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// The latest published controller state.
    pub fn snapshot(&self) -> ControlSnapshot {
        self.snapshot.load()
    }

    /// Quality level in effect for the next tick.
    pub fn quality(&self) -> QualityLevel {
        self.snapshot.quality()
    }

    /// The session metrics.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// The registry backing the session metrics.
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Whether the tick thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the tick thread and waits for the terminal frame and the
    /// worker shutdown. The signal is observed within one tick.
    pub fn stop(mut self) -> Result<SessionSummary, SessionError> {
        self.join()
    }

    fn join(&mut self) -> Result<SessionSummary, SessionError> {
        let _ = self.stop.try_send(());
        let Some(thread) = self.thread.take() else {
            return Err(SessionError::AlreadyStopped);
        };
        thread.join().map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            SessionError::TickThreadPanicked(reason)
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.join() {
                log::error!("Session {}: {e}", self.session_id);
            }
        }
    }
}
