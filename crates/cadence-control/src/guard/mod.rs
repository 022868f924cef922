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

//! Runs extensions under measured time budgets.
//!
//! Each extension lives on its own worker thread. Per tick the guard hands
//! every non-throttled extension a shared [`TickView`] and waits for the
//! result at most `min(own budget, remaining tick time - reserve)`. A result
//! that does not arrive in time is abandoned for this tick; the worker keeps
//! running and its late completion is collected on a later tick.
//!
//! An invocation longer than the extension's own budget is an overrun. So is
//! a tick on which the extension is still busy with an earlier invocation.
//! When `consecutive_overruns` reaches the ceiling the extension is throttled
//! and skipped until [`ExtensionBudgetGuard::reset`] is called.

mod registry;
mod worker;

use registry::{ExtensionEntry, ExtensionRegistry};
use worker::{Completion, ExtensionWorker, InFlight, Job};

use cadence_core::budget::{duration_ms, ms_duration, TickBudget};
use cadence_core::config::ExtensionConfig;
use cadence_core::extension::{Extension, ExtensionHandle, ExtensionId, TickView};
use cadence_core::telemetry::TelemetryEvent;
use crossbeam_channel::{RecvTimeoutError, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A registration failure.
#[derive(Debug, Error)]
pub enum GuardError {
    /// An extension with this id is already registered.
    #[error("extension '{0}' is already registered")]
    Duplicate(ExtensionId),
    /// The requested budget is not a positive number of milliseconds.
    #[error("extension budget must be positive, got {0} ms")]
    InvalidBudget(f32),
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker for extension '{id}': {source}")]
    Spawn {
        /// The extension.
        id: ExtensionId,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// What happened to the extensions during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardReport {
    /// Extensions invoked this tick.
    pub dispatched: usize,
    /// Extensions skipped because they are throttled.
    pub skipped_throttled: usize,
    /// Extensions skipped because no tick time was left.
    pub skipped_no_time: usize,
    /// Overruns, throttles and failures, in the order they happened.
    pub events: Vec<TelemetryEvent>,
}

impl GuardReport {
    /// Number of overruns recorded this tick.
    pub fn overruns(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::ExtensionOverrun { .. }))
            .count()
    }
}

/// The result of [`ExtensionBudgetGuard::shutdown`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownSummary {
    /// Workers that exited within the grace period.
    pub joined: Vec<ExtensionId>,
    /// Workers still running at the deadline, detached.
    pub abandoned: Vec<ExtensionId>,
}

/// Owner of every registered extension.
pub struct ExtensionBudgetGuard {
    default_budget_ms: f32,
    overrun_ceiling: u32,
    reserve: Duration,
    job_capacity: usize,
    registry: ExtensionRegistry,
}

impl ExtensionBudgetGuard {
    /// Creates an empty guard.
    pub fn new(config: &ExtensionConfig) -> Self {
        Self {
            default_budget_ms: config.default_budget_ms,
            overrun_ceiling: config.overrun_ceiling.max(1),
            reserve: ms_duration(config.emit_reserve_ms),
            job_capacity: config.job_capacity.max(1),
            registry: ExtensionRegistry::default(),
        }
    }

    /// Registers an extension and starts its worker.
    ///
    /// `budget_ms` defaults to the configured default budget. Higher
    /// `priority` runs first within a tick.
    pub fn register(
        &mut self,
        id: ExtensionId,
        extension: Box<dyn Extension>,
        budget_ms: Option<f32>,
        priority: f32,
    ) -> Result<(), GuardError> {
        if self.registry.contains(&id) {
            return Err(GuardError::Duplicate(id));
        }
        let budget_ms = budget_ms.unwrap_or(self.default_budget_ms);
        if !(budget_ms > 0.0 && budget_ms.is_finite()) {
            return Err(GuardError::InvalidBudget(budget_ms));
        }

        let worker = ExtensionWorker::spawn(&id, extension, self.job_capacity)
            .map_err(|source| GuardError::Spawn {
                id: id.clone(),
                source,
            })?;
        self.registry.register(ExtensionEntry {
            handle: ExtensionHandle::new(id, budget_ms),
            priority,
            worker,
        });
        Ok(())
    }

    /// Removes an extension. Its worker is detached and exits after its
    /// current invocation.
    pub fn unregister(&mut self, id: &ExtensionId) -> bool {
        match self.registry.remove(id) {
            Some(_) => {
                log::info!("Guard: unregistered '{id}'");
                true
            }
            None => false,
        }
    }

    /// Clears an extension's throttle and overrun streak.
    pub fn reset(&mut self, id: &ExtensionId) -> bool {
        match self.registry.get_mut(id) {
            Some(entry) => {
                entry.handle.reset();
                log::info!("Guard: reset '{id}'");
                true
            }
            None => false,
        }
    }

    /// Bookkeeping of one extension.
    pub fn handle(&self, id: &ExtensionId) -> Option<&ExtensionHandle> {
        self.registry.get(id).map(|e| &e.handle)
    }

    /// Bookkeeping of every extension, in execution order.
    pub fn handles(&self) -> impl Iterator<Item = &ExtensionHandle> {
        self.registry.iter().map(|e| &e.handle)
    }

    /// Ids of the throttled extensions.
    pub fn throttled(&self) -> Vec<ExtensionId> {
        self.handles()
            .filter(|h| h.throttled)
            .map(|h| h.id.clone())
            .collect()
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// `true` if no extension is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Runs every eligible extension for one tick.
    ///
    /// Never waits past the tick's remaining budget minus the configured
    /// reserve.
    pub fn run_tick(&mut self, view: &TickView, budget: &TickBudget) -> GuardReport {
        let mut report = GuardReport::default();
        if self.registry.is_empty() {
            return report;
        }

        let tick_id = view.tick_id;
        let ceiling = self.overrun_ceiling;
        let reserve = self.reserve;
        let shared = Arc::new(view.clone());

        for entry in self.registry.iter_mut() {
            collect_late(entry, tick_id, ceiling, &mut report.events);

            if entry.handle.throttled {
                report.skipped_throttled += 1;
                continue;
            }

            if let Some(in_flight) = entry.worker.in_flight.as_mut() {
                in_flight.overrun_counted = true;
                let busy_ms = duration_ms(in_flight.dispatched_at.elapsed());
                log::debug!(
                    "Guard: '{}' still busy with tick {}",
                    entry.handle.id,
                    in_flight.tick_id
                );
                record_overrun(&mut entry.handle, tick_id, busy_ms, true, ceiling, &mut report.events);
                continue;
            }

            let own_budget = ms_duration(entry.handle.budget_ms);
            let remaining = budget.remaining_with_reserve(reserve);
            let grant = own_budget.min(remaining);
            if grant.is_zero() {
                log::debug!("Guard: no time left for '{}' at tick {}", entry.handle.id, tick_id);
                report.skipped_no_time += 1;
                continue;
            }

            let job = Job {
                tick_id,
                view: Arc::clone(&shared),
            };
            match entry.worker.dispatch(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    record_overrun(&mut entry.handle, tick_id, 0.0, true, ceiling, &mut report.events);
                    continue;
                }
                Err(TrySendError::Disconnected(_)) => {
                    record_failure(
                        &mut entry.handle,
                        tick_id,
                        "worker disconnected".into(),
                        &mut report.events,
                    );
                    continue;
                }
            }
            report.dispatched += 1;
            let dispatched_at = Instant::now();

            match entry.worker.wait(grant) {
                Ok(completion) => {
                    settle(entry, completion, tick_id, false, ceiling, &mut report.events);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let exceeded_own = grant >= own_budget;
                    entry.worker.in_flight = Some(InFlight {
                        tick_id,
                        dispatched_at,
                        overrun_counted: exceeded_own,
                    });
                    if exceeded_own {
                        let waited_ms = duration_ms(dispatched_at.elapsed());
                        record_overrun(
                            &mut entry.handle,
                            tick_id,
                            waited_ms,
                            true,
                            ceiling,
                            &mut report.events,
                        );
                    } else {
                        log::debug!(
                            "Guard: abandoned '{}' at tick {} when the tick ran out of time",
                            entry.handle.id,
                            tick_id
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    record_failure(
                        &mut entry.handle,
                        tick_id,
                        "worker disconnected".into(),
                        &mut report.events,
                    );
                }
            }
        }

        report
    }

    /// Stops every worker, waiting at most `grace` for them to exit.
    ///
    /// Workers that are still running at the deadline are abandoned.
    pub fn shutdown(&mut self, grace: Duration) -> ShutdownSummary {
        let deadline = Instant::now() + grace;
        let mut entries = self.registry.drain();
        for entry in &mut entries {
            entry.worker.close();
        }

        let mut summary = ShutdownSummary::default();
        for entry in entries {
            let id = entry.handle.id;
            if entry.worker.join_until(deadline) {
                summary.joined.push(id);
            } else {
                log::warn!("Guard: abandoning '{id}' which did not stop within {grace:?}");
                summary.abandoned.push(id);
            }
        }
        summary
    }
}

/// Collects completions of invocations the guard stopped waiting for.
fn collect_late(
    entry: &mut ExtensionEntry,
    tick_id: u64,
    ceiling: u32,
    events: &mut Vec<TelemetryEvent>,
) {
    while let Ok(completion) = entry.worker.try_completion() {
        let counted = entry
            .worker
            .in_flight
            .map_or(false, |in_flight| in_flight.overrun_counted);
        settle(entry, completion, tick_id, counted, ceiling, events);
    }
}

/// Applies a completion to the extension's bookkeeping.
fn settle(
    entry: &mut ExtensionEntry,
    completion: Completion,
    tick_id: u64,
    already_counted: bool,
    ceiling: u32,
    events: &mut Vec<TelemetryEvent>,
) {
    let late = entry.worker.in_flight.take().is_some();
    match completion {
        Completion::Finished {
            tick_id: ran_at,
            duration,
        } => {
            let ms = duration_ms(duration);
            if already_counted {
                entry.handle.last_duration_ms = ms;
                log::debug!(
                    "Guard: late result of '{}' for tick {} discarded ({ms:.2} ms)",
                    entry.handle.id,
                    ran_at
                );
            } else if ms > entry.handle.budget_ms {
                record_overrun(&mut entry.handle, tick_id, ms, late, ceiling, events);
            } else {
                entry.handle.last_duration_ms = ms;
                entry.handle.consecutive_overruns = 0;
            }
        }
        Completion::Panicked {
            tick_id: ran_at,
            reason,
        } => {
            log::debug!("Guard: '{}' panicked on tick {}", entry.handle.id, ran_at);
            record_failure(&mut entry.handle, tick_id, reason, events);
        }
    }
}

fn record_overrun(
    handle: &mut ExtensionHandle,
    tick_id: u64,
    duration_ms: f32,
    abandoned: bool,
    ceiling: u32,
    events: &mut Vec<TelemetryEvent>,
) {
    handle.last_duration_ms = duration_ms;
    handle.consecutive_overruns = handle.consecutive_overruns.saturating_add(1);
    log::warn!(
        "Guard: '{}' overran at tick {} ({:.2} ms of {:.2} ms, streak {})",
        handle.id,
        tick_id,
        duration_ms,
        handle.budget_ms,
        handle.consecutive_overruns
    );
    events.push(TelemetryEvent::ExtensionOverrun {
        tick_id,
        extension: handle.id.clone(),
        duration_ms,
        budget_ms: handle.budget_ms,
        abandoned,
    });
    if !handle.throttled && handle.consecutive_overruns >= ceiling {
        throttle(handle, tick_id, events);
    }
}

fn record_failure(
    handle: &mut ExtensionHandle,
    tick_id: u64,
    reason: String,
    events: &mut Vec<TelemetryEvent>,
) {
    log::error!("Guard: '{}' failed at tick {}: {}", handle.id, tick_id, reason);
    events.push(TelemetryEvent::ExtensionFailed {
        tick_id,
        extension: handle.id.clone(),
        reason,
    });
    if !handle.throttled {
        throttle(handle, tick_id, events);
    }
}

fn throttle(handle: &mut ExtensionHandle, tick_id: u64, events: &mut Vec<TelemetryEvent>) {
    handle.throttled = true;
    log::error!(
        "Guard: throttling '{}' at tick {} (overrun streak {})",
        handle.id,
        tick_id,
        handle.consecutive_overruns
    );
    events.push(TelemetryEvent::ExtensionThrottled {
        tick_id,
        extension: handle.id.clone(),
        consecutive_overruns: handle.consecutive_overruns,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::quality::QualityLevel;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    const TICK: Duration = Duration::from_millis(16);

    fn guard() -> ExtensionBudgetGuard {
        ExtensionBudgetGuard::new(&ExtensionConfig::default())
    }

    fn view(tick_id: u64) -> TickView {
        TickView {
            tick_id,
            quality: QualityLevel::High,
            total_energy: 0.5,
            interference_score: None,
            streams: Vec::new(),
        }
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Box<dyn Extension> {
        let calls = Arc::clone(calls);
        Box::new(move |_: &TickView| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn sleeping(ms: u64, slow: &Arc<AtomicBool>, calls: &Arc<AtomicUsize>) -> Box<dyn Extension> {
        let slow = Arc::clone(slow);
        let calls = Arc::clone(calls);
        Box::new(move |_: &TickView| {
            calls.fetch_add(1, Ordering::SeqCst);
            if slow.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(ms));
            }
        })
    }

    #[test]
    fn test_fast_extension_runs_every_tick() {
        let mut guard = guard();
        let calls = Arc::new(AtomicUsize::new(0));
        guard
            .register(ExtensionId::new("fast"), counting(&calls), Some(5.0), 0.0)
            .unwrap();

        for tick in 0..5 {
            let report = guard.run_tick(&view(tick), &TickBudget::begin(tick, TICK));
            assert_eq!(report.dispatched, 1);
            assert!(report.events.is_empty(), "{:?}", report.events);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let handle = guard.handle(&ExtensionId::new("fast")).unwrap();
        assert_eq!(handle.consecutive_overruns, 0);
        assert!(!handle.throttled);
        assert!(guard.shutdown(Duration::from_millis(100)).abandoned.is_empty());
    }

    #[test]
    fn test_slow_extension_is_throttled_and_stays_throttled() {
        let mut guard = guard();
        let id = ExtensionId::new("slow");
        let slow = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        guard
            .register(id.clone(), sleeping(60, &slow, &calls), Some(5.0), 0.0)
            .unwrap();

        // Tick 0 waits out the 5 ms budget, ticks 1 and 2 find it still busy.
        let mut events = Vec::new();
        for tick in 0..3 {
            let report = guard.run_tick(&view(tick), &TickBudget::begin(tick, TICK));
            assert_eq!(report.overruns(), 1, "tick {tick}");
            events.extend(report.events);
        }
        assert!(matches!(
            events.last(),
            Some(TelemetryEvent::ExtensionThrottled {
                tick_id: 2,
                consecutive_overruns: 3,
                ..
            })
        ));
        assert_eq!(guard.throttled(), vec![id.clone()]);

        // Even once fast again, it is skipped until reset.
        slow.store(false, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(80));
        for tick in 3..10 {
            let report = guard.run_tick(&view(tick), &TickBudget::begin(tick, TICK));
            assert_eq!(report.skipped_throttled, 1);
            assert_eq!(report.dispatched, 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(guard.reset(&id));
        let report = guard.run_tick(&view(10), &TickBudget::begin(10, TICK));
        assert_eq!(report.dispatched, 1);
        assert!(report.events.is_empty(), "{:?}", report.events);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(guard.shutdown(Duration::from_millis(100)).abandoned.is_empty());
    }

    #[test]
    fn test_grant_never_exceeds_remaining_tick_time() {
        let mut guard = guard();
        let calls = Arc::new(AtomicUsize::new(0));
        guard
            .register(ExtensionId::new("late"), counting(&calls), Some(10.0), 0.0)
            .unwrap();

        let started = Instant::now() - Duration::from_millis(20);
        let exhausted = TickBudget::begin_at(0, TICK, started);
        let report = guard.run_tick(&view(0), &exhausted);

        assert_eq!(report.skipped_no_time, 1);
        assert_eq!(report.dispatched, 0);
        assert!(report.events.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abandoned_for_tick_time_is_not_an_overrun_when_within_own_budget() {
        let mut guard = guard();
        let id = ExtensionId::new("patient");
        let slow = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        guard
            .register(id.clone(), sleeping(8, &slow, &calls), Some(40.0), 0.0)
            .unwrap();

        // 4 ms tick minus the 1 ms reserve leaves about 3 ms.
        let short = Duration::from_millis(4);
        let report = guard.run_tick(&view(0), &TickBudget::begin(0, short));
        assert_eq!(report.dispatched, 1);
        assert!(report.events.is_empty(), "{:?}", report.events);

        thread::sleep(Duration::from_millis(40));
        slow.store(false, Ordering::SeqCst);
        let report = guard.run_tick(&view(1), &TickBudget::begin(1, TICK));
        assert!(report.events.is_empty(), "{:?}", report.events);

        let handle = guard.handle(&id).unwrap();
        assert_eq!(handle.consecutive_overruns, 0);
        assert!(!handle.throttled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_extension_is_throttled() {
        let mut guard = guard();
        let id = ExtensionId::new("fragile");
        let armed = Arc::new(AtomicBool::new(true));
        let trigger = Arc::clone(&armed);
        guard
            .register(
                id.clone(),
                Box::new(move |_: &TickView| {
                    if trigger.swap(false, Ordering::SeqCst) {
                        panic!("boom");
                    }
                }),
                Some(50.0),
                0.0,
            )
            .unwrap();

        let report = guard.run_tick(&view(0), &TickBudget::begin(0, Duration::from_millis(100)));
        assert!(matches!(
            &report.events[0],
            TelemetryEvent::ExtensionFailed { reason, .. } if reason == "boom"
        ));
        assert!(matches!(
            report.events[1],
            TelemetryEvent::ExtensionThrottled { .. }
        ));
        assert!(guard.handle(&id).unwrap().throttled);

        // The worker survives the panic.
        guard.reset(&id);
        let report = guard.run_tick(&view(1), &TickBudget::begin(1, Duration::from_millis(100)));
        assert_eq!(report.dispatched, 1);
        assert!(report.events.is_empty(), "{:?}", report.events);
    }

    #[test]
    fn test_priority_order() {
        let mut guard = guard();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("low", 0.1), ("high", 0.9), ("mid", 0.5)] {
            let order = Arc::clone(&order);
            guard
                .register(
                    ExtensionId::new(name),
                    Box::new(move |_: &TickView| order.lock().unwrap().push(name)),
                    Some(10.0),
                    priority,
                )
                .unwrap();
        }
        guard.run_tick(&view(0), &TickBudget::begin(0, Duration::from_millis(100)));
        assert_eq!(*order.lock().unwrap(), vec!["high", "mid", "low"]);
        let ids: Vec<&str> = guard.handles().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_registration_errors_and_unregister() {
        let mut guard = guard();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = ExtensionId::new("x");
        guard.register(id.clone(), counting(&calls), None, 0.0).unwrap();
        assert_eq!(guard.handle(&id).unwrap().budget_ms, 2.0);

        assert!(matches!(
            guard.register(id.clone(), counting(&calls), None, 0.0),
            Err(GuardError::Duplicate(_))
        ));
        assert!(matches!(
            guard.register(ExtensionId::new("y"), counting(&calls), Some(0.0), 0.0),
            Err(GuardError::InvalidBudget(_))
        ));

        assert!(guard.unregister(&id));
        assert!(!guard.unregister(&id));
        assert!(!guard.reset(&id));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_shutdown_abandons_stuck_worker() {
        let mut guard = guard();
        let slow = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        guard
            .register(ExtensionId::new("stuck"), sleeping(300, &slow, &calls), Some(1.0), 0.0)
            .unwrap();
        guard
            .register(ExtensionId::new("quick"), counting(&calls), Some(5.0), 0.0)
            .unwrap();
        guard.run_tick(&view(0), &TickBudget::begin(0, TICK));

        let started = Instant::now();
        let summary = guard.shutdown(Duration::from_millis(30));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(summary.abandoned, vec![ExtensionId::new("stuck")]);
        assert_eq!(summary.joined, vec![ExtensionId::new("quick")]);
        assert!(guard.is_empty());
    }
}
