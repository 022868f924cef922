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

//! End-to-end behaviour of a session, driven tick by tick or live.

use approx::assert_relative_eq;
use cadence_core::{
    DeviceTelemetry, EventSink, FrameEvent, QualityLevel, SessionConfig, StreamConfig, StreamId,
    TelemetryEvent, TickView, TransitionCause,
};
use cadence_sdk::{
    feed, ChannelSink, Command, FeedError, FrameClock, ManualClock, Session, SessionBuilder,
};
use cadence_telemetry::ChannelTelemetrySink;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn quiet_session(config: SessionConfig) -> (Session, Receiver<FrameEvent>, Receiver<TelemetryEvent>) {
    let (sink, frames) = ChannelSink::unbounded();
    let (telemetry, events) = ChannelTelemetrySink::unbounded();
    let session = SessionBuilder::new(config, sink)
        .telemetry_sink(telemetry)
        .build()
        .unwrap();
    (session, frames, events)
}

fn buffered_config(streams: &[&str]) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.emitter.queue_capacity = 512;
    config.streams = streams.iter().map(|id| StreamConfig::new(*id)).collect();
    config
}

#[test]
fn test_low_battery_forces_low_on_the_next_tick_until_cleared() {
    let (mut session, _frames, _events) = quiet_session(SessionConfig::default());

    for _ in 0..50 {
        let outcome = session.run_tick();
        assert_eq!(outcome.quality, QualityLevel::High);
        assert!(outcome.transition.is_none());
    }

    session
        .commands()
        .push_device(DeviceTelemetry::with_battery(8.0))
        .unwrap();
    let forced = session.run_tick();
    assert_eq!(forced.tick_id, 50);
    let transition = forced.transition.unwrap();
    assert_eq!(transition.from, QualityLevel::High);
    assert_eq!(transition.to, QualityLevel::Low);
    assert_eq!(transition.cause, TransitionCause::BatteryLow);
    assert_eq!(session.state().quality(), QualityLevel::Low);

    // Above the forcing threshold but below the clear threshold: still forced.
    session
        .commands()
        .push_device(DeviceTelemetry::with_battery(12.0))
        .unwrap();
    for _ in 0..100 {
        let outcome = session.run_tick();
        assert_eq!(outcome.quality, QualityLevel::Low);
        assert!(outcome.transition.is_none());
    }

    session
        .commands()
        .push_device(DeviceTelemetry::with_battery(16.0))
        .unwrap();
    let mut promotion = None;
    for _ in 0..60 {
        if let Some(transition) = session.run_tick().transition {
            promotion = Some(transition);
            break;
        }
    }
    let promotion = promotion.unwrap();
    assert_eq!(promotion.to, QualityLevel::Medium);
    assert_eq!(promotion.cause, TransitionCause::SustainedHeadroom);
    // The clearing reading is observed on tick 151; promotion needs 60
    // consecutive healthy ticks from there.
    assert_eq!(promotion.tick_id, 151 + 59);

    session.finish();
}

struct GatedSink {
    entered: Sender<u64>,
    gate: Receiver<()>,
    delivered: Sender<FrameEvent>,
}

impl EventSink for GatedSink {
    fn emit(&mut self, event: FrameEvent) {
        let _ = self.entered.send(event.tick_id);
        if event.tick_id == 0 {
            let _ = self.gate.recv();
        }
        let _ = self.delivered.send(event);
    }
}

#[test]
fn test_blocked_sink_gets_only_the_most_recent_frame() {
    let (entered_tx, entered) = crossbeam_channel::unbounded();
    let (gate_tx, gate) = crossbeam_channel::unbounded();
    let (delivered_tx, delivered) = crossbeam_channel::unbounded();
    let sink = GatedSink {
        entered: entered_tx,
        gate,
        delivered: delivered_tx,
    };
    let (telemetry, _events) = ChannelTelemetrySink::unbounded();
    let mut session = SessionBuilder::new(SessionConfig::default(), sink)
        .telemetry_sink(telemetry)
        .build()
        .unwrap();

    assert!(session.run_tick().dropped_frames.is_empty());
    assert_eq!(entered.recv_timeout(WAIT).unwrap(), 0);

    let mut dropped = Vec::new();
    for _ in 1..=10 {
        let outcome = session.run_tick();
        assert!(!outcome.timing.overrun);
        dropped.extend(outcome.dropped_frames);
    }
    assert_eq!(dropped, (1..10).collect::<Vec<u64>>());

    gate_tx.send(()).unwrap();
    assert_eq!(delivered.recv_timeout(WAIT).unwrap().tick_id, 0);
    assert_eq!(delivered.recv_timeout(WAIT).unwrap().tick_id, 10);

    let summary = session.finish();
    let terminal = delivered.recv_timeout(WAIT).unwrap();
    assert_eq!(terminal.tick_id, 11);
    assert!(terminal.terminal);
    assert_eq!(summary.frames_dropped, 9);
    assert_eq!(summary.frames_emitted, 3);
    assert!(summary.sink_drained);
}

#[test]
fn test_repeated_overruns_throttle_until_reset() {
    let slow = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&slow);
    let (sink, _frames) = ChannelSink::unbounded();
    let (telemetry, _events) = ChannelTelemetrySink::unbounded();
    let mut session = SessionBuilder::new(SessionConfig::default(), sink)
        .telemetry_sink(telemetry)
        .extension(
            "slow",
            move |_view: &TickView| {
                if flag.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(200));
                }
            },
            Some(5.0),
            0.0,
        )
        .build()
        .unwrap();

    assert_eq!(session.run_tick().extensions.overruns(), 1);
    // Still busy with the first invocation.
    assert_eq!(session.run_tick().extensions.overruns(), 1);
    let third = session.run_tick();
    assert_eq!(third.extensions.overruns(), 1);
    assert!(third
        .extensions
        .events
        .iter()
        .any(|e| matches!(e, TelemetryEvent::ExtensionThrottled { consecutive_overruns: 3, .. })));

    for _ in 0..3 {
        let skipped = session.run_tick();
        assert_eq!(skipped.extensions.skipped_throttled, 1);
        assert_eq!(skipped.extensions.dispatched, 0);
    }
    let snapshot = session.state().snapshot().load();
    assert_eq!(snapshot.throttled_extensions.len(), 1);
    assert_eq!(snapshot.throttled_extensions[0].as_str(), "slow");

    slow.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(400));
    session.commands().reset_extension("slow".into()).unwrap();

    let after = session.run_tick();
    assert_eq!(after.extensions.dispatched, 1);
    assert_eq!(after.extensions.overruns(), 0);
    let handle = session.state().guard().handle(&"slow".into()).unwrap();
    assert!(!handle.throttled);
    assert_eq!(handle.consecutive_overruns, 0);

    let summary = session.finish();
    assert!(summary.extensions_abandoned.is_empty());
}

#[test]
fn test_falling_behind_skips_slots_instead_of_bursting() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let (sink, _frames) = ChannelSink::unbounded();
    let (telemetry, _events) = ChannelTelemetrySink::unbounded();
    let mut session = SessionBuilder::new(SessionConfig::default(), sink)
        .clock(clock.clone())
        .telemetry_sink(telemetry)
        .build()
        .unwrap();
    let mut frame_clock = FrameClock::new(clock.clone(), Duration::from_millis(10)).unwrap();

    let first = frame_clock.poll().unwrap();
    session.run_tick();

    // The tick took three and a half intervals.
    clock.advance(Duration::from_millis(35));
    let late = frame_clock.poll().unwrap();
    assert_eq!(late.tick_id, 1);
    assert_eq!(late.skipped, 2);
    assert_eq!(late.lateness(), Duration::from_millis(5));
    session.run_tick();
    assert!(frame_clock.poll().is_none());

    // The next slot is back on the original grid.
    clock.advance(Duration::from_millis(5));
    let next = frame_clock.poll().unwrap();
    assert_eq!(next.scheduled, first.scheduled + Duration::from_millis(40));
    assert_eq!(next.lateness(), Duration::ZERO);

    session.finish();
}

#[test]
fn test_identical_streams_have_zero_interference() {
    let (mut session, frames, _events) = quiet_session(buffered_config(&["a", "b"]));
    let a = session.feed(&StreamId::new("a")).unwrap();
    let b = session.feed(&StreamId::new("b")).unwrap();

    for tick in 0..12u64 {
        for n in 0..3 {
            let seq = tick * 3 + n;
            let delay = Duration::from_millis(10 + (seq % 4) * 5);
            let entropy = 1.0 + (seq % 3) as f32;
            a.push_token(seq, delay, entropy).unwrap();
            b.push_token(seq, delay, entropy).unwrap();
        }
        session.run_tick();
    }
    session.finish();

    let frames: Vec<FrameEvent> = frames.try_iter().collect();
    let fused: Vec<&FrameEvent> = frames
        .iter()
        .filter(|f| !f.terminal && f.active_stream_count == 2)
        .collect();
    assert!(!fused.is_empty());
    for frame in fused {
        assert_eq!(frame.interference_score, Some(0.0));
        assert_relative_eq!(frame.streams[&StreamId::new("a")], frame.streams[&StreamId::new("b")]);
    }
}

#[test]
fn test_raw_add_stream_with_bad_weight_is_ignored() {
    let (mut session, frames, _events) = quiet_session(buffered_config(&["a"]));
    let a = session.feed(&StreamId::new("a")).unwrap();

    let (bad, receiver) = feed::channel(StreamId::new("bad"), 8);
    session
        .commands()
        .send(Command::AddStream {
            config: StreamConfig::new("bad").with_weight(f32::NAN),
            feed: receiver,
        })
        .unwrap();
    a.push_token(0, Duration::from_millis(20), 1.0).unwrap();
    session.run_tick();

    assert_eq!(session.state().stream_ids().count(), 1);
    assert!(matches!(
        bad.push_token(0, Duration::from_millis(20), 1.0),
        Err(FeedError::Closed(_))
    ));
    a.push_token(1, Duration::from_millis(20), 1.0).unwrap();
    session.run_tick();
    session.finish();

    let frames: Vec<FrameEvent> = frames.try_iter().collect();
    assert!(frames.iter().all(|f| f.total_energy.is_finite()));
    assert!(frames.iter().all(|f| !f.streams.contains_key(&StreamId::new("bad"))));
}

#[test]
fn test_out_of_order_samples_are_dropped_and_reported() {
    let (mut session, _frames, events) = quiet_session(buffered_config(&["a"]));
    let a = session.feed(&StreamId::new("a")).unwrap();

    a.push_token(5, Duration::from_millis(20), 1.0).unwrap();
    a.push_token(3, Duration::from_millis(20), 1.0).unwrap();
    a.push_token(6, Duration::from_millis(20), 1.0).unwrap();
    session.run_tick();
    let summary = session.finish();
    assert_eq!(summary.samples_dropped, 1);

    let events: Vec<TelemetryEvent> = events.try_iter().collect();
    assert!(matches!(events.first(), Some(TelemetryEvent::SessionStarted { .. })));
    assert!(matches!(events.last(), Some(TelemetryEvent::SessionStopped { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        TelemetryEvent::SampleDiscarded {
            sequence_no: 3,
            last_accepted: Some(5),
            ..
        }
    )));
}

#[test]
fn test_stalled_stream_decays_then_goes_idle() {
    let mut config = buffered_config(&["a"]);
    config.energy.idle_after_stalled_ticks = 5;
    let (mut session, frames, _events) = quiet_session(config);
    let a = session.feed(&StreamId::new("a")).unwrap();

    for seq in 0..4 {
        a.push_token(seq, Duration::from_millis(15), 0.5).unwrap();
    }
    for _ in 0..8 {
        session.run_tick();
    }
    session.finish();

    let frames: Vec<FrameEvent> = frames.try_iter().filter(|f| !f.terminal).collect();
    assert_eq!(frames.len(), 8);
    let values: Vec<f32> = frames.iter().map(|f| f.streams[&StreamId::new("a")]).collect();
    assert!(values[0] > 0.0);
    for pair in values.windows(2) {
        assert!(pair[1] < pair[0], "energy must decay strictly: {values:?}");
    }
    assert_relative_eq!(values[1], values[0] * 0.85, epsilon = 1e-5);
    assert_eq!(frames[1].active_stream_count, 1);
    assert_eq!(frames[7].active_stream_count, 0);
}

#[test]
fn test_live_session_ends_with_one_terminal_frame() {
    let mut config = buffered_config(&["model-a"]);
    config.clock.tick_interval_ms = 5.0;
    let (sink, frames) = ChannelSink::unbounded();
    let (telemetry, _events) = ChannelTelemetrySink::unbounded();
    let mut handle = SessionBuilder::new(config, sink)
        .telemetry_sink(telemetry)
        .build()
        .unwrap()
        .spawn()
        .unwrap();

    let feed = handle.feed(&StreamId::new("model-a")).unwrap();
    let producer = thread::spawn(move || {
        for seq in 0..30 {
            let _ = feed.push_token(seq, Duration::from_millis(12), 2.0);
            thread::sleep(Duration::from_millis(4));
        }
    });
    let late = handle.add_stream(StreamConfig::new("model-b")).unwrap();
    late.push_token(0, Duration::from_millis(12), 2.0).unwrap();
    producer.join().unwrap();
    assert!(handle.is_running());

    let stopping = Instant::now();
    let summary = handle.stop().unwrap();
    assert!(stopping.elapsed() < WAIT);

    let frames: Vec<FrameEvent> = frames.try_iter().collect();
    let last = frames.last().unwrap();
    assert!(last.terminal);
    assert_eq!(frames.iter().filter(|f| f.terminal).count(), 1);
    assert_eq!(last.tick_id + 1, summary.ticks);
    assert!(frames.windows(2).all(|w| w[0].tick_id < w[1].tick_id));
    assert!(frames
        .iter()
        .any(|f| f.streams.get(&StreamId::new("model-a")).is_some_and(|v| *v > 0.0)));
    assert!(last.streams.contains_key(&StreamId::new("model-b")));
}
