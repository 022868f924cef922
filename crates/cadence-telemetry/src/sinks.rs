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

//! Built-in telemetry sinks.

use cadence_core::telemetry::{TelemetryEvent, TelemetrySink};
use crossbeam_channel::{Receiver, Sender};

/// Writes every event to the `log` facade.
///
/// Reports are serialized to JSON at `info`; anomalies are logged at the
/// level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetrySink;

impl TelemetrySink for LogTelemetrySink {
    fn record(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::SessionStarted {
                session_id,
                quality_level,
            } => log::info!("Telemetry: session {session_id} started at {quality_level}"),
            TelemetryEvent::TickTimed(timing) => log::trace!(
                "Telemetry: tick {} took {:.3}ms of {:.3}ms",
                timing.tick_id,
                timing.consumed_ms,
                timing.nominal_ms
            ),
            TelemetryEvent::QualityChanged(transition) => log::info!(
                "Telemetry: quality {} -> {} at tick {} ({})",
                transition.from,
                transition.to,
                transition.tick_id,
                transition.cause
            ),
            TelemetryEvent::ExtensionOverrun {
                tick_id,
                extension,
                duration_ms,
                budget_ms,
                abandoned,
            } => log::warn!(
                "Telemetry: extension '{extension}' overran at tick {tick_id}: {duration_ms:.3}ms of {budget_ms:.3}ms{}",
                if *abandoned { " (abandoned)" } else { "" }
            ),
            TelemetryEvent::ExtensionThrottled {
                tick_id,
                extension,
                consecutive_overruns,
            } => log::error!(
                "Telemetry: extension '{extension}' throttled at tick {tick_id} after {consecutive_overruns} overruns"
            ),
            TelemetryEvent::ExtensionFailed {
                tick_id,
                extension,
                reason,
            } => log::error!("Telemetry: extension '{extension}' failed at tick {tick_id}: {reason}"),
            TelemetryEvent::FrameDropped { tick_id } => {
                log::debug!("Telemetry: frame {tick_id} dropped")
            }
            TelemetryEvent::SampleDiscarded {
                stream,
                sequence_no,
                last_accepted,
            } => log::debug!(
                "Telemetry: sample {sequence_no} of '{stream}' discarded (last accepted {last_accepted:?})"
            ),
            TelemetryEvent::Report(report) => match serde_json::to_string(report) {
                Ok(json) => log::info!("Telemetry: report {json}"),
                Err(e) => log::warn!("Telemetry: failed to serialize report: {e}"),
            },
            TelemetryEvent::SessionStopped {
                session_id,
                tick_id,
            } => log::info!("Telemetry: session {session_id} stopped at tick {tick_id}"),
        }
    }
}

/// Forwards every event over a channel.
#[derive(Debug, Clone)]
pub struct ChannelTelemetrySink {
    sender: Sender<TelemetryEvent>,
}

impl ChannelTelemetrySink {
    /// Wraps an existing sender.
    pub fn new(sender: Sender<TelemetryEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sink and the receiving end of its unbounded channel.
    pub fn unbounded() -> (Self, Receiver<TelemetryEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl TelemetrySink for ChannelTelemetrySink {
    fn record(&mut self, event: &TelemetryEvent) {
        // The receiver going away only means nobody is listening anymore.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::SessionId;

    #[test]
    fn test_channel_sink_forwards() {
        let (mut sink, events) = ChannelTelemetrySink::unbounded();
        sink.record(&TelemetryEvent::FrameDropped { tick_id: 4 });
        assert_eq!(
            events.try_recv().unwrap(),
            TelemetryEvent::FrameDropped { tick_id: 4 }
        );
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (mut sink, events) = ChannelTelemetrySink::unbounded();
        drop(events);
        sink.record(&TelemetryEvent::FrameDropped { tick_id: 4 });
    }

    #[test]
    fn test_log_sink_accepts_every_variant() {
        let mut sink = LogTelemetrySink;
        sink.record(&TelemetryEvent::SessionStopped {
            session_id: SessionId::new(),
            tick_id: 9,
        });
        sink.record(&TelemetryEvent::ExtensionFailed {
            tick_id: 1,
            extension: cadence_core::ExtensionId::new("x"),
            reason: "panicked".into(),
        });
    }
}
