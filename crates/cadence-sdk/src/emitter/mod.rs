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

//! Off-thread delivery of frames to the [`EventSink`].
//!
//! The tick thread pushes into a [`queue::FrameQueue`]; a worker thread pops
//! frames and hands them to the sink. A slow sink therefore never delays a
//! tick: while it blocks, newer frames replace older unsent ones.

pub(crate) mod queue;

use cadence_core::{EventSink, FrameEvent, StartupError};
use cadence_telemetry::PipelineMetrics;
use crossbeam_channel::Receiver;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) use queue::FrameQueue;

/// The worker delivering frames to the sink.
#[derive(Debug)]
pub(crate) struct EmitterWorker {
    handle: Option<JoinHandle<()>>,
}

impl EmitterWorker {
    /// Spawns the worker and returns it with the queue feeding it.
    pub(crate) fn spawn(
        mut sink: Box<dyn EventSink>,
        capacity: usize,
        metrics: PipelineMetrics,
    ) -> Result<(Self, FrameQueue), StartupError> {
        let (queue, receiver) = queue::bounded(capacity);
        let name = "cadence-emitter".to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || deliver(sink.as_mut(), &receiver, &metrics))
            .map_err(|source| StartupError::WorkerSpawn { name, source })?;
        Ok((
            Self {
                handle: Some(handle),
            },
            queue,
        ))
    }

    /// Waits until `deadline` for the worker to deliver the terminal frame
    /// and exit. Returns `false` if it is still blocked in the sink.
    pub(crate) fn join_until(&mut self, deadline: Instant) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("Emitter: sink still busy at shutdown, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if handle.join().is_err() {
            log::error!("Emitter: sink worker panicked");
        }
        true
    }
}

fn deliver(sink: &mut dyn EventSink, receiver: &Receiver<FrameEvent>, metrics: &PipelineMetrics) {
    for frame in receiver.iter() {
        let terminal = frame.terminal;
        sink.emit(frame);
        metrics.frame_emitted();
        if terminal {
            break;
        }
    }
    sink.flush();
    log::debug!("Emitter: worker finished");
}
