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

//! A bounded frame queue that drops the oldest unsent frame when full.

use cadence_core::FrameEvent;
use crossbeam_channel::{Receiver, Sender, TrySendError};

/// The tick-loop end of the emitter channel.
///
/// The tick thread is the only producer, so after evicting one frame there
/// is always room for the new one.
#[derive(Debug)]
pub(crate) struct FrameQueue {
    sender: Sender<FrameEvent>,
    evictor: Receiver<FrameEvent>,
}

/// Creates a queue holding at most `capacity` unsent frames.
pub(crate) fn bounded(capacity: usize) -> (FrameQueue, Receiver<FrameEvent>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (
        FrameQueue {
            sender,
            evictor: receiver.clone(),
        },
        receiver,
    )
}

impl FrameQueue {
    /// Enqueues `frame` without blocking and returns the tick ids of the
    /// frames dropped to make room.
    pub(crate) fn push(&self, frame: FrameEvent) -> Vec<u64> {
        let mut dropped = Vec::new();
        let mut pending = frame;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(frame)) => {
                    if let Ok(oldest) = self.evictor.try_recv() {
                        dropped.push(oldest.tick_id);
                    }
                    pending = frame;
                }
                Err(TrySendError::Disconnected(frame)) => {
                    log::warn!("Emitter: sink worker gone, frame {} lost", frame.tick_id);
                    dropped.push(frame.tick_id);
                    return dropped;
                }
            }
        }
    }

    /// Frames waiting for the sink.
    pub(crate) fn len(&self) -> usize {
        self.sender.len()
    }
}
