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

//! Per-stream token feeds.
//!
//! An inference adapter pushes [`TokenSample`]s into a [`FeedSender`] from
//! its own thread. The tick loop drains the other end without blocking once
//! per tick.

use crate::error::FeedError;
use cadence_core::{StreamId, TokenSample};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Creates a bounded feed for one stream.
pub fn channel(stream_id: StreamId, capacity: usize) -> (FeedSender, FeedReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    let overflow = Arc::new(AtomicU64::new(0));
    (
        FeedSender {
            stream_id: stream_id.clone(),
            sender,
            overflow: Arc::clone(&overflow),
        },
        FeedReceiver {
            stream_id,
            receiver,
            overflow,
            overflow_seen: 0,
        },
    )
}

/// The producer side of a stream feed. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeedSender {
    stream_id: StreamId,
    sender: Sender<TokenSample>,
    overflow: Arc<AtomicU64>,
}

impl FeedSender {
    /// The stream this feed belongs to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Queues a sample without blocking.
    ///
    /// A sample pushed into a full feed is dropped and shows up in the
    /// session's `samples_dropped` counter.
    pub fn push(&self, sample: TokenSample) -> Result<(), FeedError> {
        if sample.stream_id != self.stream_id {
            return Err(FeedError::WrongStream {
                expected: self.stream_id.to_string(),
                found: sample.stream_id.to_string(),
            });
        }
        match self.sender.try_send(sample) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
                Err(FeedError::Full(self.stream_id.to_string()))
            }
            Err(TrySendError::Disconnected(_)) => Err(FeedError::Closed(self.stream_id.to_string())),
        }
    }

    /// Queues a token observed now.
    pub fn push_token(
        &self,
        sequence_no: u64,
        inter_token_delay: Duration,
        token_entropy: f32,
    ) -> Result<(), FeedError> {
        self.push(TokenSample::new(
            self.stream_id.clone(),
            sequence_no,
            inter_token_delay,
            token_entropy,
        ))
    }

    /// Samples waiting to be drained.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

/// The tick-loop side of a stream feed.
#[derive(Debug)]
pub struct FeedReceiver {
    stream_id: StreamId,
    receiver: Receiver<TokenSample>,
    overflow: Arc<AtomicU64>,
    overflow_seen: u64,
}

impl FeedReceiver {
    /// The stream this feed belongs to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Takes at most `max` buffered samples, oldest first.
    pub fn drain(&self, max: usize) -> Vec<TokenSample> {
        self.receiver.try_iter().take(max).collect()
    }

    /// Samples rejected as overflow since the previous call.
    pub fn take_overflow(&mut self) -> u64 {
        let total = self.overflow.load(Ordering::Relaxed);
        let fresh = total.saturating_sub(self.overflow_seen);
        self.overflow_seen = total;
        fresh
    }
}
