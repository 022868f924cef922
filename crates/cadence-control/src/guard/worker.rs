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

//! A dedicated thread per extension.
//!
//! The tick loop talks to a worker only through bounded channels, so a
//! misbehaving extension can be abandoned without ever blocking the loop.

use cadence_core::extension::{Extension, ExtensionId, TickView};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One invocation request.
pub(crate) struct Job {
    pub tick_id: u64,
    pub view: Arc<TickView>,
}

/// The outcome of one invocation, reported by the worker.
#[derive(Debug)]
pub(crate) enum Completion {
    Finished { tick_id: u64, duration: Duration },
    Panicked { tick_id: u64, reason: String },
}

/// An invocation the guard stopped waiting for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlight {
    pub tick_id: u64,
    pub dispatched_at: Instant,
    /// Set once the invocation has been charged as an overrun, so its late
    /// completion is not charged a second time.
    pub overrun_counted: bool,
}

pub(crate) struct ExtensionWorker {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Completion>,
    handle: Option<JoinHandle<()>>,
    pub in_flight: Option<InFlight>,
}

impl ExtensionWorker {
    pub fn spawn(
        id: &ExtensionId,
        mut extension: Box<dyn Extension>,
        capacity: usize,
    ) -> io::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(capacity);
        let (done_tx, done_rx) = crossbeam_channel::bounded(capacity);
        let name = id.to_string();

        let handle = thread::Builder::new()
            .name(format!("cadence-ext-{name}"))
            .spawn(move || {
                log::debug!("Guard: worker for '{name}' started");
                for job in job_rx.iter() {
                    let started = Instant::now();
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| extension.on_tick(&job.view)));
                    let completion = match result {
                        Ok(()) => Completion::Finished {
                            tick_id: job.tick_id,
                            duration: started.elapsed(),
                        },
                        Err(payload) => Completion::Panicked {
                            tick_id: job.tick_id,
                            reason: panic_reason(payload.as_ref()),
                        },
                    };
                    if done_tx.send(completion).is_err() {
                        break;
                    }
                }
                log::debug!("Guard: worker for '{name}' stopped");
            })?;

        Ok(Self {
            job_tx: Some(job_tx),
            done_rx,
            handle: Some(handle),
            in_flight: None,
        })
    }

    /// Queues a job without blocking.
    pub fn dispatch(&self, job: Job) -> Result<(), TrySendError<Job>> {
        match &self.job_tx {
            Some(tx) => tx.try_send(job),
            None => Err(TrySendError::Disconnected(job)),
        }
    }

    /// Waits at most `timeout` for the next completion.
    pub fn wait(&self, timeout: Duration) -> Result<Completion, RecvTimeoutError> {
        self.done_rx.recv_timeout(timeout)
    }

    /// Takes a completion that is already available.
    pub fn try_completion(&self) -> Result<Completion, TryRecvError> {
        self.done_rx.try_recv()
    }

    /// Stops accepting jobs. The thread exits after its current invocation.
    pub fn close(&mut self) {
        self.job_tx = None;
    }

    /// Waits until `deadline` for the thread to exit, then joins it.
    ///
    /// Returns `false` if the thread is still running at the deadline; it is
    /// then detached.
    pub fn join_until(mut self, deadline: Instant) -> bool {
        self.close();
        loop {
            match self.done_rx.recv_deadline(deadline) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                    return true;
                }
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "extension panicked".to_string()
    }
}
