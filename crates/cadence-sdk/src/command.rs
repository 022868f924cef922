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

//! Runtime commands applied by the tick loop at the start of a tick.

use crate::error::CommandError;
use crate::feed::{self, FeedSender};
use cadence_core::{DeviceTelemetry, Extension, ExtensionId, StreamConfig, StreamId};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt;

/// A change requested while the session runs.
pub enum Command {
    /// Start fusing a new stream fed by `feed`.
    AddStream {
        /// Stream id and weight.
        config: StreamConfig,
        /// The tick-loop end of the stream's feed.
        feed: feed::FeedReceiver,
    },
    /// Stop fusing a stream and close its feed.
    RemoveStream(StreamId),
    /// Register an extension and start its worker.
    RegisterExtension {
        /// Extension id.
        id: ExtensionId,
        /// The extension.
        extension: Box<dyn Extension>,
        /// Budget override, in milliseconds.
        budget_ms: Option<f32>,
        /// Higher runs first within a tick.
        priority: f32,
    },
    /// Remove an extension.
    UnregisterExtension(ExtensionId),
    /// Clear an extension's overrun streak and throttle.
    ResetExtension(ExtensionId),
    /// A device reading pushed by the host.
    Device(DeviceTelemetry),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddStream { config, .. } => f.debug_tuple("AddStream").field(config).finish(),
            Command::RemoveStream(id) => f.debug_tuple("RemoveStream").field(id).finish(),
            Command::RegisterExtension { id, budget_ms, priority, .. } => f
                .debug_struct("RegisterExtension")
                .field("id", id)
                .field("budget_ms", budget_ms)
                .field("priority", priority)
                .finish_non_exhaustive(),
            Command::UnregisterExtension(id) => {
                f.debug_tuple("UnregisterExtension").field(id).finish()
            }
            Command::ResetExtension(id) => f.debug_tuple("ResetExtension").field(id).finish(),
            Command::Device(reading) => f.debug_tuple("Device").field(reading).finish(),
        }
    }
}

/// Creates the bounded command channel of a session.
pub(crate) fn channel(capacity: usize) -> (CommandSender, Receiver<Command>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (CommandSender { sender }, receiver)
}

/// Sends [`Command`]s to a session without blocking. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Queues a raw command.
    pub fn send(&self, command: Command) -> Result<(), CommandError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandError::Full,
            TrySendError::Disconnected(_) => CommandError::SessionClosed,
        })
    }

    /// Adds a stream and returns the feed to push its samples into.
    pub fn add_stream(
        &self,
        config: StreamConfig,
        feed_capacity: usize,
    ) -> Result<FeedSender, CommandError> {
        if !config.has_valid_weight() {
            return Err(CommandError::InvalidWeight);
        }
        let (sender, receiver) = feed::channel(config.id.clone(), feed_capacity);
        self.send(Command::AddStream {
            config,
            feed: receiver,
        })?;
        Ok(sender)
    }

    /// Removes a stream.
    pub fn remove_stream(&self, id: StreamId) -> Result<(), CommandError> {
        self.send(Command::RemoveStream(id))
    }

    /// Registers an extension.
    pub fn register_extension(
        &self,
        id: ExtensionId,
        extension: Box<dyn Extension>,
        budget_ms: Option<f32>,
        priority: f32,
    ) -> Result<(), CommandError> {
        self.send(Command::RegisterExtension {
            id,
            extension,
            budget_ms,
            priority,
        })
    }

    /// Unregisters an extension.
    pub fn unregister_extension(&self, id: ExtensionId) -> Result<(), CommandError> {
        self.send(Command::UnregisterExtension(id))
    }

    /// Resets a throttled extension.
    pub fn reset_extension(&self, id: ExtensionId) -> Result<(), CommandError> {
        self.send(Command::ResetExtension(id))
    }

    /// Pushes a device reading.
    pub fn push_device(&self, reading: DeviceTelemetry) -> Result<(), CommandError> {
        self.send(Command::Device(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_rejects() {
        let (sender, _receiver) = channel(1);
        sender.remove_stream(StreamId::new("a")).unwrap();
        assert_eq!(
            sender.remove_stream(StreamId::new("b")),
            Err(CommandError::Full)
        );
    }

    #[test]
    fn test_closed_session_rejects() {
        let (sender, receiver) = channel(4);
        drop(receiver);
        assert_eq!(
            sender.reset_extension(ExtensionId::new("x")),
            Err(CommandError::SessionClosed)
        );
    }

    #[test]
    fn test_add_stream_hands_back_feed() {
        let (sender, receiver) = channel(4);
        let feed = sender.add_stream(StreamConfig::new("model-a"), 8).unwrap();
        assert_eq!(feed.stream_id().as_str(), "model-a");
        match receiver.try_recv().unwrap() {
            Command::AddStream { config, feed } => {
                assert_eq!(config.id, StreamId::new("model-a"));
                assert_eq!(feed.stream_id(), &config.id);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_add_stream_rejects_bad_weight() {
        let (sender, receiver) = channel(4);
        for weight in [f32::NAN, f32::INFINITY, -1.0] {
            assert_eq!(
                sender
                    .add_stream(StreamConfig::new("a").with_weight(weight), 8)
                    .unwrap_err(),
                CommandError::InvalidWeight
            );
        }
        assert!(receiver.try_recv().is_err());
        assert!(sender.add_stream(StreamConfig::new("a").with_weight(0.0), 8).is_ok());
    }
}
