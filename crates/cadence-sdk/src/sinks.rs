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

//! Built-in event sinks.

use cadence_core::{EventSink, FrameEvent};
use crossbeam_channel::{Receiver, Sender};
use std::io::{self, Write};

/// Writes each frame as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_frame(&mut self, event: &FrameEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")
    }
}

impl JsonLinesSink<io::Stdout> {
    /// A sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: FrameEvent) {
        if let Err(e) = self.write_frame(&event) {
            log::warn!("JsonLinesSink: failed to write frame {}: {e}", event.tick_id);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("JsonLinesSink: flush failed: {e}");
        }
    }
}

/// Forwards every frame over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<FrameEvent>,
}

impl ChannelSink {
    /// Wraps an existing sender.
    pub fn new(sender: Sender<FrameEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sink and the receiving end of its unbounded channel.
    pub fn unbounded() -> (Self, Receiver<FrameEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: FrameEvent) {
        let _ = self.sender.send(event);
    }
}
