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

//! Errors returned by session handles and feeds.
//!
//! None of these stop a running session; they only tell the caller that an
//! input was not accepted.

use thiserror::Error;

/// Why a token sample was not accepted by a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The feed channel is full; the sample was dropped and counted.
    #[error("feed for stream '{0}' is full")]
    Full(String),
    /// The stream was removed or the session stopped.
    #[error("feed for stream '{0}' is closed")]
    Closed(String),
    /// The sample names a different stream than this feed.
    #[error("sample for stream '{found}' pushed into feed '{expected}'")]
    WrongStream {
        /// The feed's stream.
        expected: String,
        /// The sample's stream.
        found: String,
    },
}

/// Why a runtime command was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command channel is full. Commands are drained once per tick.
    #[error("command channel is full")]
    Full,
    /// The session has stopped.
    #[error("session has stopped")]
    SessionClosed,
    /// A stream weight is negative or not finite.
    #[error("stream weight must be finite and non-negative")]
    InvalidWeight,
}

/// A failure while stopping a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The tick thread panicked; the summary is lost.
    #[error("tick thread panicked: {0}")]
    TickThreadPanicked(String),
    /// The session was already stopped through this handle.
    #[error("session already stopped")]
    AlreadyStopped,
}
