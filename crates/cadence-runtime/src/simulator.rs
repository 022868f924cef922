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

//! Simulated inference streams.
//!
//! Each stream emits tokens with a slowly drifting speed plus jitter, which
//! is enough to exercise every stage of the pipeline without a model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Token timing of one simulated stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProfile {
    /// Mean inter-token delay in milliseconds.
    pub base_delay_ms: f32,
    /// Relative jitter applied to each delay, in `[0, 1)`.
    pub jitter: f32,
    /// Mean token entropy in nats.
    pub base_entropy: f32,
}

impl StreamProfile {
    /// Draws a plausible profile.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            base_delay_ms: rng.gen_range(15.0..60.0),
            jitter: rng.gen_range(0.1..0.4),
            base_entropy: rng.gen_range(0.5..3.0),
        }
    }
}

/// A token source following a [`StreamProfile`].
#[derive(Debug)]
pub struct SimulatedStream {
    profile: StreamProfile,
    rng: StdRng,
    next_sequence: u64,
    phase: f32,
}

impl SimulatedStream {
    /// Creates a stream whose randomness is fully determined by `seed`.
    pub fn new(profile: StreamProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
            next_sequence: 0,
            phase: 0.0,
        }
    }

    /// Produces the next token as `(sequence_no, inter_token_delay, entropy)`.
    pub fn next_token(&mut self) -> (u64, Duration, f32) {
        self.phase += 0.05;
        let drift = 1.0 + 0.3 * self.phase.sin();
        let jitter = self.profile.jitter;
        let noise = 1.0 + self.rng.gen_range(-jitter..=jitter);
        let delay_ms = (self.profile.base_delay_ms * drift * noise).max(1.0);
        let entropy = (self.profile.base_entropy + self.rng.gen_range(-0.5..=0.5)).max(0.0);

        let sequence_no = self.next_sequence;
        self.next_sequence += 1;
        (
            sequence_no,
            Duration::from_secs_f32(delay_ms / 1000.0),
            entropy,
        )
    }
}
