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

//! # Cadence Lanes
//!
//! The per-tick hot path: turning buffered token samples into per-stream
//! energy, then fusing the streams into one frame. Nothing here performs
//! I/O, spawns threads, or allocates beyond bounded rolling windows.

#![warn(missing_docs)]

pub mod energy_lane;
pub mod fusion_lane;

pub use energy_lane::{CalculatorOutput, DiscardedSample, TokenEnergyCalculator};
pub use fusion_lane::{interference_score, StreamCoordinator};
