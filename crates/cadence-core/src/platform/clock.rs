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

//! The host time source.

use crate::error::StartupError;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time.
///
/// The frame clock schedules ticks on [`now`](Clock::now); emitted frames are
/// stamped with [`unix_millis`](Clock::unix_millis).
pub trait Clock: Send + Sync {
    /// Monotonic time.
    fn now(&self) -> Instant;

    /// Wall-clock time in Unix milliseconds, or `None` if the host cannot
    /// provide it.
    fn unix_millis(&self) -> Option<u64>;

    /// Verifies the clock is usable before a session starts.
    ///
    /// There is no valid cadence without a clock, so a failure here is fatal.
    fn check(&self) -> Result<(), StartupError> {
        let first = self.now();
        let second = self.now();
        if second < first {
            return Err(StartupError::ClockUnavailable(
                "monotonic clock went backwards".into(),
            ));
        }
        match self.unix_millis() {
            Some(0) | None => Err(StartupError::ClockUnavailable(
                "wall clock is unavailable".into(),
            )),
            Some(_) => Ok(()),
        }
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> Option<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenClock;

    impl Clock for BrokenClock {
        fn now(&self) -> Instant {
            Instant::now()
        }
        fn unix_millis(&self) -> Option<u64> {
            None
        }
    }

    #[test]
    fn test_system_clock_check_succeeds() {
        assert!(SystemClock.check().is_ok());
        assert!(SystemClock.unix_millis().unwrap() > 1_600_000_000_000);
    }

    #[test]
    fn test_missing_wall_clock_fails_check() {
        let err = BrokenClock.check().unwrap_err();
        assert!(matches!(err, StartupError::ClockUnavailable(_)));
    }
}
