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

//! The discrete quality level shared by every component of a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much optional computation a session performs per tick.
///
/// The ordering is meaningful: `Low < Medium < High`. Components compare
/// against it to decide whether to run their optional work (e.g. the stream
/// coordinator skips interference analysis below [`QualityLevel::Medium`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum QualityLevel {
    /// Cheapest mode: aggregate math only.
    Low,
    /// Interference analysis enabled.
    Medium,
    /// Full fidelity.
    #[default]
    High,
}

impl QualityLevel {
    /// All levels, lowest first.
    pub const ALL: [QualityLevel; 3] = [QualityLevel::Low, QualityLevel::Medium, QualityLevel::High];

    /// The next level up, or `None` at the top.
    pub fn promoted(self) -> Option<Self> {
        match self {
            QualityLevel::Low => Some(QualityLevel::Medium),
            QualityLevel::Medium => Some(QualityLevel::High),
            QualityLevel::High => None,
        }
    }

    /// The next level down, or `None` at the bottom.
    pub fn demoted(self) -> Option<Self> {
        match self {
            QualityLevel::Low => None,
            QualityLevel::Medium => Some(QualityLevel::Low),
            QualityLevel::High => Some(QualityLevel::Medium),
        }
    }

    /// Compact encoding used by atomic cells and gauges.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes [`as_u8`](Self::as_u8). Out-of-range values saturate to `High`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => QualityLevel::Low,
            1 => QualityLevel::Medium,
            _ => QualityLevel::High,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_ordering() {
        assert!(QualityLevel::Low < QualityLevel::Medium);
        assert!(QualityLevel::Medium < QualityLevel::High);
        assert!(QualityLevel::High >= QualityLevel::Medium);
    }

    #[test]
    fn test_promote_and_demote_saturate() {
        assert_eq!(QualityLevel::High.promoted(), None);
        assert_eq!(QualityLevel::Low.demoted(), None);
        assert_eq!(QualityLevel::Low.promoted(), Some(QualityLevel::Medium));
        assert_eq!(QualityLevel::High.demoted(), Some(QualityLevel::Medium));
    }

    #[test]
    fn test_u8_encoding() {
        for level in QualityLevel::ALL {
            assert_eq!(QualityLevel::from_u8(level.as_u8()), level);
        }
        assert_eq!(QualityLevel::from_u8(200), QualityLevel::High);
    }

    #[test]
    fn test_serializes_as_variant_name() {
        let json = serde_json::to_string(&QualityLevel::Medium).unwrap();
        assert_eq!(json, "\"Medium\"");
    }
}
