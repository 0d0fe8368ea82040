//! Timeframe types for multi-timeframe delta derivation.
//!
//! The whole engine is bucket-aligned at 5-minute resolution: every
//! timeframe is expressed as a number of 5-minute buckets between the two
//! series points its delta is computed from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported derivation timeframes.
///
/// Ordered from shortest to longest for iteration purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    /// One bucket back (execution timing, scalp detection)
    M5,
    /// Three buckets back (swing/build detection)
    M15,
    /// Six buckets back
    M30,
    /// Twelve buckets back (structural levels, swing bias)
    H1,
    /// Forty-eight buckets back (macro regime, build bias)
    H4,
}

impl Timeframe {
    /// All timeframes in ascending order (shortest to longest).
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
    ];

    /// Wire / query-string label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }

    /// Parse from a label such as `"15m"` or `"4h"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            _ => None,
        }
    }

    /// Number of 5-minute buckets between the two points of this delta.
    #[must_use]
    pub const fn steps(&self) -> usize {
        match self {
            Self::M5 => 1,
            Self::M15 => 3,
            Self::M30 => 6,
            Self::H1 => 12,
            Self::H4 => 48,
        }
    }

    /// Minimum series length before the delta leaves warmup.
    #[must_use]
    pub const fn min_points(&self) -> usize {
        self.steps() + 1
    }

    /// Duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.steps() as i64 * 300_000
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
