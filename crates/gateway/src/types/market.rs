//! Market data model: 5-minute buckets, snapshots, rolling series points,
//! per-timeframe deltas and structural levels.
//!
//! Upstream numerics that are missing or fail to parse are stored as `None`,
//! never zero — classification over absent data must return `Unknown`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::timeframe::Timeframe;

/// Width of one series cell in milliseconds.
pub const BUCKET_MS: i64 = 300_000;

/// Maximum retained series length (24 h of 5-minute points).
pub const SERIES_CAP: usize = 288;

/// Series points required for 1h structural levels.
pub const LEVELS_1H_LOOKBACK: usize = 12;

/// Series points required for 4h structural levels.
pub const LEVELS_4H_LOOKBACK: usize = 48;

/// The bucket index of a UTC-millisecond timestamp.
#[must_use]
pub fn bucket_of(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(BUCKET_MS)
}

/// One observation per instrument per bucket, written by the ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPoint {
    pub ts: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub open_interest_contracts: Option<Decimal>,
}

/// One cell of the rolling 24 h series, appended by the derivation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket index.
    pub b: i64,
    pub ts: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub p: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub fr: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub oi: Option<Decimal>,
}

impl SeriesPoint {
    /// Build a series point from a snapshot at the given bucket.
    #[must_use]
    pub fn from_snapshot(bucket: i64, snap: &SnapshotPoint) -> Self {
        Self {
            b: bucket,
            ts: snap.ts,
            p: snap.price,
            fr: snap.funding_rate,
            oi: snap.open_interest_contracts,
        }
    }
}

/// Discrete positioning state derived from price and open-interest deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    LongsOpening,
    ShortsOpening,
    ShortsClosing,
    LongsClosing,
    Unknown,
}

impl FlowState {
    /// Stable string form used for KV persistence of last-observed states.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LongsOpening => "longs_opening",
            Self::ShortsOpening => "shorts_opening",
            Self::ShortsClosing => "shorts_closing",
            Self::LongsClosing => "longs_closing",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the KV string form back. Unrecognized input maps to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "longs_opening" => Self::LongsOpening,
            "shorts_opening" => Self::ShortsOpening,
            "shorts_closing" => Self::ShortsClosing,
            "longs_closing" => Self::LongsClosing,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directional interpretation of a [`FlowState`], used for bias aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lean {
    Long,
    Short,
    Neutral,
}

impl Lean {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Neutral => "neutral",
        }
    }

    #[must_use]
    pub const fn is_neutral(&self) -> bool {
        matches!(self, Self::Neutral)
    }
}

impl fmt::Display for Lean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a (priceΔ%, oiΔ%) pair into a positioning state and lean.
///
/// A missing delta on either side classifies `Unknown`/`Neutral`. A zero
/// price delta matches neither the rising nor the falling row and also
/// classifies `Unknown`.
#[must_use]
pub fn classify(
    price_change_pct: Option<Decimal>,
    oi_change_pct: Option<Decimal>,
) -> (FlowState, Lean) {
    let (price, oi) = match (price_change_pct, oi_change_pct) {
        (Some(p), Some(o)) => (p, o),
        _ => return (FlowState::Unknown, Lean::Neutral),
    };

    if price > Decimal::ZERO && oi > Decimal::ZERO {
        (FlowState::LongsOpening, Lean::Long)
    } else if price < Decimal::ZERO && oi > Decimal::ZERO {
        (FlowState::ShortsOpening, Lean::Short)
    } else if price > Decimal::ZERO {
        (FlowState::ShortsClosing, Lean::Long)
    } else if price < Decimal::ZERO {
        (FlowState::LongsClosing, Lean::Short)
    } else {
        (FlowState::Unknown, Lean::Neutral)
    }
}

/// Derived delta between the newest series point and the point `steps`
/// buckets earlier. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaRecord {
    pub timeframe: Timeframe,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub price_change_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub oi_change_pct: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub funding_change: Option<Decimal>,
    pub state: FlowState,
    pub lean: Lean,
    pub warmup: bool,
}

impl DeltaRecord {
    /// A warmup record carrying no deltas.
    #[must_use]
    pub fn warmup(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            price_change_pct: None,
            oi_change_pct: None,
            funding_change: None,
            state: FlowState::Unknown,
            lean: Lean::Neutral,
            warmup: true,
        }
    }
}

/// Structural hi/lo/mid levels over a trailing window of series points.
#[derive(Debug, Clone, Serialize)]
pub struct LevelsRecord {
    pub warmup: bool,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub hi: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub lo: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub mid: Option<Decimal>,
}

impl LevelsRecord {
    /// Range width, when both extremes are known.
    #[must_use]
    pub fn range(&self) -> Option<Decimal> {
        match (self.hi, self.lo) {
            (Some(hi), Some(lo)) => Some(hi - lo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bucket_alignment() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(299_999), 0);
        assert_eq!(bucket_of(300_000), 1);
        // Every offset inside a bucket lands in the same cell.
        for t in [0i64, 300_000, 1_700_000_100_000 - 1_700_000_100_000 % 300_000] {
            assert_eq!(bucket_of(t), bucket_of(t + 299_999));
        }
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(
            classify(Some(dec!(0.5)), Some(dec!(0.3))),
            (FlowState::LongsOpening, Lean::Long)
        );
        assert_eq!(
            classify(Some(dec!(-0.5)), Some(dec!(0.3))),
            (FlowState::ShortsOpening, Lean::Short)
        );
        assert_eq!(
            classify(Some(dec!(0.5)), Some(dec!(-0.3))),
            (FlowState::ShortsClosing, Lean::Long)
        );
        assert_eq!(
            classify(Some(dec!(0.5)), Some(Decimal::ZERO)),
            (FlowState::ShortsClosing, Lean::Long)
        );
        assert_eq!(
            classify(Some(dec!(-0.5)), Some(dec!(-0.3))),
            (FlowState::LongsClosing, Lean::Short)
        );
    }

    #[test]
    fn test_classify_absent_is_unknown() {
        assert_eq!(classify(None, Some(dec!(1))), (FlowState::Unknown, Lean::Neutral));
        assert_eq!(classify(Some(dec!(1)), None), (FlowState::Unknown, Lean::Neutral));
        assert_eq!(classify(None, None), (FlowState::Unknown, Lean::Neutral));
    }

    #[test]
    fn test_classify_zero_price_is_unknown() {
        assert_eq!(
            classify(Some(Decimal::ZERO), Some(dec!(1))),
            (FlowState::Unknown, Lean::Neutral)
        );
    }

    #[test]
    fn test_flow_state_roundtrip() {
        for state in [
            FlowState::LongsOpening,
            FlowState::ShortsOpening,
            FlowState::ShortsClosing,
            FlowState::LongsClosing,
            FlowState::Unknown,
        ] {
            assert_eq!(FlowState::parse(state.as_str()), state);
        }
        assert_eq!(FlowState::parse("garbage"), FlowState::Unknown);
    }

    #[test]
    fn test_snapshot_optional_fields_deserialize() {
        let raw = r#"{"ts":1700000000000,"price":"1988.00"}"#;
        let snap: SnapshotPoint = serde_json::from_str(raw).unwrap();
        assert_eq!(snap.price, dec!(1988.00));
        assert!(snap.funding_rate.is_none());
        assert!(snap.open_interest_contracts.is_none());
    }

    #[test]
    fn test_levels_range() {
        let levels = LevelsRecord {
            warmup: false,
            hi: Some(dec!(2000)),
            lo: Some(dec!(1940)),
            mid: Some(dec!(1970)),
        };
        assert_eq!(levels.range(), Some(dec!(60)));
    }
}
