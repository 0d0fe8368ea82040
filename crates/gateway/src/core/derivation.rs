//! Derivation engine: maintains the 24 h rolling series of per-bucket
//! points and derives per-timeframe deltas and structural levels.
//!
//! Snapshot-only by contract — this module never calls the market source.
//! [`SourceCounterCells`] records snapshot hits/misses (and a market-call
//! counter that must stay zero) so an invocation can prove where its data
//! came from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::errors::GatewayError;
use crate::store::{keys, KVStore};
use crate::types::{
    bucket_of, classify, DeltaRecord, LevelsRecord, SeriesPoint, SnapshotPoint, SourceCounters,
    Timeframe, LEVELS_1H_LOOKBACK, LEVELS_4H_LOOKBACK, SERIES_CAP,
};

// ═══════════════════════════════════════════════════════════════════════════
// Source counters
// ═══════════════════════════════════════════════════════════════════════════

/// Per-invocation data-source counters, shared across concurrent symbol
/// pipelines.
#[derive(Debug, Default)]
pub struct SourceCounterCells {
    snapshot_hits: AtomicU64,
    snapshot_misses: AtomicU64,
    market_calls: AtomicU64,
}

impl SourceCounterCells {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.snapshot_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.snapshot_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Plain snapshot for the debug payload.
    #[must_use]
    pub fn snapshot(&self) -> SourceCounters {
        SourceCounters {
            snapshot_hits: self.snapshot_hits.load(Ordering::Relaxed),
            snapshot_misses: self.snapshot_misses.load(Ordering::Relaxed),
            market_calls: self.market_calls.load(Ordering::Relaxed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Derivation output
// ═══════════════════════════════════════════════════════════════════════════

/// Everything the gating pipeline needs for one instrument, derived from
/// the stored series in a single trailing read.
#[derive(Debug, Clone)]
pub struct SymbolDerivation {
    pub inst: String,
    pub bucket: i64,
    pub price: Decimal,
    pub funding: Option<Decimal>,
    pub deltas: HashMap<Timeframe, DeltaRecord>,
    pub levels_1h: LevelsRecord,
    pub levels_4h: LevelsRecord,
    /// Trailing series points (newest last) for sweep-pattern lookback.
    pub tail: Vec<SeriesPoint>,
}

impl SymbolDerivation {
    #[must_use]
    pub fn delta(&self, tf: Timeframe) -> &DeltaRecord {
        &self.deltas[&tf]
    }
}

/// Derive deltas and levels for one instrument at `now_ms`.
///
/// Returns `Ok(None)` when the current bucket has no snapshot — the
/// evaluator classifies that symbol as `snapshot_missing`.
///
/// Appends at most one series point per bucket (gated by `lastBucket` and a
/// duplicate-bucket check on the series itself), trims to [`SERIES_CAP`]
/// from the front, and extends series TTLs on append. With `persist` false
/// (dry-run) the appended point exists only in memory: deltas are computed
/// as usual but `series5m` and `lastBucket` stay untouched.
pub async fn derive_symbol(
    store: &dyn KVStore,
    inst: &str,
    now_ms: i64,
    counters: &SourceCounterCells,
    persist: bool,
) -> Result<Option<SymbolDerivation>, GatewayError> {
    let bucket = bucket_of(now_ms);

    // 1. Current snapshot. Absent or unparseable means no derivation.
    let snap_raw = store.get(&keys::snapshot(inst, bucket)).await?;
    let snap: SnapshotPoint = match snap_raw.as_deref().map(serde_json::from_str) {
        Some(Ok(snap)) => {
            counters.record_hit();
            snap
        }
        Some(Err(e)) => {
            warn!(inst, bucket, error = %e, "snapshot unparseable, treating as missing");
            counters.record_miss();
            return Ok(None);
        }
        None => {
            counters.record_miss();
            return Ok(None);
        }
    };

    // 2. Load the series once.
    let mut series: Vec<SeriesPoint> = match store.get(&keys::series(inst)).await? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(inst, error = %e, "series unparseable, rebuilding");
            Vec::new()
        }),
        None => Vec::new(),
    };

    // First write per bucket: the lastBucket gate plus a duplicate-bucket
    // check on the series itself.
    let last_bucket: Option<i64> = store
        .get(&keys::last_bucket(inst))
        .await?
        .and_then(|v| v.parse().ok());

    if last_bucket != Some(bucket) && series.last().map(|p| p.b) != Some(bucket) {
        series.push(SeriesPoint::from_snapshot(bucket, &snap));
        if series.len() > SERIES_CAP {
            let excess = series.len() - SERIES_CAP;
            series.drain(0..excess);
        }

        if persist {
            store
                .put(
                    &keys::series(inst),
                    &serde_json::to_string(&series)?,
                    Some(keys::SERIES_TTL),
                )
                .await?;
            store
                .put(
                    &keys::last_bucket(inst),
                    &bucket.to_string(),
                    Some(keys::SERIES_TTL),
                )
                .await?;
        }

        debug!(inst, bucket, len = series.len(), persist, "series point appended");
    }

    // 3-4. Deltas from the trailing points, one read. Deltas include the
    // current bucket's point.
    let mut deltas = HashMap::with_capacity(Timeframe::ALL.len());
    for tf in Timeframe::ALL {
        deltas.insert(tf, compute_delta(&series, tf));
    }

    // 5. Structural levels over the history before the current point; the
    // current point never belongs to the range it is judged against. Sweep
    // lookback uses the same history.
    let history = &series[..series.len().saturating_sub(1)];
    let levels_1h = compute_levels(history, LEVELS_1H_LOOKBACK);
    let levels_4h = compute_levels(history, LEVELS_4H_LOOKBACK);

    let tail_len = history.len().min(Timeframe::H4.min_points());
    let tail = history[history.len() - tail_len..].to_vec();

    Ok(Some(SymbolDerivation {
        inst: inst.to_string(),
        bucket,
        price: snap.price,
        funding: snap.funding_rate,
        deltas,
        levels_1h,
        levels_4h,
        tail,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════
// Pure computation
// ═══════════════════════════════════════════════════════════════════════════

/// Delta between the newest point and the point `steps` positions earlier.
#[must_use]
pub fn compute_delta(series: &[SeriesPoint], tf: Timeframe) -> DeltaRecord {
    let k = tf.steps();
    if series.len() < tf.min_points() {
        return DeltaRecord::warmup(tf);
    }

    let newest = &series[series.len() - 1];
    let oldest = &series[series.len() - 1 - k];

    let price_change_pct = pct_change(oldest.p, newest.p);
    let oi_change_pct = match (oldest.oi, newest.oi) {
        (Some(o0), Some(o1)) => pct_change(o0, o1),
        _ => None,
    };
    let funding_change = match (oldest.fr, newest.fr) {
        (Some(f0), Some(f1)) => Some(f1 - f0),
        _ => None,
    };

    let (state, lean) = classify(price_change_pct, oi_change_pct);

    DeltaRecord {
        timeframe: tf,
        price_change_pct,
        oi_change_pct,
        funding_change,
        state,
        lean,
        warmup: false,
    }
}

/// Percentage change from `from` to `to`; absent for a non-positive base.
fn pct_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    if from <= Decimal::ZERO {
        return None;
    }
    Some((to - from) / from * dec!(100))
}

/// Structural hi/lo/mid over the trailing `lookback` points.
///
/// Warmup when fewer than `lookback` points exist; extremes are still
/// reported from whatever trailing window is available so forced runs can
/// proceed (and fail explicitly on a degenerate range).
#[must_use]
pub fn compute_levels(series: &[SeriesPoint], lookback: usize) -> LevelsRecord {
    let warmup = series.len() < lookback;
    let window_len = series.len().min(lookback);
    if window_len == 0 {
        return LevelsRecord {
            warmup,
            hi: None,
            lo: None,
            mid: None,
        };
    }

    let window = &series[series.len() - window_len..];
    let mut hi = window[0].p;
    let mut lo = window[0].p;
    for point in &window[1..] {
        if point.p > hi {
            hi = point.p;
        }
        if point.p < lo {
            lo = point.p;
        }
    }

    LevelsRecord {
        warmup,
        hi: Some(hi),
        lo: Some(lo),
        mid: Some((hi + lo) / dec!(2)),
    }
}

/// Min and max price over the trailing `n` points (sweep lookback).
#[must_use]
pub fn recent_extremes(series: &[SeriesPoint], n: usize) -> Option<(Decimal, Decimal)> {
    if series.is_empty() || n == 0 {
        return None;
    }
    let window_len = series.len().min(n);
    let window = &series[series.len() - window_len..];
    let mut min = window[0].p;
    let mut max = window[0].p;
    for point in &window[1..] {
        if point.p < min {
            min = point.p;
        }
        if point.p > max {
            max = point.p;
        }
    }
    Some((min, max))
}

/// Render a price for human-readable output: >= 1000 → 2 dp, >= 1 → 3 dp,
/// else 4 dp.
#[must_use]
pub fn format_price(price: Decimal) -> String {
    let dp: usize = if price >= dec!(1000) {
        2
    } else if price >= dec!(1) {
        3
    } else {
        4
    };
    format!("{price:.dp$}")
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
