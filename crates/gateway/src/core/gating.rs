//! The gating pipeline's individual gates, as pure functions over derived
//! data. The evaluator sequences them; everything here is deterministic and
//! side-effect free, which is what makes the pipeline's state transitions
//! inspectable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{GatingConfig, MacroConfig, RegimeConfig};
use crate::core::derivation::{recent_extremes, SymbolDerivation};
use crate::types::{
    B1Kind, B1Result, DeltaRecord, ExecReason, FlowState, Lean, LevelsRecord, MacroAnalysis,
    SkipReason, Timeframe, TradeMode, TriggerKind,
};

// ═══════════════════════════════════════════════════════════════════════════
// Detection gate
// ═══════════════════════════════════════════════════════════════════════════

/// Evaluate the detection pre-filter for one mode.
///
/// Trigger precedence: setup_flip, then momentum_confirm, then the loosened
/// positioning_shock (OR of its OI and price legs, on either 5m or 15m).
#[must_use]
pub fn detect_trigger(
    d: &SymbolDerivation,
    mode: TradeMode,
    stored_state: Option<FlowState>,
    cfg: &GatingConfig,
) -> Option<TriggerKind> {
    let detection = d.delta(mode.detection_timeframe());

    if let Some(previous) = stored_state {
        if previous != detection.state {
            return Some(TriggerKind::SetupFlip);
        }
    }

    let d5 = d.delta(Timeframe::M5);
    if d5
        .price_change_pct
        .is_some_and(|p| p.abs() >= cfg.momentum_min)
    {
        return Some(TriggerKind::MomentumConfirm);
    }

    for tf in [Timeframe::M5, Timeframe::M15] {
        let delta = d.delta(tf);
        let oi_shock = delta.oi_change_pct.is_some_and(|oi| oi >= cfg.shock_oi_min);
        let price_shock = delta
            .price_change_pct
            .is_some_and(|p| p.abs() >= cfg.shock_price_min);
        if oi_shock || price_shock {
            return Some(TriggerKind::PositioningShock);
        }
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
// Macro (risk) gate
// ═══════════════════════════════════════════════════════════════════════════

/// Build the macro analysis from BTC's 4h delta, if available.
#[must_use]
pub fn compute_macro(btc_4h: Option<&DeltaRecord>, cfg: &MacroConfig) -> MacroAnalysis {
    let Some(delta) = btc_4h else {
        return MacroAnalysis::inactive(cfg.enabled);
    };

    let bull_expansion = delta.lean == Lean::Long
        && delta
            .price_change_pct
            .is_some_and(|p| p >= cfg.price_min_4h)
        && delta.oi_change_pct.is_some_and(|oi| oi >= cfg.oi_min_4h);

    MacroAnalysis {
        enabled: cfg.enabled,
        available: !delta.warmup,
        bull_expansion,
        lean_4h: delta.lean,
        price_change_pct_4h: delta.price_change_pct,
        oi_change_pct_4h: delta.oi_change_pct,
    }
}

/// Whether the macro gate denies this candidate.
///
/// Only one rule exists: BTC in bull expansion blocks shorts on non-BTC
/// symbols. There is no inverse (bear expansion never blocks longs).
#[must_use]
pub fn macro_blocks(
    analysis: &MacroAnalysis,
    symbol: &str,
    bias: Lean,
    cfg: &MacroConfig,
) -> bool {
    cfg.enabled
        && cfg.block_shorts
        && analysis.bull_expansion
        && symbol != cfg.btc_symbol
        && bias == Lean::Short
}

// ═══════════════════════════════════════════════════════════════════════════
// Bias determination
// ═══════════════════════════════════════════════════════════════════════════

/// Mode-specific bias with fallbacks: the first non-neutral lean along the
/// mode's timeframe chain.
#[must_use]
pub fn bias_for_mode(d: &SymbolDerivation, mode: TradeMode) -> Lean {
    for &tf in mode.bias_timeframes() {
        let lean = d.delta(tf).lean;
        if !lean.is_neutral() {
            return lean;
        }
    }
    Lean::Neutral
}

// ═══════════════════════════════════════════════════════════════════════════
// Structural edge (B1)
// ═══════════════════════════════════════════════════════════════════════════

/// Edge-band membership with an explicit band width.
///
/// Symmetric by construction: `in_band(Long, lo, ..)` and
/// `in_band(Short, hi, ..)` always hold, and both hold for both directions
/// when `hi == lo + edge`.
#[must_use]
pub fn in_band(bias: Lean, price: Decimal, lo: Decimal, hi: Decimal, edge: Decimal) -> bool {
    match bias {
        Lean::Long => price <= lo + edge,
        Lean::Short => price >= hi - edge,
        Lean::Neutral => false,
    }
}

/// Evaluate proximity to the structural extreme of the 1h range.
///
/// Passes either in-band near the bias-side level or on a breakout beyond
/// the opposite extreme. Breakouts and inner-half-band proximity are
/// `strong`. `widen` multiplies the band under regime contraction.
#[must_use]
pub fn evaluate_b1(
    bias: Lean,
    price: Decimal,
    levels: &LevelsRecord,
    edge_pct: Decimal,
    widen: Decimal,
) -> B1Result {
    let (Some(hi), Some(lo)) = (levels.hi, levels.lo) else {
        return B1Result::invalid();
    };
    let range = hi - lo;
    if range <= Decimal::ZERO {
        return B1Result::invalid();
    }

    let edge = edge_pct * range * widen;
    let half = edge / dec!(2);

    match bias {
        Lean::Long => {
            if price > hi {
                B1Result {
                    valid: true,
                    strong: true,
                    kind: Some(B1Kind::BreakAbove),
                }
            } else if in_band(Lean::Long, price, lo, hi, edge) {
                B1Result {
                    valid: true,
                    strong: price <= lo + half,
                    kind: Some(B1Kind::AtRangeLow),
                }
            } else {
                B1Result::invalid()
            }
        }
        Lean::Short => {
            if price < lo {
                B1Result {
                    valid: true,
                    strong: true,
                    kind: Some(B1Kind::BreakBelow),
                }
            } else if in_band(Lean::Short, price, lo, hi, edge) {
                B1Result {
                    valid: true,
                    strong: price >= hi - half,
                    kind: Some(B1Kind::AtRangeHigh),
                }
            } else {
                B1Result::invalid()
            }
        }
        Lean::Neutral => B1Result::invalid(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Regime hooks
// ═══════════════════════════════════════════════════════════════════════════

/// Contraction: 4h range shows low absolute price change with strongly
/// negative OI change. Widens the B1 band.
#[must_use]
pub fn regime_contraction(d4h: &DeltaRecord, cfg: &RegimeConfig) -> bool {
    if !cfg.enabled {
        return false;
    }
    let price_quiet = d4h
        .price_change_pct
        .is_some_and(|p| p.abs() < cfg.contraction_price_max);
    let oi_draining = d4h
        .oi_change_pct
        .is_some_and(|oi| oi <= cfg.contraction_oi_max);
    price_quiet && oi_draining
}

/// Strong 4h expansion opposite the bias (e.g. bull expansion against a
/// short). Demotes a strong B1 result to weak.
#[must_use]
pub fn regime_opposite_expansion(bias: Lean, d4h: &DeltaRecord, cfg: &RegimeConfig) -> bool {
    if !cfg.enabled {
        return false;
    }
    let oi_expanding = d4h.oi_change_pct.is_some_and(|oi| oi >= cfg.expansion_oi_min);
    match bias {
        Lean::Short => {
            d4h.lean == Lean::Long
                && d4h
                    .price_change_pct
                    .is_some_and(|p| p >= cfg.expansion_price_min)
                && oi_expanding
        }
        Lean::Long => {
            d4h.lean == Lean::Short
                && d4h
                    .price_change_pct
                    .is_some_and(|p| p <= -cfg.expansion_price_min)
                && oi_expanding
        }
        Lean::Neutral => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-mode entry validity
// ═══════════════════════════════════════════════════════════════════════════

/// Scalp price trigger: breakout beyond the bias-side extreme, or a sweep
/// of the opposite extreme that has been reclaimed.
#[must_use]
pub fn scalp_price_trigger(
    d: &SymbolDerivation,
    bias: Lean,
    hi: Decimal,
    lo: Decimal,
    lookback: usize,
) -> Option<ExecReason> {
    let price = d.price;
    let extremes = recent_extremes(&d.tail, lookback);

    match bias {
        Lean::Long => {
            if price > hi {
                return Some(ExecReason::LongBreakout);
            }
            if let Some((recent_min, _)) = extremes {
                if recent_min < lo && price > lo {
                    return Some(ExecReason::LongSweepReclaim);
                }
            }
            None
        }
        Lean::Short => {
            if price < lo {
                return Some(ExecReason::ShortBreakdown);
            }
            if let Some((_, recent_max)) = extremes {
                if recent_max > hi && price < hi {
                    return Some(ExecReason::ShortSweepReject);
                }
            }
            None
        }
        Lean::Neutral => None,
    }
}

/// Scalp entry: B1 valid, a price trigger, and strict 15m OI confirmation.
pub fn scalp_entry(
    d: &SymbolDerivation,
    bias: Lean,
    b1: &B1Result,
    hi: Decimal,
    lo: Decimal,
    cfg: &GatingConfig,
) -> Result<ExecReason, SkipReason> {
    if !b1.valid {
        return Err(SkipReason::B1OutOfBand);
    }

    let reason = scalp_price_trigger(d, bias, hi, lo, cfg.scalp_sweep_lookback)
        .ok_or(SkipReason::NoPriceTrigger)?;

    let oi15 = d.delta(Timeframe::M15).oi_change_pct;
    if !oi15.is_some_and(|oi| oi >= cfg.shock_oi_min) {
        return Err(SkipReason::OiNotConfirmed);
    }

    Ok(reason)
}

/// Swing / build entry: break path or reversal path, then the OI context
/// constraint (15m OI must not be sharply counter-trend).
pub fn swing_entry(
    d: &SymbolDerivation,
    bias: Lean,
    b1: &B1Result,
    hi: Decimal,
    lo: Decimal,
    cfg: &GatingConfig,
) -> Result<ExecReason, SkipReason> {
    let price = d.price;
    let d5_price = d.delta(Timeframe::M5).price_change_pct;

    let reason = match bias {
        Lean::Long if price > hi => ExecReason::LongBreak,
        Lean::Short if price < lo => ExecReason::ShortBreak,
        Lean::Long | Lean::Short => {
            // Reversal path: strictly in-band (a breakout B1 does not count)
            // plus a 5m micro-confirm in the bias direction.
            let in_band_kind = matches!(b1.kind, Some(B1Kind::AtRangeLow | B1Kind::AtRangeHigh));
            if !(b1.valid && in_band_kind) {
                return Err(SkipReason::B1OutOfBand);
            }
            let confirmed = match bias {
                Lean::Long => d5_price.is_some_and(|p| p >= cfg.swing_reversal_min_5m),
                Lean::Short => d5_price.is_some_and(|p| p <= -cfg.swing_reversal_min_5m),
                Lean::Neutral => false,
            };
            if !confirmed {
                return Err(SkipReason::NoPriceTrigger);
            }
            match bias {
                Lean::Long => ExecReason::LongReversal,
                _ => ExecReason::ShortReversal,
            }
        }
        Lean::Neutral => return Err(SkipReason::NeutralBias),
    };

    if let Some(oi15) = d.delta(Timeframe::M15).oi_change_pct {
        if oi15 < cfg.swing_min_oi_pct {
            return Err(SkipReason::OiCounterTrend);
        }
    }

    Ok(reason)
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
