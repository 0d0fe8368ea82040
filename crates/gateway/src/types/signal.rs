//! Trading modes, gate outcomes and the candidate emitted by the
//! evaluation pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::market::{DeltaRecord, Lean, LevelsRecord};
use super::timeframe::Timeframe;

/// User-selectable trading mode.
///
/// Ordered by evaluation priority — when several modes are enabled the first
/// one whose pipeline passes wins and later modes are not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    Scalp,
    Swing,
    Build,
}

impl TradeMode {
    /// All modes in priority order.
    pub const ALL: [TradeMode; 3] = [TradeMode::Scalp, TradeMode::Swing, TradeMode::Build];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scalp => "scalp",
            Self::Swing => "swing",
            Self::Build => "build",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scalp" => Some(Self::Scalp),
            "swing" => Some(Self::Swing),
            "build" => Some(Self::Build),
            _ => None,
        }
    }

    /// Timeframe whose state drives the detection gate for this mode.
    #[must_use]
    pub const fn detection_timeframe(&self) -> Timeframe {
        match self {
            Self::Scalp => Timeframe::M5,
            Self::Swing | Self::Build => Timeframe::M15,
        }
    }

    /// Bias timeframe with fallbacks, highest preference first.
    #[must_use]
    pub const fn bias_timeframes(&self) -> &'static [Timeframe] {
        match self {
            Self::Scalp => &[Timeframe::M5],
            Self::Swing => &[Timeframe::H1, Timeframe::M15, Timeframe::M5],
            Self::Build => &[Timeframe::H4, Timeframe::H1, Timeframe::M15, Timeframe::M5],
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which detection trigger woke the symbol up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    SetupFlip,
    MomentumConfirm,
    PositioningShock,
    /// Detection bypassed with `force=1`.
    Forced,
}

/// Structural-edge (B1) evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum B1Kind {
    AtRangeLow,
    AtRangeHigh,
    BreakAbove,
    BreakBelow,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct B1Result {
    pub valid: bool,
    pub strong: bool,
    pub kind: Option<B1Kind>,
}

impl B1Result {
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            valid: false,
            strong: false,
            kind: None,
        }
    }
}

/// The entry path that validated the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecReason {
    // scalp
    LongBreakout,
    LongSweepReclaim,
    ShortBreakdown,
    ShortSweepReject,
    // swing / build
    LongBreak,
    ShortBreak,
    LongReversal,
    ShortReversal,
}

impl ExecReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LongBreakout => "long_breakout",
            Self::LongSweepReclaim => "long_sweep_reclaim",
            Self::ShortBreakdown => "short_breakdown",
            Self::ShortSweepReject => "short_sweep_reject",
            Self::LongBreak => "long_break",
            Self::ShortBreak => "short_break",
            Self::LongReversal => "long_reversal",
            Self::ShortReversal => "short_reversal",
        }
    }

    /// Reversal-path entries (B1 band + micro-confirm or sweep patterns).
    #[must_use]
    pub const fn is_reversal(&self) -> bool {
        matches!(
            self,
            Self::LongSweepReclaim | Self::ShortSweepReject | Self::LongReversal | Self::ShortReversal
        )
    }

    /// Pure break/breakout entries with no reversal confirmation.
    #[must_use]
    pub const fn is_breakout_only(&self) -> bool {
        !self.is_reversal()
    }
}

impl fmt::Display for ExecReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a (symbol × mode) evaluation produced no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SnapshotMissing,
    UnsupportedSymbol,
    NoDetectionTrigger,
    Cooldown,
    MacroBlockBtcBullExpansion,
    WarmupGate1h,
    NeutralBias,
    MissingLevelsOrPrice,
    B1OutOfBand,
    NoPriceTrigger,
    OiNotConfirmed,
    OiCounterTrend,
    StoreError,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotMissing => "snapshot_missing",
            Self::UnsupportedSymbol => "unsupported_symbol",
            Self::NoDetectionTrigger => "no_detection_trigger",
            Self::Cooldown => "cooldown",
            Self::MacroBlockBtcBullExpansion => "macro_block_btc_bull_expansion",
            Self::WarmupGate1h => "warmup_gate_1h",
            Self::NeutralBias => "neutral_bias",
            Self::MissingLevelsOrPrice => "missing_levels_or_price",
            Self::B1OutOfBand => "b1_out_of_band",
            Self::NoPriceTrigger => "no_price_trigger",
            Self::OiNotConfirmed => "oi_not_confirmed",
            Self::OiCounterTrend => "oi_counter_trend",
            Self::StoreError => "store_error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mechanical confidence grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

/// Advisory leverage band — copy-only, never gates.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LeverageBand {
    pub low: u32,
    pub high: u32,
}

/// Copy-only trade framing levels rendered alongside a candidate.
#[derive(Debug, Clone, Serialize)]
pub struct TradeFrame {
    #[serde(with = "rust_decimal::serde::str")]
    pub zone_from: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub zone_to: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub take_profit: Decimal,
}

/// A fully validated entry candidate for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub symbol: String,
    pub inst: String,
    pub mode: TradeMode,
    pub bias: Lean,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub trigger: TriggerKind,
    pub exec_reason: ExecReason,
    pub b1: B1Result,
    pub levels_1h: LevelsRecord,
    pub deltas: HashMap<Timeframe, DeltaRecord>,
    pub grade: Grade,
    pub leverage: Option<LeverageBand>,
    pub frame: Option<TradeFrame>,
}

/// BTC 4h regime snapshot driving the macro gate.
#[derive(Debug, Clone, Serialize)]
pub struct MacroAnalysis {
    pub enabled: bool,
    pub available: bool,
    pub bull_expansion: bool,
    pub lean_4h: Lean,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub price_change_pct_4h: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub oi_change_pct_4h: Option<Decimal>,
}

impl MacroAnalysis {
    /// Analysis for a disabled or unavailable macro gate — never blocks.
    #[must_use]
    pub fn inactive(enabled: bool) -> Self {
        Self {
            enabled,
            available: false,
            bull_expansion: false,
            lean_4h: Lean::Neutral,
            price_change_pct_4h: None,
            oi_change_pct_4h: None,
        }
    }
}

/// Proof of the derivation engine's data source for one invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceCounters {
    pub snapshot_hits: u64,
    pub snapshot_misses: u64,
    pub market_calls: u64,
}
