pub mod market;
pub mod signal;
pub mod timeframe;

pub use market::{
    bucket_of, classify, DeltaRecord, FlowState, Lean, LevelsRecord, SeriesPoint, SnapshotPoint,
    BUCKET_MS, LEVELS_1H_LOOKBACK, LEVELS_4H_LOOKBACK, SERIES_CAP,
};
pub use signal::{
    B1Kind, B1Result, Candidate, ExecReason, Grade, LeverageBand, MacroAnalysis, SkipReason,
    SourceCounters, TradeFrame, TradeMode, TriggerKind,
};
pub use timeframe::Timeframe;
