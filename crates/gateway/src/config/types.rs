use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::TradeMode;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub app: AppConfig,
    pub symbols: SymbolsConfig,
    pub gating: GatingConfig,
    pub leverage: LeverageConfig,
    pub alerting: AlertingConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

// ---------------------------------------------------------------------------
// symbols.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsConfig {
    /// USDT-perpetual symbols evaluated when a request carries no
    /// `symbols=` override, e.g. `["BTCUSDT", "ETHUSDT"]`.
    pub default_symbols: Vec<String>,
}

// ---------------------------------------------------------------------------
// gating.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GatingConfig {
    pub cooldown_minutes: u64,
    pub default_modes: Vec<TradeMode>,
    pub default_risk_profile: String,
    /// Detection: minimum |5m priceΔ%| for momentum_confirm.
    pub momentum_min: Decimal,
    /// Detection + scalp OI confirm: minimum oiΔ% for positioning_shock.
    pub shock_oi_min: Decimal,
    /// Detection: minimum |priceΔ%| for positioning_shock.
    pub shock_price_min: Decimal,
    /// Structural edge band as a fraction of the 1h range.
    pub edge_pct_1h: Decimal,
    /// Swing/build OI context floor (counter-trend rejection).
    pub swing_min_oi_pct: Decimal,
    /// Swing/build reversal micro-confirm on 5m.
    pub swing_reversal_min_5m: Decimal,
    /// Series points scanned for scalp sweep patterns.
    pub scalp_sweep_lookback: usize,
    /// Bounded parallelism across symbols within one invocation.
    pub max_concurrency: usize,
    #[serde(rename = "macro")]
    pub macro_filter: MacroConfig,
    pub regime: RegimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacroConfig {
    pub enabled: bool,
    pub btc_symbol: String,
    /// 4h priceΔ% at or above which BTC counts as expanding.
    pub price_min_4h: Decimal,
    /// 4h oiΔ% at or above which BTC counts as expanding.
    pub oi_min_4h: Decimal,
    pub block_shorts: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegimeConfig {
    pub enabled: bool,
    /// Contraction: 4h |priceΔ%| strictly below this…
    pub contraction_price_max: Decimal,
    /// …while 4h oiΔ% is at or below this (strongly negative).
    pub contraction_oi_max: Decimal,
    /// Band multiplier applied under contraction.
    pub band_widen_factor: Decimal,
    /// Opposite strong expansion demotes a strong B1 result.
    pub expansion_price_min: Decimal,
    pub expansion_oi_min: Decimal,
}

// ---------------------------------------------------------------------------
// leverage.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageConfig {
    pub profiles: HashMap<String, RiskProfile>,
    /// |oiΔ%| above which the soft / hard instability multipliers apply.
    pub instability_soft_pct: Decimal,
    pub instability_hard_pct: Decimal,
    /// |funding rate| above which the soft / hard funding multipliers apply.
    pub funding_soft: Decimal,
    pub funding_hard: Decimal,
    pub soft_multiplier: Decimal,
    pub hard_multiplier: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskProfile {
    pub risk_budget_pct: Decimal,
    pub max_cap: u32,
}

// ---------------------------------------------------------------------------
// alerting.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    pub heartbeat_key: String,
    pub heartbeat_ttl_seconds: u64,
    /// Base URL of the drilldown dashboard linked at the end of messages.
    pub drilldown_base_url: String,
    /// Transport hard cap; messages are truncated above this.
    pub max_message_chars: usize,
    pub telegram_enabled: bool,
}
