pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::TradeMode;

/// Load and merge all config JSON files into a single [`GatewayConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   symbols.json
///   gating.json
///   leverage.json
///   alerting.json
/// ```
///
/// # Environment variable overrides
///
/// The recognized override set is closed:
///
/// | Env Var                        | Config Field                          |
/// |--------------------------------|---------------------------------------|
/// | `COOLDOWN_MINUTES`             | `gating.cooldown_minutes`             |
/// | `DEFAULT_MODE` / `DEFAULT_MODES` | `gating.default_modes`              |
/// | `DEFAULT_RISK_PROFILE`         | `gating.default_risk_profile`         |
/// | `MOMENTUM_MIN`                 | `gating.momentum_min`                 |
/// | `SHOCK_OI_MIN`                 | `gating.shock_oi_min`                 |
/// | `SHOCK_PRICE_MIN`              | `gating.shock_price_min`              |
/// | `EDGE_PCT_1H`                  | `gating.edge_pct_1h`                  |
/// | `SWING_MIN_OI_PCT`             | `gating.swing_min_oi_pct`             |
/// | `SWING_REVERSAL_MIN_5M`        | `gating.swing_reversal_min_5m`        |
/// | `SCALP_SWEEP_LOOKBACK`         | `gating.scalp_sweep_lookback`         |
/// | `MACRO_ENABLED`                | `gating.macro.enabled`                |
/// | `MACRO_BTC_SYMBOL`             | `gating.macro.btc_symbol`             |
/// | `MACRO_BTC_4H_PRICE_MIN`       | `gating.macro.price_min_4h`           |
/// | `MACRO_BTC_4H_OI_MIN`          | `gating.macro.oi_min_4h`              |
/// | `MACRO_BLOCK_SHORTS`           | `gating.macro.block_shorts`           |
/// | `REGIME_ENABLED`               | `gating.regime.enabled`               |
/// | `REGIME_CONTRACTION_PRICE_MAX` | `gating.regime.contraction_price_max` |
/// | `REGIME_CONTRACTION_OI_MAX`    | `gating.regime.contraction_oi_max`    |
/// | `REGIME_BAND_WIDEN_FACTOR`     | `gating.regime.band_widen_factor`     |
/// | `REGIME_EXPANSION_PRICE_MIN`   | `gating.regime.expansion_price_min`   |
/// | `REGIME_EXPANSION_OI_MIN`      | `gating.regime.expansion_oi_min`      |
/// | `LEVERAGE_MAX_CAP`             | every `leverage.profiles[*].max_cap`  |
/// | `LEVERAGE_INSTABILITY_SOFT_PCT`| `leverage.instability_soft_pct`       |
/// | `LEVERAGE_INSTABILITY_HARD_PCT`| `leverage.instability_hard_pct`       |
/// | `LEVERAGE_FUNDING_SOFT`        | `leverage.funding_soft`               |
/// | `LEVERAGE_FUNDING_HARD`        | `leverage.funding_hard`               |
/// | `HEARTBEAT_KEY`                | `alerting.heartbeat_key`              |
/// | `HEARTBEAT_TTL_SECONDS`        | `alerting.heartbeat_ttl_seconds`      |
pub fn load_config(config_dir: &Path) -> Result<GatewayConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let symbols: SymbolsConfig =
        serde_json::from_str(&read("symbols.json")?).context("parsing symbols.json")?;

    let gating: GatingConfig =
        serde_json::from_str(&read("gating.json")?).context("parsing gating.json")?;

    let leverage: LeverageConfig =
        serde_json::from_str(&read("leverage.json")?).context("parsing leverage.json")?;

    let alerting: AlertingConfig =
        serde_json::from_str(&read("alerting.json")?).context("parsing alerting.json")?;

    let mut config = GatewayConfig {
        app,
        symbols,
        gating,
        leverage,
        alerting,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are logged and skipped
/// (the JSON default remains).
fn apply_env_overrides(config: &mut GatewayConfig) {
    // -- Cooldown and modes --------------------------------------------------
    if let Some(val) = env_parse::<u64>("COOLDOWN_MINUTES") {
        info!(val, "env override: COOLDOWN_MINUTES");
        config.gating.cooldown_minutes = val;
    }

    if let Some(modes) = env_modes("DEFAULT_MODES").or_else(|| env_modes("DEFAULT_MODE")) {
        info!(?modes, "env override: default modes");
        config.gating.default_modes = modes;
    }

    if let Some(val) = env_string("DEFAULT_RISK_PROFILE") {
        info!(profile = %val, "env override: DEFAULT_RISK_PROFILE");
        config.gating.default_risk_profile = val;
    }

    // -- Detection / entry thresholds ----------------------------------------
    if let Some(val) = env_decimal("MOMENTUM_MIN") {
        info!(%val, "env override: MOMENTUM_MIN");
        config.gating.momentum_min = val;
    }
    if let Some(val) = env_decimal("SHOCK_OI_MIN") {
        info!(%val, "env override: SHOCK_OI_MIN");
        config.gating.shock_oi_min = val;
    }
    if let Some(val) = env_decimal("SHOCK_PRICE_MIN") {
        info!(%val, "env override: SHOCK_PRICE_MIN");
        config.gating.shock_price_min = val;
    }
    if let Some(val) = env_decimal("EDGE_PCT_1H") {
        info!(%val, "env override: EDGE_PCT_1H");
        config.gating.edge_pct_1h = val;
    }
    if let Some(val) = env_decimal("SWING_MIN_OI_PCT") {
        info!(%val, "env override: SWING_MIN_OI_PCT");
        config.gating.swing_min_oi_pct = val;
    }
    if let Some(val) = env_decimal("SWING_REVERSAL_MIN_5M") {
        info!(%val, "env override: SWING_REVERSAL_MIN_5M");
        config.gating.swing_reversal_min_5m = val;
    }

    if let Some(val) = env_parse::<usize>("SCALP_SWEEP_LOOKBACK") {
        info!(val, "env override: SCALP_SWEEP_LOOKBACK");
        config.gating.scalp_sweep_lookback = val;
    }

    // -- Macro gate ----------------------------------------------------------
    if let Some(val) = env_bool("MACRO_ENABLED") {
        info!(val, "env override: MACRO_ENABLED");
        config.gating.macro_filter.enabled = val;
    }
    if let Some(val) = env_string("MACRO_BTC_SYMBOL") {
        info!(symbol = %val, "env override: MACRO_BTC_SYMBOL");
        config.gating.macro_filter.btc_symbol = val;
    }
    if let Some(val) = env_decimal("MACRO_BTC_4H_PRICE_MIN") {
        info!(%val, "env override: MACRO_BTC_4H_PRICE_MIN");
        config.gating.macro_filter.price_min_4h = val;
    }
    if let Some(val) = env_decimal("MACRO_BTC_4H_OI_MIN") {
        info!(%val, "env override: MACRO_BTC_4H_OI_MIN");
        config.gating.macro_filter.oi_min_4h = val;
    }
    if let Some(val) = env_bool("MACRO_BLOCK_SHORTS") {
        info!(val, "env override: MACRO_BLOCK_SHORTS");
        config.gating.macro_filter.block_shorts = val;
    }

    // -- Regime hooks --------------------------------------------------------
    if let Some(val) = env_bool("REGIME_ENABLED") {
        info!(val, "env override: REGIME_ENABLED");
        config.gating.regime.enabled = val;
    }
    if let Some(val) = env_decimal("REGIME_CONTRACTION_PRICE_MAX") {
        config.gating.regime.contraction_price_max = val;
    }
    if let Some(val) = env_decimal("REGIME_CONTRACTION_OI_MAX") {
        config.gating.regime.contraction_oi_max = val;
    }
    if let Some(val) = env_decimal("REGIME_BAND_WIDEN_FACTOR") {
        config.gating.regime.band_widen_factor = val;
    }
    if let Some(val) = env_decimal("REGIME_EXPANSION_PRICE_MIN") {
        config.gating.regime.expansion_price_min = val;
    }
    if let Some(val) = env_decimal("REGIME_EXPANSION_OI_MIN") {
        config.gating.regime.expansion_oi_min = val;
    }

    // -- Leverage ------------------------------------------------------------
    if let Some(cap) = env_parse::<u32>("LEVERAGE_MAX_CAP") {
        info!(cap, "env override: LEVERAGE_MAX_CAP");
        for profile in config.leverage.profiles.values_mut() {
            profile.max_cap = profile.max_cap.min(cap);
        }
    }
    if let Some(val) = env_decimal("LEVERAGE_INSTABILITY_SOFT_PCT") {
        config.leverage.instability_soft_pct = val;
    }
    if let Some(val) = env_decimal("LEVERAGE_INSTABILITY_HARD_PCT") {
        config.leverage.instability_hard_pct = val;
    }
    if let Some(val) = env_decimal("LEVERAGE_FUNDING_SOFT") {
        config.leverage.funding_soft = val;
    }
    if let Some(val) = env_decimal("LEVERAGE_FUNDING_HARD") {
        config.leverage.funding_hard = val;
    }

    // -- Heartbeat -----------------------------------------------------------
    if let Some(val) = env_string("HEARTBEAT_KEY") {
        info!(key = %val, "env override: HEARTBEAT_KEY");
        config.alerting.heartbeat_key = val;
    }
    if let Some(val) = env_parse::<u64>("HEARTBEAT_TTL_SECONDS") {
        info!(val, "env override: HEARTBEAT_TTL_SECONDS");
        config.alerting.heartbeat_ttl_seconds = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

/// Read a comma-separated mode list; `None` if any entry is unrecognized.
fn env_modes(key: &str) -> Option<Vec<TradeMode>> {
    let raw = env_string(key)?;
    let modes: Option<Vec<TradeMode>> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TradeMode::parse)
        .collect();
    modes.filter(|m| !m.is_empty())
}
