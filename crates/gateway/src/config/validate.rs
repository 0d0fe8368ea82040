use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::GatewayConfig;
use crate::market::base_of_symbol;

/// Validate a merged configuration. Fails closed: a config that would make
/// the gating engine silently misbehave refuses to load.
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    if config.symbols.default_symbols.is_empty() {
        bail!("symbols.default_symbols must not be empty");
    }
    for symbol in &config.symbols.default_symbols {
        if base_of_symbol(symbol).is_none() {
            bail!("symbol {symbol} is not a {{BASE}}USDT perpetual symbol");
        }
    }

    let gating = &config.gating;
    if gating.cooldown_minutes == 0 {
        bail!("gating.cooldown_minutes must be positive");
    }
    if gating.default_modes.is_empty() {
        bail!("gating.default_modes must not be empty");
    }
    if gating.edge_pct_1h <= Decimal::ZERO || gating.edge_pct_1h >= Decimal::ONE {
        bail!(
            "gating.edge_pct_1h must be in (0, 1), got {}",
            gating.edge_pct_1h
        );
    }
    if gating.momentum_min < Decimal::ZERO
        || gating.shock_oi_min < Decimal::ZERO
        || gating.shock_price_min < Decimal::ZERO
    {
        bail!("detection thresholds must be non-negative");
    }
    if gating.scalp_sweep_lookback == 0 {
        bail!("gating.scalp_sweep_lookback must be at least 1");
    }
    if gating.max_concurrency == 0 {
        bail!("gating.max_concurrency must be at least 1");
    }
    if base_of_symbol(&gating.macro_filter.btc_symbol).is_none() {
        bail!(
            "gating.macro.btc_symbol {} is not a {{BASE}}USDT symbol",
            gating.macro_filter.btc_symbol
        );
    }
    if gating.regime.band_widen_factor < Decimal::ONE {
        bail!("gating.regime.band_widen_factor must be >= 1");
    }

    let leverage = &config.leverage;
    if leverage.profiles.is_empty() {
        bail!("leverage.profiles must not be empty");
    }
    if !leverage.profiles.contains_key(&gating.default_risk_profile) {
        bail!(
            "gating.default_risk_profile {} has no matching leverage profile",
            gating.default_risk_profile
        );
    }
    for (name, profile) in &leverage.profiles {
        if profile.risk_budget_pct <= Decimal::ZERO {
            bail!("leverage profile {name} has non-positive risk_budget_pct");
        }
        if profile.max_cap == 0 {
            bail!("leverage profile {name} has zero max_cap");
        }
    }
    if leverage.soft_multiplier <= Decimal::ZERO
        || leverage.soft_multiplier > Decimal::ONE
        || leverage.hard_multiplier <= Decimal::ZERO
        || leverage.hard_multiplier > Decimal::ONE
    {
        bail!("leverage multipliers must be in (0, 1]");
    }

    let alerting = &config.alerting;
    if alerting.heartbeat_key.is_empty() {
        bail!("alerting.heartbeat_key must not be empty");
    }
    if alerting.heartbeat_ttl_seconds == 0 {
        bail!("alerting.heartbeat_ttl_seconds must be positive");
    }
    if alerting.max_message_chars < 256 {
        bail!("alerting.max_message_chars is too small to render a message");
    }

    // A widened band must still not cover the whole range.
    if gating.edge_pct_1h * gating.regime.band_widen_factor >= dec!(0.5) {
        bail!(
            "edge_pct_1h x band_widen_factor must stay below 0.5 (long and short bands would overlap)"
        );
    }

    Ok(())
}
