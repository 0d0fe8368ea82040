//! Evaluation engine: sequences the gating pipeline per symbol, enforces
//! cooldown and mode priority, and performs the post-gate side effects.
//!
//! Dry-run discipline is structural: every state write goes through
//! [`AlertWriter`], which is constructed with the dry flag and turns each
//! write into a no-op on every path, exception paths included.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::core::derivation::{derive_symbol, SourceCounterCells, SymbolDerivation};
use crate::core::render::{compute_frame, is_breakout_path, render_message, RenderInput};
use crate::core::{confidence, gating, leverage};
use crate::market::{base_of_symbol, canonical_swap_id};
use crate::notify::Notifier;
use crate::store::{keys, KVStore};
use crate::types::{
    Candidate, FlowState, Lean, MacroAnalysis, SkipReason, SourceCounters, Timeframe, TradeMode,
};

// ═══════════════════════════════════════════════════════════════════════════
// Request / response
// ═══════════════════════════════════════════════════════════════════════════

/// One evaluator invocation, fully resolved from query + config defaults.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub symbols: Vec<String>,
    pub modes: Vec<TradeMode>,
    pub risk_profile: String,
    pub driver_tf: Timeframe,
    pub force: bool,
    pub dry: bool,
    pub debug: bool,
    pub now_ms: i64,
}

/// Heartbeat blob written after every non-dry invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub ts: i64,
    pub driver_tf: String,
    pub modes: Vec<String>,
    pub evaluated: usize,
    pub triggered: Vec<String>,
    pub skipped: BTreeMap<String, String>,
    pub sent: bool,
    pub telegram_failed: bool,
    pub force: bool,
    pub dry: bool,
    pub counters: SourceCounters,
}

/// Extra payload returned with `debug=1`.
#[derive(Debug, Serialize)]
pub struct DebugPayload {
    pub macro_analysis: MacroAnalysis,
    pub counters: SourceCounters,
    pub heartbeat: Heartbeat,
    /// Per-symbol, per-mode skip reasons (`"scalp:cooldown"`).
    pub mode_skips: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Evaluator invocation result.
#[derive(Debug, Serialize)]
pub struct EvalResponse {
    pub ok: bool,
    pub sent: bool,
    pub triggered_count: usize,
    pub ts: i64,
    pub symbols: Vec<String>,
    pub skipped: BTreeMap<String, String>,
    pub triggered: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugPayload>,
}

/// Outcome of one symbol's pipeline (internal).
struct SymbolOutcome {
    symbol: String,
    candidate: Option<Candidate>,
    /// Symbol-level or first-mode skip reason.
    skip: Option<SkipReason>,
    /// Every evaluated (mode, reason) pair, for debug payloads.
    mode_skips: Vec<(TradeMode, SkipReason)>,
}

// ═══════════════════════════════════════════════════════════════════════════
// AlertWriter — dry-run aware write capability
// ═══════════════════════════════════════════════════════════════════════════

/// Write handle for alert state. All writes are silently dropped when the
/// invocation runs dry, on every path.
pub struct AlertWriter {
    store: Arc<dyn KVStore>,
    dry: bool,
}

impl AlertWriter {
    #[must_use]
    pub fn new(store: Arc<dyn KVStore>, dry: bool) -> Self {
        Self { store, dry }
    }

    /// Seed the last observed detection state for (mode, instrument),
    /// mirroring into the legacy 15m key for non-scalp modes.
    pub async fn seed_state(&self, mode: TradeMode, inst: &str, state: FlowState) {
        if self.dry {
            debug!(%mode, inst, state = %state, "dry-run: state seed suppressed");
            return;
        }
        if let Err(e) = self
            .store
            .put(&keys::last_state(mode, inst), state.as_str(), None)
            .await
        {
            warn!(%mode, inst, error = %e, "failed to seed last state");
            return;
        }
        if mode != TradeMode::Scalp {
            if let Err(e) = self
                .store
                .put(&keys::last_state_15m(inst), state.as_str(), None)
                .await
            {
                warn!(inst, error = %e, "failed to mirror 15m state");
            }
        }
    }

    /// Record the notification timestamp for cooldown accounting.
    pub async fn mark_sent(&self, inst: &str, now_ms: i64) {
        if self.dry {
            debug!(inst, "dry-run: lastSentAt suppressed");
            return;
        }
        if let Err(e) = self
            .store
            .put(&keys::last_sent_at(inst), &now_ms.to_string(), None)
            .await
        {
            warn!(inst, error = %e, "failed to write lastSentAt");
        }
    }

    /// Write the heartbeat blob with its TTL.
    pub async fn write_heartbeat(&self, key: &str, heartbeat: &Heartbeat, ttl_seconds: u64) {
        if self.dry {
            debug!("dry-run: heartbeat suppressed");
            return;
        }
        let blob = match serde_json::to_string(heartbeat) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "heartbeat serialization failed");
                return;
            }
        };
        if let Err(e) = self
            .store
            .put(key, &blob, Some(std::time::Duration::from_secs(ttl_seconds)))
            .await
        {
            warn!(error = %e, "failed to write heartbeat");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════

pub struct Evaluator {
    store: Arc<dyn KVStore>,
    notifier: Arc<dyn Notifier>,
    config: Arc<GatewayConfig>,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn KVStore>,
        notifier: Arc<dyn Notifier>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Run the full gating pipeline for one invocation.
    pub async fn run(&self, req: EvalRequest) -> EvalResponse {
        let writer = AlertWriter::new(self.store.clone(), req.dry);
        let counters = SourceCounterCells::new();

        let mut modes = req.modes.clone();
        modes.sort();
        modes.dedup();

        info!(
            symbols = req.symbols.len(),
            modes = ?modes,
            force = req.force,
            dry = req.dry,
            driver_tf = %req.driver_tf,
            "evaluation started"
        );

        // Macro analysis first: BTC's 4h regime, derived snapshot-only.
        let macro_analysis = self.macro_analysis(&req, &counters).await;

        // Per-symbol pipelines, bounded fan-out, order preserved.
        let outcomes: Vec<SymbolOutcome> = stream::iter(req.symbols.clone())
            .map(|symbol: String| {
                let req = &req;
                let modes = &modes;
                let macro_analysis = &macro_analysis;
                let writer = &writer;
                let counters = &counters;
                async move { self.eval_symbol(&symbol, req, modes, macro_analysis, writer, counters).await }
            })
            .buffered(self.config.gating.max_concurrency)
            .collect()
            .await;

        let winners: Vec<Candidate> = outcomes
            .iter()
            .filter_map(|o| o.candidate.clone())
            .collect();

        let mut skipped = BTreeMap::new();
        let mut mode_skips: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for outcome in &outcomes {
            if let Some(reason) = outcome.skip {
                skipped.insert(outcome.symbol.clone(), reason.as_str().to_string());
            }
            if !outcome.mode_skips.is_empty() {
                mode_skips.insert(
                    outcome.symbol.clone(),
                    outcome
                        .mode_skips
                        .iter()
                        .map(|(mode, reason)| format!("{mode}:{reason}"))
                        .collect(),
                );
            }
        }

        // Post-gate side effects: lastSentAt per winner, one notification.
        for winner in &winners {
            writer.mark_sent(&winner.inst, req.now_ms).await;
        }

        let message = if winners.is_empty() {
            None
        } else {
            Some(render_message(&RenderInput {
                driver_tf: req.driver_tf,
                force: req.force,
                dry: req.dry,
                now_ms: req.now_ms,
                winners: &winners,
                btc_symbol: &self.config.gating.macro_filter.btc_symbol,
                drilldown_base_url: &self.config.alerting.drilldown_base_url,
                max_chars: self.config.alerting.max_message_chars,
            }))
        };

        let mut sent = false;
        let mut notify_error = None;
        if let Some(text) = &message {
            if req.dry {
                debug!("dry-run: notification suppressed");
            } else {
                match self.notifier.send(text).await {
                    Ok(()) => sent = true,
                    Err(e) => {
                        warn!(error = %e, "notifier failed after state writes");
                        notify_error = Some(e.to_string());
                    }
                }
            }
        }

        let heartbeat = Heartbeat {
            ts: req.now_ms,
            driver_tf: req.driver_tf.label().to_string(),
            modes: modes.iter().map(|m| m.as_str().to_string()).collect(),
            evaluated: req.symbols.len(),
            triggered: winners.iter().map(|c| c.symbol.clone()).collect(),
            skipped: skipped.clone(),
            sent,
            telegram_failed: notify_error.is_some(),
            force: req.force,
            dry: req.dry,
            counters: counters.snapshot(),
        };
        writer
            .write_heartbeat(
                &self.config.alerting.heartbeat_key,
                &heartbeat,
                self.config.alerting.heartbeat_ttl_seconds,
            )
            .await;

        info!(
            triggered = winners.len(),
            skipped = skipped.len(),
            sent,
            "evaluation complete"
        );

        let debug_payload = req.debug.then(|| DebugPayload {
            macro_analysis: macro_analysis.clone(),
            counters: counters.snapshot(),
            heartbeat: heartbeat.clone(),
            mode_skips,
            message: message.clone(),
        });

        EvalResponse {
            ok: true,
            sent,
            triggered_count: winners.len(),
            ts: req.now_ms,
            symbols: req.symbols.clone(),
            skipped,
            triggered: winners,
            notify_error,
            debug: debug_payload,
        }
    }

    /// Derive BTC and compute the macro analysis. Unavailable data yields an
    /// analysis that never blocks.
    async fn macro_analysis(
        &self,
        req: &EvalRequest,
        counters: &SourceCounterCells,
    ) -> MacroAnalysis {
        let cfg = &self.config.gating.macro_filter;
        if !cfg.enabled {
            return MacroAnalysis::inactive(false);
        }

        let Some(inst) = self.instrument_for(&cfg.btc_symbol).await else {
            return MacroAnalysis::inactive(true);
        };

        match derive_symbol(self.store.as_ref(), &inst, req.now_ms, counters, !req.dry).await {
            Ok(Some(d)) => gating::compute_macro(Some(d.delta(Timeframe::H4)), cfg),
            Ok(None) => {
                debug!(inst = %inst, "macro symbol snapshot missing");
                MacroAnalysis::inactive(true)
            }
            Err(e) => {
                warn!(inst = %inst, error = %e, "macro derivation failed");
                MacroAnalysis::inactive(true)
            }
        }
    }

    /// Resolve an instrument id without touching the market source: cached
    /// mapping if present, canonical guess otherwise.
    async fn instrument_for(&self, symbol: &str) -> Option<String> {
        let base = base_of_symbol(symbol)?;
        match self.store.get(&keys::instmap(base)).await {
            Ok(Some(cached)) if cached == keys::NONE_SENTINEL => None,
            Ok(Some(cached)) => Some(cached),
            _ => Some(canonical_swap_id(base)),
        }
    }

    /// Run the gate sequence for one symbol across the requested modes.
    /// First passing mode wins; every evaluated mode seeds its state.
    async fn eval_symbol(
        &self,
        symbol: &str,
        req: &EvalRequest,
        modes: &[TradeMode],
        macro_analysis: &MacroAnalysis,
        writer: &AlertWriter,
        counters: &SourceCounterCells,
    ) -> SymbolOutcome {
        let mut outcome = SymbolOutcome {
            symbol: symbol.to_string(),
            candidate: None,
            skip: None,
            mode_skips: Vec::new(),
        };

        let Some(inst) = self.instrument_for(symbol).await else {
            outcome.skip = Some(SkipReason::UnsupportedSymbol);
            return outcome;
        };

        let derivation =
            match derive_symbol(self.store.as_ref(), &inst, req.now_ms, counters, !req.dry).await {
                Ok(Some(d)) => d,
                Ok(None) => {
                    outcome.skip = Some(SkipReason::SnapshotMissing);
                    return outcome;
                }
                Err(e) => {
                    warn!(symbol, inst = %inst, error = %e, "derivation failed");
                    outcome.skip = Some(SkipReason::StoreError);
                    return outcome;
                }
            };

        // Cooldown timestamp is shared per instrument across modes.
        let last_sent_at: Option<i64> = match self.store.get(&keys::last_sent_at(&inst)).await {
            Ok(raw) => raw.and_then(|v| v.parse().ok()),
            Err(e) => {
                warn!(symbol, error = %e, "failed to read lastSentAt");
                None
            }
        };

        for &mode in modes {
            match self
                .eval_mode(symbol, &inst, mode, &derivation, last_sent_at, req, macro_analysis, writer)
                .await
            {
                Ok(candidate) => {
                    debug!(
                        symbol,
                        %mode,
                        reason = %candidate.exec_reason,
                        grade = %candidate.grade,
                        "candidate accepted"
                    );
                    outcome.candidate = Some(candidate);
                    break;
                }
                Err(reason) => {
                    debug!(symbol, %mode, %reason, "mode denied");
                    outcome.mode_skips.push((mode, reason));
                }
            }
        }

        if outcome.candidate.is_none() {
            outcome.skip = outcome.mode_skips.first().map(|(_, reason)| *reason);
        }

        outcome
    }

    /// The strict gate sequence for one (symbol, mode) pair.
    #[allow(clippy::too_many_arguments)]
    async fn eval_mode(
        &self,
        symbol: &str,
        inst: &str,
        mode: TradeMode,
        d: &SymbolDerivation,
        last_sent_at: Option<i64>,
        req: &EvalRequest,
        macro_analysis: &MacroAnalysis,
        writer: &AlertWriter,
    ) -> Result<Candidate, SkipReason> {
        let cfg = &self.config.gating;

        // 1. Detection pre-filter. The current state is seeded regardless of
        //    the trigger outcome so a later flip is detectable in quiet
        //    regimes. Stored state is read before the seed overwrites it.
        let detection_state = d.delta(mode.detection_timeframe()).state;
        let stored_state = match self.store.get(&keys::last_state(mode, inst)).await {
            Ok(raw) => raw.map(|v| FlowState::parse(&v)),
            Err(e) => {
                warn!(symbol, %mode, error = %e, "failed to read last state");
                None
            }
        };

        let trigger = gating::detect_trigger(d, mode, stored_state, cfg);
        writer.seed_state(mode, inst, detection_state).await;

        let trigger = match trigger {
            Some(t) => t,
            None if req.force => crate::types::TriggerKind::Forced,
            None => return Err(SkipReason::NoDetectionTrigger),
        };

        // 2. Cooldown, shared per instrument. Force bypasses.
        if !req.force {
            let cooldown_ms = self.config.gating.cooldown_minutes as i64 * 60_000;
            if let Some(sent_at) = last_sent_at {
                if req.now_ms - sent_at < cooldown_ms {
                    return Err(SkipReason::Cooldown);
                }
            }
        }

        // 3. Macro gate (bias computed ahead for the short-block rule).
        let bias = gating::bias_for_mode(d, mode);
        if gating::macro_blocks(macro_analysis, symbol, bias, &cfg.macro_filter) {
            return Err(SkipReason::MacroBlockBtcBullExpansion);
        }

        // 4. Warmup gate. Force bypasses, but a degenerate range still
        //    denies below.
        if d.levels_1h.warmup && !req.force {
            return Err(SkipReason::WarmupGate1h);
        }

        // 5. Bias must be directional.
        if bias == Lean::Neutral {
            return Err(SkipReason::NeutralBias);
        }

        let (Some(hi), Some(lo)) = (d.levels_1h.hi, d.levels_1h.lo) else {
            return Err(SkipReason::MissingLevelsOrPrice);
        };
        if hi - lo <= rust_decimal::Decimal::ZERO {
            return Err(SkipReason::MissingLevelsOrPrice);
        }

        // 6. Structural edge, widened under 4h contraction, demoted under
        //    an opposite 4h expansion.
        let d4h = d.delta(Timeframe::H4);
        let widen = if gating::regime_contraction(d4h, &cfg.regime) {
            cfg.regime.band_widen_factor
        } else {
            rust_decimal::Decimal::ONE
        };
        let mut b1 = gating::evaluate_b1(bias, d.price, &d.levels_1h, cfg.edge_pct_1h, widen);
        if b1.strong && gating::regime_opposite_expansion(bias, d4h, &cfg.regime) {
            b1.strong = false;
        }

        // 7. Per-mode entry validity.
        let exec_reason = match mode {
            TradeMode::Scalp => gating::scalp_entry(d, bias, &b1, hi, lo, cfg)?,
            TradeMode::Swing | TradeMode::Build => gating::swing_entry(d, bias, &b1, hi, lo, cfg)?,
        };

        // Candidate accepted — grade, advisory leverage, framing.
        let d15 = d.delta(Timeframe::M15);
        let grade = confidence::grade_candidate(
            exec_reason,
            b1.strong,
            bias,
            d15.lean,
            d15.oi_change_pct,
            d.delta(Timeframe::H1).lean,
            cfg.shock_oi_min,
        );

        let profile = self
            .config
            .leverage
            .profiles
            .get(&req.risk_profile)
            .or_else(|| {
                self.config
                    .leverage
                    .profiles
                    .get(&self.config.gating.default_risk_profile)
            });
        let band = profile.and_then(|profile| {
            leverage::advisory_band(
                d.price,
                bias,
                &d.levels_1h,
                d.delta(Timeframe::M5).oi_change_pct,
                d15.oi_change_pct,
                d.funding,
                profile,
                &self.config.leverage,
            )
        });

        let mut candidate = Candidate {
            symbol: symbol.to_string(),
            inst: inst.to_string(),
            mode,
            bias,
            price: d.price,
            trigger,
            exec_reason,
            b1,
            levels_1h: d.levels_1h.clone(),
            deltas: d.deltas.clone(),
            grade,
            leverage: band,
            frame: None,
        };
        candidate.frame = compute_frame(
            bias,
            d.price,
            &d.levels_1h,
            cfg.edge_pct_1h,
            is_breakout_path(&candidate),
        );

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    use crate::errors::GatewayError;
    use crate::store::MemoryStore;
    use crate::types::{SeriesPoint, SnapshotPoint};

    // -----------------------------------------------------------------------
    // Fakes and fixtures
    // -----------------------------------------------------------------------

    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), GatewayError> {
            if self.fail {
                return Err(GatewayError::NotifierFailed {
                    reason: "scripted failure".into(),
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn gateway_config() -> Arc<GatewayConfig> {
        Arc::new(
            serde_json::from_value(serde_json::json!({
                "app": {
                    "logging": { "log_dir": "logs" },
                    "server": { "bind_addr": "127.0.0.1:8787" }
                },
                "symbols": { "default_symbols": ["BTCUSDT", "ETHUSDT"] },
                "gating": {
                    "cooldown_minutes": 20,
                    "default_modes": ["swing"],
                    "default_risk_profile": "standard",
                    "momentum_min": "0.10",
                    "shock_oi_min": "0.50",
                    "shock_price_min": "0.20",
                    "edge_pct_1h": "0.15",
                    "swing_min_oi_pct": "-0.50",
                    "swing_reversal_min_5m": "0.05",
                    "scalp_sweep_lookback": 3,
                    "max_concurrency": 4,
                    "macro": {
                        "enabled": true,
                        "btc_symbol": "BTCUSDT",
                        "price_min_4h": "2.0",
                        "oi_min_4h": "0.5",
                        "block_shorts": true
                    },
                    "regime": {
                        "enabled": true,
                        "contraction_price_max": "0.5",
                        "contraction_oi_max": "-1.0",
                        "band_widen_factor": "1.5",
                        "expansion_price_min": "2.0",
                        "expansion_oi_min": "0.5"
                    }
                },
                "leverage": {
                    "profiles": {
                        "standard": { "risk_budget_pct": "2.0", "max_cap": 10 }
                    },
                    "instability_soft_pct": "1.0",
                    "instability_hard_pct": "2.5",
                    "funding_soft": "0.0005",
                    "funding_hard": "0.001",
                    "soft_multiplier": "0.75",
                    "hard_multiplier": "0.6"
                },
                "alerting": {
                    "heartbeat_key": "alert:lastRun",
                    "heartbeat_ttl_seconds": 86400,
                    "drilldown_base_url": "https://dash.example.com/perps",
                    "max_message_chars": 3900,
                    "telegram_enabled": true
                }
            }))
            .unwrap(),
        )
    }

    fn pt(b: i64, p: Decimal, oi: i64) -> SeriesPoint {
        SeriesPoint {
            b,
            ts: b * 300_000,
            p,
            fr: Some(dec!(0.0001)),
            oi: Some(Decimal::from(oi)),
        }
    }

    async fn seed_series(store: &MemoryStore, inst: &str, points: &[SeriesPoint]) {
        store
            .put(
                &keys::series(inst),
                &serde_json::to_string(points).unwrap(),
                None,
            )
            .await
            .unwrap();
        if let Some(last) = points.last() {
            store
                .put(&keys::last_bucket(inst), &last.b.to_string(), None)
                .await
                .unwrap();
        }
    }

    async fn seed_snapshot(store: &MemoryStore, inst: &str, bucket: i64, p: Decimal, oi: i64) {
        let snap = SnapshotPoint {
            ts: bucket * 300_000,
            price: p,
            funding_rate: Some(dec!(0.0001)),
            open_interest_contracts: Some(Decimal::from(oi)),
        };
        store
            .put(
                &keys::snapshot(inst, bucket),
                &serde_json::to_string(&snap).unwrap(),
                None,
            )
            .await
            .unwrap();
    }

    /// 12 history points (buckets 0-11) shaping a 1h range of
    /// [1940.00, 1987.56], flat-ish OI around 50 000.
    fn breakout_history() -> Vec<SeriesPoint> {
        vec![
            pt(0, dec!(1950), 50_000),
            pt(1, dec!(1945), 50_000),
            pt(2, dec!(1940.00), 50_000),
            pt(3, dec!(1952), 50_000),
            pt(4, dec!(1960), 50_000),
            pt(5, dec!(1987.56), 50_000),
            pt(6, dec!(1970), 50_000),
            pt(7, dec!(1965), 50_000),
            pt(8, dec!(1972), 50_000),
            pt(9, dec!(1968), 50_000),
            pt(10, dec!(1975), 50_100),
            pt(11, dec!(1985), 50_200),
        ]
    }

    fn make_evaluator(
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> Evaluator {
        Evaluator::new(store, notifier, gateway_config())
    }

    fn request(symbols: &[&str], modes: &[TradeMode], now_ms: i64) -> EvalRequest {
        EvalRequest {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            modes: modes.to_vec(),
            risk_profile: "standard".into(),
            driver_tf: Timeframe::M15,
            force: false,
            dry: false,
            debug: true,
            now_ms,
        }
    }

    const NOW: i64 = 12 * 300_000;

    // -----------------------------------------------------------------------
    // Scalp long breakout, end to end
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_scalp_breakout_triggers_and_writes_state() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        seed_series(&store, "ETH-USDT-SWAP", &breakout_history()).await;
        // Current bucket: price breaks the 1h high, 15m OI +0.6%.
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1988.00), 50_300).await;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Scalp], NOW))
            .await;

        assert_eq!(resp.triggered_count, 1);
        assert!(resp.sent);
        let winner = &resp.triggered[0];
        assert_eq!(winner.mode, TradeMode::Scalp);
        assert_eq!(winner.bias, Lean::Long);
        assert_eq!(winner.exec_reason, crate::types::ExecReason::LongBreakout);

        // The entry line references the explicit 1h high.
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("1987.56"));

        // Side effects: lastSentAt, lastState, heartbeat.
        assert_eq!(
            store
                .get(&keys::last_sent_at("ETH-USDT-SWAP"))
                .await
                .unwrap()
                .as_deref(),
            Some(NOW.to_string().as_str())
        );
        assert_eq!(
            store
                .get(&keys::last_state(TradeMode::Scalp, "ETH-USDT-SWAP"))
                .await
                .unwrap()
                .as_deref(),
            Some("longs_opening")
        );
        assert!(store.get("alert:lastRun").await.unwrap().is_some());
    }

    // -----------------------------------------------------------------------
    // Dry-run: no writes, no notification, even with a valid trigger
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_dry_run_suppresses_all_writes() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        seed_series(&store, "ETH-USDT-SWAP", &breakout_history()).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1988.00), 50_300).await;

        let before = store.dump();

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let mut req = request(&["ETHUSDT"], &[TradeMode::Scalp], NOW);
        req.dry = true;
        let resp = evaluator.run(req).await;

        // The pipeline still evaluates and reports the would-be trigger.
        assert_eq!(resp.triggered_count, 1);
        assert!(!resp.sent);
        assert!(resp.debug.unwrap().message.unwrap().contains("[DRY]"));

        // But nothing was written and nothing was delivered.
        assert_eq!(store.dump(), before);
        assert!(notifier.messages().is_empty());
        assert!(store.keys_with_prefix("alert:").is_empty());
    }

    // -----------------------------------------------------------------------
    // Quiet regime: no trigger, but state is seeded for flip detection
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_trigger_still_seeds_state() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let flat: Vec<SeriesPoint> = (0..12).map(|b| pt(b, dec!(1950), 50_000)).collect();
        seed_series(&store, "ETH-USDT-SWAP", &flat).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1950), 50_000).await;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Swing], NOW))
            .await;

        assert_eq!(resp.triggered_count, 0);
        assert_eq!(resp.skipped["ETHUSDT"], "no_detection_trigger");
        // Zero deltas classify unknown, and that unknown state is seeded.
        assert_eq!(
            store
                .get(&keys::last_state(TradeMode::Swing, "ETH-USDT-SWAP"))
                .await
                .unwrap()
                .as_deref(),
            Some("unknown")
        );
        // Non-scalp modes mirror into the legacy 15m key.
        assert_eq!(
            store
                .get(&keys::last_state_15m("ETH-USDT-SWAP"))
                .await
                .unwrap()
                .as_deref(),
            Some("unknown")
        );
        assert!(notifier.messages().is_empty());
    }

    // -----------------------------------------------------------------------
    // Cooldown
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_cooldown_blocks_and_force_bypasses() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        seed_series(&store, "ETH-USDT-SWAP", &breakout_history()).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1988.00), 50_300).await;
        // Sent 10 minutes ago; cooldown is 20 minutes.
        store
            .put(
                &keys::last_sent_at("ETH-USDT-SWAP"),
                &(NOW - 10 * 60_000).to_string(),
                None,
            )
            .await
            .unwrap();

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Scalp], NOW))
            .await;
        assert_eq!(resp.triggered_count, 0);
        assert_eq!(resp.skipped["ETHUSDT"], "cooldown");

        let mut forced = request(&["ETHUSDT"], &[TradeMode::Scalp], NOW);
        forced.force = true;
        let resp = evaluator.run(forced).await;
        assert_eq!(resp.triggered_count, 1);
        assert!(resp.sent);
    }

    // -----------------------------------------------------------------------
    // Macro block
    // -----------------------------------------------------------------------

    /// 48 history points with BTC in 4h bull expansion at the current point.
    fn btc_bull_series() -> Vec<SeriesPoint> {
        (0..48)
            .map(|b| pt(b, dec!(100) + Decimal::from(b) * dec!(0.04), 1000))
            .collect()
    }

    #[tokio::test]
    async fn test_macro_blocks_short_and_still_seeds() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let now = 48 * 300_000;

        // BTC: 4h delta vs bucket 0: price +2.4%, OI +0.8%.
        seed_series(&store, "BTC-USDT-SWAP", &btc_bull_series()).await;
        seed_snapshot(&store, "BTC-USDT-SWAP", 48, dec!(102.4), 1008).await;

        // ETH: breakdown below the 1h low with shorts opening on 5m.
        let mut eth: Vec<SeriesPoint> = (36..47).map(|b| pt(b, dec!(1960), 50_000)).collect();
        eth.insert(0, pt(35, dec!(2000), 50_000));
        eth.push(pt(47, dec!(1945), 50_000));
        seed_series(&store, "ETH-USDT-SWAP", &eth).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 48, dec!(1939.00), 50_250).await;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Scalp], now))
            .await;

        assert_eq!(resp.triggered_count, 0);
        assert_eq!(resp.skipped["ETHUSDT"], "macro_block_btc_bull_expansion");
        let debug = resp.debug.unwrap();
        assert!(debug.macro_analysis.bull_expansion);

        // lastState is still seeded on a macro skip (non-dry).
        assert_eq!(
            store
                .get(&keys::last_state(TradeMode::Scalp, "ETH-USDT-SWAP"))
                .await
                .unwrap()
                .as_deref(),
            Some("shorts_opening")
        );
    }

    // -----------------------------------------------------------------------
    // Warmup gate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_warmup_gate_and_forced_degenerate_range() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        // Nine flat points: warmup for 1h levels, and a zero-width range.
        let nine: Vec<SeriesPoint> = (0..9).map(|b| pt(b, dec!(1950), 50_000)).collect();
        seed_series(&store, "ETH-USDT-SWAP", &nine).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 9, dec!(1952), 50_400).await;
        let now = 9 * 300_000;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Swing], now))
            .await;
        assert_eq!(resp.skipped["ETHUSDT"], "warmup_gate_1h");

        let mut forced = request(&["ETHUSDT"], &[TradeMode::Swing], now);
        forced.force = true;
        let resp = evaluator.run(forced).await;
        assert_eq!(resp.triggered_count, 0);
        assert_eq!(resp.skipped["ETHUSDT"], "missing_levels_or_price");
    }

    // -----------------------------------------------------------------------
    // Mode priority: first passing mode wins, all evaluated modes seed
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_mode_priority_first_pass_wins() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        // Break above the 1h high with 15m OI at +0.2%: too weak for the
        // scalp confirm (0.5), fine for the swing context floor (-0.5).
        let mut history = breakout_history();
        history[0] = pt(0, dec!(1950), 49_000);
        seed_series(&store, "ETH-USDT-SWAP", &history).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1988.00), 50_100).await;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(
                &["ETHUSDT"],
                &[TradeMode::Scalp, TradeMode::Swing],
                NOW,
            ))
            .await;

        assert_eq!(resp.triggered_count, 1);
        assert_eq!(resp.triggered[0].mode, TradeMode::Swing);
        assert_eq!(resp.triggered[0].exec_reason, crate::types::ExecReason::LongBreak);

        let debug = resp.debug.unwrap();
        assert_eq!(debug.mode_skips["ETHUSDT"], vec!["scalp:oi_not_confirmed"]);

        // Both evaluated modes seeded their state.
        assert!(store
            .get(&keys::last_state(TradeMode::Scalp, "ETH-USDT-SWAP"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(&keys::last_state(TradeMode::Swing, "ETH-USDT-SWAP"))
            .await
            .unwrap()
            .is_some());
    }

    // -----------------------------------------------------------------------
    // Notifier failure after state writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_notifier_failure_recorded_in_heartbeat() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::failing());
        seed_series(&store, "ETH-USDT-SWAP", &breakout_history()).await;
        seed_snapshot(&store, "ETH-USDT-SWAP", 12, dec!(1988.00), 50_300).await;

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Scalp], NOW))
            .await;

        assert!(!resp.sent);
        assert_eq!(resp.triggered_count, 1);
        assert!(resp.notify_error.is_some());

        // lastSentAt was written before the notifier ran; cooldown still
        // protects against a retry storm.
        assert!(store
            .get(&keys::last_sent_at("ETH-USDT-SWAP"))
            .await
            .unwrap()
            .is_some());

        let heartbeat: Heartbeat = serde_json::from_str(
            &store.get("alert:lastRun").await.unwrap().unwrap(),
        )
        .unwrap();
        assert!(heartbeat.telegram_failed);
        assert!(!heartbeat.sent);
    }

    // -----------------------------------------------------------------------
    // Snapshot missing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_snapshot_missing_skips_without_notification() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        seed_series(&store, "ETH-USDT-SWAP", &breakout_history()).await;
        // No snapshot for the current bucket.

        let evaluator = make_evaluator(store.clone(), notifier.clone());
        let resp = evaluator
            .run(request(&["ETHUSDT"], &[TradeMode::Swing], NOW))
            .await;

        assert_eq!(resp.triggered_count, 0);
        assert_eq!(resp.skipped["ETHUSDT"], "snapshot_missing");
        assert!(notifier.messages().is_empty());
        let debug = resp.debug.unwrap();
        assert_eq!(debug.counters.market_calls, 0);
        assert!(debug.counters.snapshot_misses >= 1);
    }
}
