//! HTTP surface for the external scheduler: `/snapshot` and `/alert`
//! scheduled entry points plus a liveness probe.
//!
//! Auth applies to the evaluator only: the shared secret arrives via
//! `?key=` or `Authorization: Bearer`. A failed check returns 401 before
//! any state is touched — no seeding, no heartbeat.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::core::evaluator::{EvalRequest, Evaluator};
use crate::core::ingestor::Ingestor;
use crate::types::{Timeframe, TradeMode};

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub evaluator: Arc<Evaluator>,
    pub config: Arc<GatewayConfig>,
    /// Evaluator auth secret. Absent means every `/alert` call is rejected.
    pub shared_secret: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/alert", get(alert))
        .route("/healthz", get(healthz))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// /healthz
// ---------------------------------------------------------------------------

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "ts": Utc::now().timestamp_millis() }))
}

// ---------------------------------------------------------------------------
// /snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub symbols: Option<String>,
}

async fn snapshot(State(state): State<AppState>, Query(query): Query<SnapshotQuery>) -> Response {
    let symbols = parse_symbols(query.symbols.as_deref(), &state.config);
    let now_ms = Utc::now().timestamp_millis();

    let batch = state.ingestor.run(&symbols, now_ms).await;
    Json(batch).into_response()
}

// ---------------------------------------------------------------------------
// /alert
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub key: Option<String>,
    pub mode: Option<String>,
    pub risk_profile: Option<String>,
    pub driver_tf: Option<String>,
    pub force: Option<String>,
    pub dry: Option<String>,
    pub debug: Option<String>,
    pub symbols: Option<String>,
}

async fn alert(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &query, &headers) {
        warn!("alert request rejected: bad or missing key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "unauthorized" })),
        )
            .into_response();
    }

    let modes = match query.mode.as_deref() {
        None => state.config.gating.default_modes.clone(),
        Some(raw) => match parse_modes(raw) {
            Some(modes) => modes,
            None => {
                return bad_request(&format!("unrecognized mode: {raw}"));
            }
        },
    };

    let driver_tf = match query.driver_tf.as_deref() {
        None => Timeframe::M15,
        Some(raw) => match Timeframe::parse(raw) {
            Some(tf) => tf,
            None => return bad_request(&format!("unrecognized driver_tf: {raw}")),
        },
    };

    let request = EvalRequest {
        symbols: parse_symbols(query.symbols.as_deref(), &state.config),
        modes,
        risk_profile: query
            .risk_profile
            .clone()
            .unwrap_or_else(|| state.config.gating.default_risk_profile.clone()),
        driver_tf,
        force: parse_flag(query.force.as_deref()),
        dry: parse_flag(query.dry.as_deref()),
        debug: parse_flag(query.debug.as_deref()),
        now_ms: Utc::now().timestamp_millis(),
    };

    info!(
        symbols = request.symbols.len(),
        force = request.force,
        dry = request.dry,
        "alert invocation"
    );

    let response = state.evaluator.run(request).await;
    let status = if response.notify_error.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (status, Json(response)).into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn authorized(state: &AppState, query: &AlertQuery, headers: &HeaderMap) -> bool {
    let Some(secret) = state.shared_secret.as_deref() else {
        return false;
    };

    if query.key.as_deref() == Some(secret) {
        return true;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": message })),
    )
        .into_response()
}

/// `1` / `true` / `yes` enable a query flag.
fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1") | Some("true") | Some("yes"))
}

/// Comma-separated symbol list, falling back to the configured defaults.
fn parse_symbols(raw: Option<&str>, config: &GatewayConfig) -> Vec<String> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_uppercase())
            .collect(),
        _ => config.symbols.default_symbols.clone(),
    }
}

/// Comma-separated mode list; `None` if any entry is unrecognized.
fn parse_modes(raw: &str) -> Option<Vec<TradeMode>> {
    let modes: Option<Vec<TradeMode>> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TradeMode::parse)
        .collect();
    modes.filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::market::{MarketObservation, MarketSource};
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct NoopSource;

    #[async_trait]
    impl MarketSource for NoopSource {
        async fn observe(&self, _inst: &str) -> Result<MarketObservation, crate::errors::GatewayError> {
            Ok(MarketObservation {
                price: dec!(100),
                funding_rate: None,
                open_interest_contracts: None,
            })
        }

        async fn swap_instruments(&self) -> Result<Vec<String>, crate::errors::GatewayError> {
            Ok(vec!["BTC-USDT-SWAP".into(), "ETH-USDT-SWAP".into()])
        }
    }

    fn test_state(store: Arc<MemoryStore>) -> AppState {
        let config: Arc<GatewayConfig> = Arc::new(
            serde_json::from_value(json!({
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
                        "enabled": false,
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
                    "telegram_enabled": false
                }
            }))
            .unwrap(),
        );

        let source = Arc::new(NoopSource);
        AppState {
            ingestor: Arc::new(Ingestor::new(store.clone(), source)),
            evaluator: Arc::new(Evaluator::new(
                store,
                Arc::new(LogNotifier),
                config.clone(),
            )),
            config,
            shared_secret: Some("s3cret".into()),
        }
    }

    fn alert_query() -> AlertQuery {
        AlertQuery {
            key: None,
            mode: None,
            risk_profile: None,
            driver_tf: None,
            force: None,
            dry: None,
            debug: None,
            symbols: None,
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("true")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(
            parse_modes("scalp,build"),
            Some(vec![TradeMode::Scalp, TradeMode::Build])
        );
        assert_eq!(parse_modes("hodl"), None);
        assert_eq!(parse_modes(""), None);
    }

    #[tokio::test]
    async fn test_alert_rejects_missing_key_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone());

        let response = alert(State(state), Query(alert_query()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // No seeding, no heartbeat: the store is untouched.
        assert!(store.dump().is_empty());
    }

    #[tokio::test]
    async fn test_alert_accepts_query_key() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);

        let mut query = alert_query();
        query.key = Some("s3cret".into());
        let response = alert(State(state), Query(query), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_alert_accepts_bearer_header() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let response = alert(State(state), Query(alert_query()), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_alert_rejects_wrong_bearer() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
        let response = alert(State(state), Query(alert_query()), headers).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_alert_rejects_unknown_mode() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);

        let mut query = alert_query();
        query.key = Some("s3cret".into());
        query.mode = Some("hodl".into());
        let response = alert(State(state), Query(query), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_secret_rejects_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut state = test_state(store);
        state.shared_secret = None;

        let mut query = alert_query();
        query.key = Some("anything".into());
        let response = alert(State(state), Query(query), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_snapshot_uses_default_symbols() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);

        let response = snapshot(State(state), Query(SnapshotQuery { symbols: None })).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_parse_symbols_csv() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store);
        assert_eq!(
            parse_symbols(Some("ethusdt, solusdt"), &state.config),
            vec!["ETHUSDT".to_string(), "SOLUSDT".to_string()]
        );
        assert_eq!(
            parse_symbols(None, &state.config),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
        );
    }
}
