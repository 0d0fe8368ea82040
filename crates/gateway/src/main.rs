use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use signal_gateway::config;
use signal_gateway::core::evaluator::Evaluator;
use signal_gateway::core::ingestor::Ingestor;
use signal_gateway::http::{router, AppState};
use signal_gateway::logging;
use signal_gateway::market::OkxSource;
use signal_gateway::notify::{LogNotifier, Notifier, TelegramNotifier};
use signal_gateway::store::{KVStore, RedisStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    // Determine config directory — default to `./config`.
    let config_dir = std::env::var("GATEWAY_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    // Load and validate configuration.
    let config = Arc::new(config::load_config(&config_dir)?);

    // Initialize tracing — hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    log_configuration_summary(&config);

    // -----------------------------------------------------------------------
    // External collaborators
    // -----------------------------------------------------------------------

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store: Arc<dyn KVStore> = Arc::new(
        RedisStore::connect(&redis_url)
            .await
            .context("failed to connect to Redis")?,
    );

    let source = Arc::new(OkxSource::new());

    let notifier = init_notifier(&config);

    let shared_secret = std::env::var("ALERT_SHARED_SECRET")
        .ok()
        .filter(|v| !v.is_empty());
    if shared_secret.is_none() {
        warn!("ALERT_SHARED_SECRET is not set — every /alert request will be rejected");
    }

    // -----------------------------------------------------------------------
    // Components and HTTP surface
    // -----------------------------------------------------------------------

    let ingestor = Arc::new(Ingestor::new(store.clone(), source));
    let evaluator = Arc::new(Evaluator::new(store, notifier, config.clone()));

    let state = AppState {
        ingestor,
        evaluator,
        config: config.clone(),
        shared_secret,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.app.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.app.server.bind_addr))?;

    info!(addr = %config.app.server.bind_addr, "signal gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        return;
    }
    info!("shutdown signal received, stopping gracefully...");
}

/// Pick the notification transport: Telegram when enabled and credentialed,
/// the log transport otherwise.
fn init_notifier(config: &config::GatewayConfig) -> Arc<dyn Notifier> {
    if !config.alerting.telegram_enabled {
        info!("telegram disabled — notifications go to the log");
        return Arc::new(LogNotifier);
    }

    let token = std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .filter(|v| !v.is_empty());
    let chat_id = std::env::var("TELEGRAM_CHAT_ID")
        .ok()
        .filter(|v| !v.is_empty());

    match (token, chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("telegram notifier initialized");
            Arc::new(TelegramNotifier::new(token, chat_id))
        }
        _ => {
            warn!("telegram enabled but TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID missing — using log transport");
            Arc::new(LogNotifier)
        }
    }
}

/// Log a configuration summary at startup.
fn log_configuration_summary(config: &config::GatewayConfig) {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.app.server.bind_addr,
        "signal gateway starting"
    );

    info!(
        symbols = config.symbols.default_symbols.len(),
        default_modes = ?config.gating.default_modes,
        risk_profile = %config.gating.default_risk_profile,
        "symbol universe"
    );

    info!(
        cooldown_minutes = config.gating.cooldown_minutes,
        momentum_min = %config.gating.momentum_min,
        shock_oi_min = %config.gating.shock_oi_min,
        shock_price_min = %config.gating.shock_price_min,
        edge_pct_1h = %config.gating.edge_pct_1h,
        swing_min_oi_pct = %config.gating.swing_min_oi_pct,
        swing_reversal_min_5m = %config.gating.swing_reversal_min_5m,
        scalp_sweep_lookback = config.gating.scalp_sweep_lookback,
        max_concurrency = config.gating.max_concurrency,
        "gating thresholds"
    );

    info!(
        macro_enabled = config.gating.macro_filter.enabled,
        btc_symbol = %config.gating.macro_filter.btc_symbol,
        price_min_4h = %config.gating.macro_filter.price_min_4h,
        oi_min_4h = %config.gating.macro_filter.oi_min_4h,
        block_shorts = config.gating.macro_filter.block_shorts,
        regime_enabled = config.gating.regime.enabled,
        "macro and regime gates"
    );

    info!(
        profiles = config.leverage.profiles.len(),
        heartbeat_key = %config.alerting.heartbeat_key,
        heartbeat_ttl_seconds = config.alerting.heartbeat_ttl_seconds,
        telegram_enabled = config.alerting.telegram_enabled,
        "alerting"
    );
}
