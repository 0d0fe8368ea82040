use thiserror::Error;

/// Typed error hierarchy for the signal gateway.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug)]
pub enum GatewayError {
    // -- Upstream market data -----------------------------------------------
    #[error("market data unavailable: {name}")]
    MarketUnavailable { name: String },

    #[error("malformed upstream payload: {reason}")]
    MalformedPayload { reason: String },

    // -- Symbols / instruments ----------------------------------------------
    #[error("unsupported symbol: {symbol}")]
    UnsupportedSymbol { symbol: String },

    #[error("no perpetual market for {base}")]
    NoPerpetualMarket { base: String },

    // -- Store --------------------------------------------------------------
    #[error("store error: {reason}")]
    StoreError { reason: String },

    // -- Notifier -----------------------------------------------------------
    #[error("notifier rejected message: {reason}")]
    NotifierFailed { reason: String },

    // -- Auth ---------------------------------------------------------------
    #[error("unauthorized")]
    Unauthorized,

    // -- Configuration ------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
