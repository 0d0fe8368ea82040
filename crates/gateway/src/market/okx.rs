//! OKX v5 public REST client.
//!
//! Endpoints used:
//!   - `/api/v5/market/ticker`        last traded price
//!   - `/api/v5/public/funding-rate`  current funding rate
//!   - `/api/v5/public/open-interest` open interest in contracts
//!   - `/api/v5/public/instruments`   SWAP instrument listing
//!
//! OKX wraps every response as `{code, msg, data: [...]}` with all numerics
//! as strings. Fields that are missing or unparseable become `None` — the
//! classification layer treats absent data as unknown, never as zero.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::{MarketObservation, MarketSource};
use crate::errors::GatewayError;

const OKX_BASE: &str = "https://www.okx.com";

/// Per-call deadline for every outbound request.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(8);

pub struct OkxSource {
    client: reqwest::Client,
    base_url: String,
}

impl OkxSource {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(OKX_BASE)
    }

    /// Point the client at a different host (tests, proxies).
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("reqwest client should build");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Issue a GET and return the `data` array from the OKX envelope.
    async fn okx_get(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<Value>, GatewayError> {
        let url = format!("{base}{path}", base = self.base_url);
        let start = Instant::now();
        let resp = self.client.get(&url).query(params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%url, %status, "okx request failed");
            return Err(GatewayError::MarketUnavailable { name: url });
        }

        let body: Value = resp.json().await?;
        let latency = start.elapsed();

        let code = body.get("code").and_then(|v| v.as_str()).unwrap_or("");
        if code != "0" {
            let msg = body.get("msg").and_then(|v| v.as_str()).unwrap_or("");
            warn!(%url, code, msg, "okx error envelope");
            return Err(GatewayError::MalformedPayload {
                reason: format!("okx code {code}: {msg}"),
            });
        }

        let data = body
            .get("data")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| GatewayError::MalformedPayload {
                reason: "okx response missing data array".into(),
            })?;

        debug!(
            path,
            rows = data.len(),
            latency_ms = latency.as_millis() as u64,
            "okx response"
        );

        Ok(data)
    }
}

impl Default for OkxSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketSource for OkxSource {
    async fn observe(&self, inst: &str) -> Result<MarketObservation, GatewayError> {
        let ticker_params = [("instId", inst)];
        let funding_params = [("instId", inst)];
        let oi_params = [("instType", "SWAP"), ("instId", inst)];
        let (ticker, funding, oi) = tokio::join!(
            self.okx_get("/api/v5/market/ticker", &ticker_params),
            self.okx_get("/api/v5/public/funding-rate", &funding_params),
            self.okx_get("/api/v5/public/open-interest", &oi_params),
        );

        // Price is mandatory; funding and OI degrade to absent.
        let ticker = ticker?;
        let price = ticker
            .first()
            .and_then(|row| parse_decimal_field(row, "last"))
            .ok_or_else(|| GatewayError::MalformedPayload {
                reason: format!("no last price for {inst}"),
            })?;

        let funding_rate = funding
            .ok()
            .and_then(|rows| rows.first().and_then(|row| parse_decimal_field(row, "fundingRate")));

        let open_interest_contracts = oi
            .ok()
            .and_then(|rows| rows.first().and_then(|row| parse_decimal_field(row, "oi")));

        Ok(MarketObservation {
            price,
            funding_rate,
            open_interest_contracts,
        })
    }

    async fn swap_instruments(&self) -> Result<Vec<String>, GatewayError> {
        let rows = self
            .okx_get("/api/v5/public/instruments", &[("instType", "SWAP")])
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("instId").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect())
    }
}

/// Parse a string-or-number JSON field into `Decimal`; absent on failure.
fn parse_decimal_field(row: &Value, field: &str) -> Option<Decimal> {
    let v = row.get(field)?;
    match v {
        Value::String(s) if !s.is_empty() => s.parse::<Decimal>().ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        _ => None,
    }
}
