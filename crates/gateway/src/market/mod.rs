//! Market source port: the upstream exchange client for one instrument.
//!
//! The ingestor is the sole caller. The derivation engine and evaluator
//! never touch this port — they work from stored snapshots only.

pub mod okx;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::GatewayError;

pub use okx::OkxSource;

/// One observation of a perpetual instrument.
///
/// Price is mandatory; funding and open interest stay absent when the
/// upstream omits them or returns something unparseable.
#[derive(Debug, Clone)]
pub struct MarketObservation {
    pub price: Decimal,
    pub funding_rate: Option<Decimal>,
    pub open_interest_contracts: Option<Decimal>,
}

/// Pluggable upstream exchange client.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch price, funding rate and open interest for one instrument.
    async fn observe(&self, inst: &str) -> Result<MarketObservation, GatewayError>;

    /// Fetch the full SWAP instrument listing (canonical instrument ids).
    async fn swap_instruments(&self) -> Result<Vec<String>, GatewayError>;
}

/// Extract the base asset from an external `{BASE}USDT` symbol.
#[must_use]
pub fn base_of_symbol(symbol: &str) -> Option<&str> {
    let base = symbol.strip_suffix("USDT")?;
    if base.is_empty() {
        return None;
    }
    Some(base)
}

/// Canonical perpetual instrument id for a base asset.
#[must_use]
pub fn canonical_swap_id(base: &str) -> String {
    format!("{base}-USDT-SWAP")
}
