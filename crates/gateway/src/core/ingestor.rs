//! Ingestor: sole caller of the market source.
//!
//! Writes one snapshot per instrument per 5-minute bucket, idempotently —
//! a second call in the same bucket leaves the value fixed at the first
//! successful observation. Per-symbol errors are isolated; a failed symbol
//! never prevents others from being written.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::GatewayError;
use crate::market::{base_of_symbol, canonical_swap_id, MarketSource};
use crate::store::{keys, KVStore};
use crate::types::{bucket_of, SnapshotPoint};

/// One per-symbol outcome in a snapshot batch.
#[derive(Debug, Serialize)]
pub struct SnapshotResult {
    pub symbol: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotPoint>,
    /// `false` when the bucket already held a snapshot (reanchor no-op).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnapshotResult {
    fn err(symbol: &str, error: impl ToString) -> Self {
        Self {
            symbol: symbol.to_string(),
            ok: false,
            inst: None,
            bucket: None,
            snapshot: None,
            written: None,
            error: Some(error.to_string()),
        }
    }
}

/// Response of one ingestor invocation.
#[derive(Debug, Serialize)]
pub struct SnapshotBatch {
    pub ok: bool,
    pub ts: i64,
    pub symbols: Vec<String>,
    pub results: Vec<SnapshotResult>,
}

pub struct Ingestor {
    store: Arc<dyn KVStore>,
    source: Arc<dyn MarketSource>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn KVStore>, source: Arc<dyn MarketSource>) -> Self {
        Self { store, source }
    }

    /// Ingest a batch of symbols at `now_ms`.
    pub async fn run(&self, symbols: &[String], now_ms: i64) -> SnapshotBatch {
        let futures = symbols.iter().map(|symbol| self.ingest_symbol(symbol, now_ms));
        let results = join_all(futures).await;

        let ok_count = results.iter().filter(|r| r.ok).count();
        info!(
            total = results.len(),
            ok = ok_count,
            failed = results.len() - ok_count,
            bucket = bucket_of(now_ms),
            "snapshot batch complete"
        );

        SnapshotBatch {
            ok: true,
            ts: now_ms,
            symbols: symbols.to_vec(),
            results,
        }
    }

    /// Resolve, fetch and write one symbol. Errors become a failed result.
    async fn ingest_symbol(&self, symbol: &str, now_ms: i64) -> SnapshotResult {
        match self.try_ingest_symbol(symbol, now_ms).await {
            Ok(result) => result,
            Err(e) => {
                warn!(symbol, error = %e, "symbol ingest failed");
                SnapshotResult::err(symbol, e)
            }
        }
    }

    async fn try_ingest_symbol(
        &self,
        symbol: &str,
        now_ms: i64,
    ) -> Result<SnapshotResult, GatewayError> {
        let base = base_of_symbol(symbol).ok_or_else(|| GatewayError::UnsupportedSymbol {
            symbol: symbol.to_string(),
        })?;

        let inst = self.resolve_instrument(base).await?;
        let obs = self.source.observe(&inst).await?;

        let bucket = bucket_of(now_ms);
        let snap = SnapshotPoint {
            ts: now_ms,
            price: obs.price,
            funding_rate: obs.funding_rate,
            open_interest_contracts: obs.open_interest_contracts,
        };

        let key = keys::snapshot(&inst, bucket);
        let written = self
            .store
            .put_if_absent(&key, &serde_json::to_string(&snap)?, Some(keys::SNAPSHOT_TTL))
            .await?;

        // Idempotent reanchor: the bucket keeps its first observation.
        let stored = if written {
            snap
        } else {
            match self.store.get(&key).await? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => snap,
            }
        };

        debug!(symbol, inst = %inst, bucket, written, "snapshot ingested");

        Ok(SnapshotResult {
            symbol: symbol.to_string(),
            ok: true,
            inst: Some(inst),
            bucket: Some(bucket),
            snapshot: Some(stored),
            written: Some(written),
            error: None,
        })
    }

    /// Resolve a base asset to its canonical SWAP instrument id.
    ///
    /// Positive results are memoized for a day; bases with no perpetual
    /// market are memoized as a `__NONE__` sentinel to prevent refetch
    /// storms. If the listing fetch fails the canonical guess is used but
    /// not memoized.
    pub async fn resolve_instrument(&self, base: &str) -> Result<String, GatewayError> {
        let map_key = keys::instmap(base);
        if let Some(cached) = self.store.get(&map_key).await? {
            if cached == keys::NONE_SENTINEL {
                return Err(GatewayError::NoPerpetualMarket {
                    base: base.to_string(),
                });
            }
            return Ok(cached);
        }

        let canonical = canonical_swap_id(base);

        let listing = match self.load_listing().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(base, error = %e, "instrument listing unavailable, using canonical guess");
                return Ok(canonical);
            }
        };

        if listing.iter().any(|id| id == &canonical) {
            self.store
                .put(&map_key, &canonical, Some(keys::INSTMAP_TTL))
                .await?;
            Ok(canonical)
        } else {
            self.store
                .put(&map_key, keys::NONE_SENTINEL, Some(keys::INSTMAP_TTL))
                .await?;
            Err(GatewayError::NoPerpetualMarket {
                base: base.to_string(),
            })
        }
    }

    /// Full SWAP listing, cached for 12 h.
    async fn load_listing(&self) -> Result<Vec<String>, GatewayError> {
        if let Some(raw) = self.store.get(keys::INSTRUMENT_LISTING).await? {
            if let Ok(listing) = serde_json::from_str::<Vec<String>>(&raw) {
                return Ok(listing);
            }
            warn!("cached instrument listing unparseable, refetching");
        }

        let listing = self.source.swap_instruments().await?;
        self.store
            .put(
                keys::INSTRUMENT_LISTING,
                &serde_json::to_string(&listing)?,
                Some(keys::LISTING_TTL),
            )
            .await?;

        debug!(instruments = listing.len(), "instrument listing cached");
        Ok(listing)
    }
}
