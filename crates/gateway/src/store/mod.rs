//! Key-value store port shared by the ingestor, derivation engine and
//! evaluator. Each key is written by exactly one logical writer; the store
//! itself only needs get / put / put-if-absent / expire with TTL support.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::GatewayError;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Pluggable key-value store with expiry support.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Unconditional write. `ttl = None` persists without expiry.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), GatewayError>;

    /// Write only if the key is absent. Returns `true` if the write happened.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, GatewayError>;

    /// Refresh the expiry of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), GatewayError>;
}

/// Key grammar and TTL policy. Keeping every key format in one place makes
/// the one-writer-per-key table auditable.
pub mod keys {
    use std::time::Duration;

    use crate::types::TradeMode;

    /// Snapshot blobs expire after a day.
    pub const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 3600);
    /// Rolling series and its bucket gate outlive two snapshot windows.
    pub const SERIES_TTL: Duration = Duration::from_secs(48 * 3600);
    /// Positive and negative instrument mappings.
    pub const INSTMAP_TTL: Duration = Duration::from_secs(24 * 3600);
    /// Full SWAP instrument listing.
    pub const LISTING_TTL: Duration = Duration::from_secs(12 * 3600);

    /// Cached negative result for bases with no perpetual market.
    pub const NONE_SENTINEL: &str = "__NONE__";

    /// Full SWAP listing cache key (versioned).
    pub const INSTRUMENT_LISTING: &str = "okx:instruments:swap:list:v1";

    #[must_use]
    pub fn snapshot(inst: &str, bucket: i64) -> String {
        format!("snap5m:{inst}:{bucket}")
    }

    #[must_use]
    pub fn series(inst: &str) -> String {
        format!("series5m:{inst}")
    }

    #[must_use]
    pub fn last_bucket(inst: &str) -> String {
        format!("lastBucket:{inst}")
    }

    #[must_use]
    pub fn instmap(base: &str) -> String {
        format!("instmap:swap:{base}")
    }

    #[must_use]
    pub fn last_state(mode: TradeMode, inst: &str) -> String {
        format!("alert:lastState:{mode}:{inst}", mode = mode.as_str())
    }

    /// Legacy mirror kept for non-scalp modes.
    #[must_use]
    pub fn last_state_15m(inst: &str) -> String {
        format!("alert:lastState15m:{inst}")
    }

    #[must_use]
    pub fn last_sent_at(inst: &str) -> String {
        format!("alert:lastSentAt:{inst}")
    }

}
