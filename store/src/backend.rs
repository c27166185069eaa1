use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use errors::StoreError;

/// Primitive operations of the state layer plus the three atomic state
/// transitions. The Redis backend evaluates the transitions as server-side
/// Lua; the memory backend holds its lock across them. Atomicity of those
/// three is the contract every implementation must keep.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError>;
    async fn zadd_multi(&self, key: &str, items: &[(i64, String)]) -> Result<(), StoreError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError>;
    async fn zpop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Moves up to `limit` due members (score <= `now_ms`) from the schedule
    /// set into the inflight set with a lease deadline of
    /// `now_ms + visibility_ms`, returning the moved members.
    async fn fetch_and_lease(
        &self,
        schedule_key: &str,
        inflight_key: &str,
        now_ms: i64,
        limit: usize,
        visibility_ms: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Moves up to `limit` expired leases (deadline <= `now_ms`) back into
    /// the schedule set at score `now_ms`, returning how many moved.
    async fn reclaim(
        &self,
        inflight_key: &str,
        schedule_key: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<i64, StoreError>;

    /// Flips the `alerted` field of an incident hash to "true" unless it
    /// already is; returns whether this call won the flip.
    async fn alert_gate(&self, incident_key: &str) -> Result<bool, StoreError>;
}
