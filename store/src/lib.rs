//! Redis state layer: the single source of truth for scheduling, leasing,
//! retry counts, incident state, and last-observed status.

mod backend;
mod incident;
mod memory_backend;
mod monitor;
mod redis_backend;
mod retry;
mod retry_counter;
mod schedule;
mod status;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use errors::Result;
use uuid::Uuid;

pub use backend::StoreBackend;
pub use memory_backend::MemoryBackend;
pub use redis_backend::RedisBackend;

pub const SCHEDULE_KEY: &str = "monitor:schedule";
pub const INFLIGHT_KEY: &str = "monitor:inflight";

pub(crate) fn epoch_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Typed capability set over a [`StoreBackend`]. Every write goes through a
/// bounded retry wrapper; the three atomic transitions go through the
/// backend's transition ops.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    pub fn redis(pool: deadpool_redis::Pool) -> Self {
        Self {
            backend: Arc::new(RedisBackend::new(pool)),
        }
    }

    /// In-process store for tests and local development.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    pub(crate) fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await?;
        Ok(())
    }

    pub(crate) fn monitor_key(id: Uuid) -> String {
        format!("monitor:{id}")
    }

    pub(crate) fn retry_key(id: Uuid) -> String {
        format!("monitor:retry:{id}")
    }

    pub(crate) fn incident_key(id: Uuid) -> String {
        format!("monitor:incident:{id}")
    }

    pub(crate) fn status_key(id: Uuid) -> String {
        format!("monitor:status:{id}")
    }
}
