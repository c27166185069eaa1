use std::time::Duration;

use common::Monitor;
use errors::{Result, StoreError};
use uuid::Uuid;

use crate::Store;

const MONITOR_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

impl Store {
    pub async fn set_monitor(&self, monitor: &Monitor) -> Result<()> {
        let key = Self::monitor_key(monitor.id);
        let payload =
            serde_json::to_vec(monitor).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.backend()
            .set(&key, &payload, Some(MONITOR_CACHE_TTL))
            .await?;
        Ok(())
    }

    /// Cached monitor config; authoritative only while present.
    pub async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        let key = Self::monitor_key(id);
        let Some(raw) = self.backend().get(&key).await? else {
            return Ok(None);
        };
        let monitor =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(monitor))
    }

    pub async fn del_monitor(&self, id: Uuid) -> Result<()> {
        self.backend().del(&Self::monitor_key(id)).await?;
        Ok(())
    }
}
