use std::collections::HashMap;

use chrono::{DateTime, Utc};
use errors::Result;
use uuid::Uuid;

use crate::retry::with_retry;
use crate::Store;

impl Store {
    /// Records the latest probe observation for a monitor. Last writer wins.
    pub async fn store_status(
        &self,
        id: Uuid,
        status: i32,
        latency_ms: i64,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = Self::status_key(id);
        let fields = [
            ("status_code", status.to_string()),
            ("latency_ms", latency_ms.to_string()),
            ("checked_at", checked_at.timestamp_millis().to_string()),
        ];
        let key = key.as_str();
        let fields = &fields[..];
        with_retry(2, || self.backend().hset(key, fields)).await?;
        Ok(())
    }

    pub async fn get_status(&self, id: Uuid) -> Result<Option<HashMap<String, String>>> {
        let hash = self.backend().hgetall(&Self::status_key(id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(hash))
    }

    pub async fn del_status(&self, id: Uuid) -> Result<()> {
        self.backend().del(&Self::status_key(id)).await?;
        Ok(())
    }
}
