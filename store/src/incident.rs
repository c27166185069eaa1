use std::collections::HashMap;

use chrono::Utc;
use errors::Result;
use uuid::Uuid;

use crate::retry::with_retry;
use crate::Store;

impl Store {
    /// Bumps the incident failure count for a monitor, creating the hash on
    /// the 0→1 transition. Returns `(failure_count, first_failure)`.
    pub async fn increment_incident(&self, id: Uuid) -> Result<(i64, bool)> {
        let key = Self::incident_key(id);
        let now = Utc::now().timestamp_millis().to_string();
        let key = key.as_str();
        let now = now.as_str();
        let backend = self.backend();

        let result = with_retry(3, || async move {
            let count = backend.hincrby(key, "failure_count", 1).await?;
            if count == 1 {
                backend
                    .hset(
                        key,
                        &[
                            ("first_failure_at", now.to_string()),
                            ("last_failure_at", now.to_string()),
                            ("alerted", "false".to_string()),
                            ("db_incident", "false".to_string()),
                        ],
                    )
                    .await?;
            } else {
                backend
                    .hset(key, &[("last_failure_at", now.to_string())])
                    .await?;
            }
            Ok((count, count == 1))
        })
        .await?;
        Ok(result)
    }

    pub async fn clear_incident(&self, id: Uuid) -> Result<()> {
        let key = Self::incident_key(id);
        let key = key.as_str();
        with_retry(2, || self.backend().del(key)).await?;
        Ok(())
    }

    /// The open-incident hash, or None when the monitor is healthy.
    pub async fn get_incident(&self, id: Uuid) -> Result<Option<HashMap<String, String>>> {
        let hash = self.backend().hgetall(&Self::incident_key(id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(hash))
    }

    /// Atomic alert gate: flips `alerted` to true and reports whether this
    /// caller won. Exactly one caller wins per incident, even across engine
    /// replicas.
    pub async fn mark_incident_alerted_if_not_set(&self, id: Uuid) -> Result<bool> {
        let won = self
            .backend()
            .alert_gate(&Self::incident_key(id))
            .await?;
        Ok(won)
    }

    /// Marker written before the DB row so a crash in between is recovered
    /// by the next success attempting (and tolerating) a no-op close.
    pub async fn mark_db_incident_created(&self, id: Uuid) -> Result<()> {
        let key = Self::incident_key(id);
        let fields = [("db_incident", "true".to_string())];
        let key = key.as_str();
        let fields = &fields[..];
        with_retry(2, || self.backend().hset(key, fields)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_increment_initializes_the_hash() {
        let store = Store::memory();
        let id = Uuid::new_v4();

        let (count, first) = store.increment_incident(id).await.unwrap();
        assert_eq!(count, 1);
        assert!(first);

        let hash = store.get_incident(id).await.unwrap().unwrap();
        assert_eq!(hash.get("failure_count").map(String::as_str), Some("1"));
        assert_eq!(hash.get("alerted").map(String::as_str), Some("false"));
        assert_eq!(hash.get("db_incident").map(String::as_str), Some("false"));
        assert_eq!(hash.get("first_failure_at"), hash.get("last_failure_at"));
    }

    #[tokio::test]
    async fn later_increments_touch_only_last_failure() {
        let store = Store::memory();
        let id = Uuid::new_v4();

        store.increment_incident(id).await.unwrap();
        let (count, first) = store.increment_incident(id).await.unwrap();
        assert_eq!(count, 2);
        assert!(!first);
    }

    #[tokio::test]
    async fn five_increments_then_clear_leaves_nothing() {
        let store = Store::memory();
        let id = Uuid::new_v4();

        for expected in 1..=5 {
            let (count, _) = store.increment_incident(id).await.unwrap();
            assert_eq!(count, expected);
        }
        store.clear_incident(id).await.unwrap();
        assert_eq!(store.get_incident(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn alert_gate_has_exactly_one_winner() {
        let store = Store::memory();
        let id = Uuid::new_v4();
        store.increment_incident(id).await.unwrap();

        assert!(store.mark_incident_alerted_if_not_set(id).await.unwrap());
        assert!(!store.mark_incident_alerted_if_not_set(id).await.unwrap());

        let hash = store.get_incident(id).await.unwrap().unwrap();
        assert_eq!(hash.get("alerted").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn concurrent_gate_attempts_one_winner() {
        let store = Store::memory();
        let id = Uuid::new_v4();
        store.increment_incident(id).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.mark_incident_alerted_if_not_set(id).await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.mark_incident_alerted_if_not_set(id).await.unwrap() })
        };
        let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());
        assert!(won_a ^ won_b, "exactly one caller must win the gate");
    }
}
