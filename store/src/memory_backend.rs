use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use errors::StoreError;

use crate::backend::StoreBackend;

struct StringEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct MemoryState {
    zsets: HashMap<String, BTreeMap<String, i64>>,
    strings: HashMap<String, StringEntry>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl MemoryState {
    fn live_string(&mut self, key: &str) -> Option<&StringEntry> {
        let expired = match self.strings.get(key) {
            Some(entry) => matches!(entry.expires_at, Some(exp) if Instant::now() > exp),
            None => return None,
        };
        if expired {
            self.strings.remove(key);
            return None;
        }
        self.strings.get(key)
    }

    /// Members with score <= max, in (score, member) order.
    fn due_members(&self, key: &str, max: i64, limit: usize) -> Vec<String> {
        let Some(zset) = self.zsets.get(key) else {
            return Vec::new();
        };
        let mut due: Vec<(i64, String)> = zset
            .iter()
            .filter(|(_, score)| **score <= max)
            .map(|(member, score)| (*score, member.clone()))
            .collect();
        due.sort();
        due.into_iter()
            .take(limit)
            .map(|(_, member)| member)
            .collect()
    }
}

/// In-process twin of the Redis backend, one mutex over the whole state so
/// the three transition ops are as atomic as their Lua counterparts. Exists
/// so pipeline logic can be exercised without a Redis server.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zadd_multi(&self, key: &str, items: &[(i64, String)]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let zset = state.zsets.entry(key.to_string()).or_default();
        for (score, member) in items {
            zset.insert(member.clone(), *score);
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .zsets
            .get_mut(key)
            .is_some_and(|zset| zset.remove(member).is_some()))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.zsets.get(key).and_then(|zset| zset.get(member).copied()))
    }

    async fn zpop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let members = state.due_members(key, i64::MAX, count);
        let mut popped = Vec::with_capacity(members.len());
        if let Some(zset) = state.zsets.get_mut(key) {
            for member in members {
                if let Some(score) = zset.remove(&member) {
                    popped.push((member, score));
                }
            }
        }
        Ok(popped)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.live_string(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_vec(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.strings.remove(key);
        state.hashes.remove(key);
        state.zsets.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let current = state
            .live_string(key)
            .map(|entry| {
                String::from_utf8_lossy(&entry.value)
                    .parse::<i64>()
                    .map_err(|e| StoreError::Decode(e.to_string()))
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + 1;
        let expires_at = state.strings.get(key).and_then(|e| e.expires_at);
        state.strings.insert(
            key.to_string(),
            StringEntry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.strings.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert((*field).to_string(), value.clone());
        }
        Ok(())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let hash = state.hashes.entry(key.to_string()).or_default();
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            None => 0,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn fetch_and_lease(
        &self,
        schedule_key: &str,
        inflight_key: &str,
        now_ms: i64,
        limit: usize,
        visibility_ms: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let due = state.due_members(schedule_key, now_ms, limit);
        for member in &due {
            if let Some(zset) = state.zsets.get_mut(schedule_key) {
                zset.remove(member);
            }
            state
                .zsets
                .entry(inflight_key.to_string())
                .or_default()
                .insert(member.clone(), now_ms + visibility_ms);
        }
        Ok(due)
    }

    async fn reclaim(
        &self,
        inflight_key: &str,
        schedule_key: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let expired = state.due_members(inflight_key, now_ms, limit);
        for member in &expired {
            if let Some(zset) = state.zsets.get_mut(inflight_key) {
                zset.remove(member);
            }
            state
                .zsets
                .entry(schedule_key.to_string())
                .or_default()
                .insert(member.clone(), now_ms);
        }
        Ok(expired.len() as i64)
    }

    async fn alert_gate(&self, incident_key: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let hash = state.hashes.entry(incident_key.to_string()).or_default();
        if hash.get("alerted").map(String::as_str) == Some("true") {
            return Ok(false);
        }
        hash.insert("alerted".to_string(), "true".to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_keeps_ttl_and_counts() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.incr("k").await.unwrap(), 1);
        backend.expire("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.incr("k").await.unwrap(), 2);
        assert_eq!(backend.incr("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn expired_strings_read_as_absent() {
        let backend = MemoryBackend::new();
        backend
            .set("k", b"v", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_and_lease_moves_only_due_members() {
        let backend = MemoryBackend::new();
        backend.zadd("sched", 100, "a").await.unwrap();
        backend.zadd("sched", 200, "b").await.unwrap();
        backend.zadd("sched", 900, "c").await.unwrap();

        let leased = backend
            .fetch_and_lease("sched", "inflight", 500, 10, 30_000)
            .await
            .unwrap();
        assert_eq!(leased, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(backend.zscore("sched", "a").await.unwrap(), None);
        assert_eq!(backend.zscore("inflight", "a").await.unwrap(), Some(30_500));
        assert_eq!(backend.zscore("sched", "c").await.unwrap(), Some(900));
    }

    #[tokio::test]
    async fn reclaim_restores_expired_leases() {
        let backend = MemoryBackend::new();
        backend.zadd("inflight", 100, "a").await.unwrap();
        backend.zadd("inflight", 9_000, "b").await.unwrap();

        let count = backend.reclaim("inflight", "sched", 500, 10).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(backend.zscore("sched", "a").await.unwrap(), Some(500));
        assert_eq!(backend.zscore("inflight", "b").await.unwrap(), Some(9_000));
    }

    #[tokio::test]
    async fn alert_gate_flips_exactly_once() {
        let backend = MemoryBackend::new();
        backend
            .hset("incident", &[("alerted", "false".to_string())])
            .await
            .unwrap();
        assert!(backend.alert_gate("incident").await.unwrap());
        assert!(!backend.alert_gate("incident").await.unwrap());
    }
}
