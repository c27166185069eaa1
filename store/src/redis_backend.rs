use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool;
use errors::StoreError;
use once_cell::sync::Lazy;

use crate::backend::StoreBackend;

static FETCH_AND_LEASE: Lazy<redis::Script> =
    Lazy::new(|| redis::Script::new(include_str!("../lua/fetch_and_lease.lua")));
static RECLAIM: Lazy<redis::Script> =
    Lazy::new(|| redis::Script::new(include_str!("../lua/reclaim.lua")));
static ALERT_GATE: Lazy<redis::Script> =
    Lazy::new(|| redis::Script::new(include_str!("../lua/alert_gate.lua")));

pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn cmd_err(e: redis::RedisError) -> StoreError {
    StoreError::Command(Box::new(e))
}

fn script_err(e: redis::RedisError) -> StoreError {
    StoreError::Script(Box::new(e))
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.zadd(key, member, score).await.map_err(cmd_err)?;
        Ok(())
    }

    async fn zadd_multi(&self, key: &str, items: &[(i64, String)]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (score, member) in items {
            cmd.arg(*score).arg(member);
        }
        let _: i64 = cmd.query_async(&mut conn).await.map_err(cmd_err)?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.zrem(key, member).await.map_err(cmd_err)?;
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn().await?;
        let score: Option<f64> = conn.zscore(key, member).await.map_err(cmd_err)?;
        Ok(score.map(|s| s as i64))
    }

    async fn zpop_min(&self, key: &str, count: usize) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn().await?;
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(key)
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(cmd_err)?;
        Ok(popped
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(cmd_err)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs())
                    .await
                    .map_err(cmd_err)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(cmd_err)?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(key).await.map_err(cmd_err)?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1).await.map_err(cmd_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(cmd_err)?;
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(value);
        }
        let _: i64 = cmd.query_async(&mut conn).await.map_err(cmd_err)?;
        Ok(())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.hincr(key, field, delta).await.map_err(cmd_err)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.hgetall(key).await.map_err(cmd_err)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cmd_err)?;
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
        let mut conn = self.conn().await?;
        FETCH_AND_LEASE
            .key(schedule_key)
            .key(inflight_key)
            .arg(now_ms)
            .arg(limit)
            .arg(visibility_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(script_err)
    }

    async fn reclaim(
        &self,
        inflight_key: &str,
        schedule_key: &str,
        now_ms: i64,
        limit: usize,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        RECLAIM
            .key(inflight_key)
            .key(schedule_key)
            .arg(now_ms)
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(script_err)
    }

    async fn alert_gate(&self, incident_key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let flipped: i64 = ALERT_GATE
            .key(incident_key)
            .invoke_async(&mut conn)
            .await
            .map_err(script_err)?;
        Ok(flipped == 1)
    }
}
