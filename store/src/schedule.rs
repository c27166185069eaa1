use std::time::Duration;

use chrono::{DateTime, Utc};
use errors::Result;
use uuid::Uuid;

use crate::retry::with_retry;
use crate::{epoch_ms, Store, INFLIGHT_KEY, SCHEDULE_KEY};

impl Store {
    /// Inserts (or moves) a monitor in the schedule set. Scores are epoch-ms
    /// run times; every enabled monitor appears at most once.
    pub async fn schedule(&self, member: &str, run_at: DateTime<Utc>) -> Result<()> {
        let score = epoch_ms(run_at);
        with_retry(3, || self.backend().zadd(SCHEDULE_KEY, score, member)).await?;
        Ok(())
    }

    pub async fn schedule_batch(&self, items: &[(DateTime<Utc>, String)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let scored: Vec<(i64, String)> = items
            .iter()
            .map(|(run_at, member)| (epoch_ms(*run_at), member.clone()))
            .collect();
        let scored = scored.as_slice();
        with_retry(3, || self.backend().zadd_multi(SCHEDULE_KEY, scored)).await?;
        Ok(())
    }

    /// Legacy non-lease pop, retained for benchmarking against the leased
    /// path. A crash between this pop and the probe loses the job.
    pub async fn pop_due(&self, batch: usize) -> Result<Vec<(String, i64)>> {
        let popped = with_retry(3, || self.backend().zpop_min(SCHEDULE_KEY, batch)).await?;
        Ok(popped)
    }

    /// Atomically transfers due members into the inflight set with a lease
    /// deadline of `now + visibility`, returning the leased members. No other
    /// replica can observe a leased member in the schedule set until the
    /// lease expires.
    pub async fn fetch_and_move_to_inflight(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        visibility: Duration,
    ) -> Result<Vec<String>> {
        let leased = self
            .backend()
            .fetch_and_lease(
                SCHEDULE_KEY,
                INFLIGHT_KEY,
                epoch_ms(now),
                limit,
                visibility.as_millis() as i64,
            )
            .await?;
        Ok(leased)
    }

    /// Releases a lease after the result of its probe has been processed.
    pub async fn ack_job(&self, id: Uuid) -> Result<()> {
        let member = id.to_string();
        let member = member.as_str();
        let backend = self.backend();
        with_retry(2, || async move {
            backend.zrem(INFLIGHT_KEY, member).await?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Moves expired leases back into the schedule set at `now`, returning
    /// how many were moved. Idempotent by construction.
    pub async fn reclaim_monitors(&self, now: DateTime<Utc>, limit: usize) -> Result<i64> {
        let count = self
            .backend()
            .reclaim(INFLIGHT_KEY, SCHEDULE_KEY, epoch_ms(now), limit)
            .await?;
        Ok(count)
    }

    pub async fn del_schedule(&self, id: Uuid) -> Result<()> {
        self.backend().zrem(SCHEDULE_KEY, &id.to_string()).await?;
        Ok(())
    }

    /// Epoch-ms run time currently recorded for a member, if scheduled.
    pub async fn schedule_score(&self, member: &str) -> Result<Option<i64>> {
        Ok(self.backend().zscore(SCHEDULE_KEY, member).await?)
    }

    /// Epoch-ms lease deadline currently recorded for a member, if leased.
    pub async fn inflight_score(&self, member: &str) -> Result<Option<i64>> {
        Ok(self.backend().zscore(INFLIGHT_KEY, member).await?)
    }
}
