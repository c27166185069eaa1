use std::time::Duration;

use chrono::Utc;
use common::model::config::SchedulerConfig;
use common::JobPayload;
use log::{debug, error, info, warn};
use metrics::counter;
use rand::Rng;
use store::Store;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Turns time-ordered Redis state into a stream of jobs, leasing each id as
/// it goes so no other replica can pick it up until the lease expires.
pub struct Scheduler {
    interval: Duration,
    batch_size: usize,
    visibility_timeout: Duration,
    job_tx: mpsc::Sender<JobPayload>,
    store: Store,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        job_tx: mpsc::Sender<JobPayload>,
        store: Store,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            batch_size: config.batch_size,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            job_tx,
            store,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("scheduler stopped");
    }

    async fn tick(&self) {
        let due = match self
            .store
            .fetch_and_move_to_inflight(Utc::now(), self.batch_size, self.visibility_timeout)
            .await
        {
            Ok(due) => due,
            Err(err) => {
                // Transient store error: skip this tick, the next one retries.
                error!("failed to lease due monitors: {err}");
                return;
            }
        };
        if due.is_empty() {
            return;
        }
        debug!("leased {} due monitors", due.len());
        counter!("scheduler_jobs_leased_total").increment(due.len() as u64);

        for member in due {
            let id = match Uuid::parse_str(&member) {
                Ok(id) => id,
                Err(err) => {
                    // Corrupted member; drop it. The lease entry expires and
                    // cycles through the reclaimer until someone cleans it up.
                    warn!("dropping malformed schedule member {member:?}: {err}");
                    counter!("scheduler_malformed_members_total").increment(1);
                    continue;
                }
            };

            match self.job_tx.try_send(JobPayload { monitor_id: id }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.apply_backpressure(&member, id).await,
                Err(TrySendError::Closed(_)) => {
                    // Shutting down. Leased entries are recovered by the
                    // reclaimer after restart.
                    return;
                }
            }
        }
    }

    /// The job channel is full: push the id back into the schedule shortly
    /// from now (jittered so a burst does not re-arrive as a burst) and
    /// release the lease, since a backpressured job was never handed to a
    /// worker.
    async fn apply_backpressure(&self, member: &str, id: Uuid) {
        counter!("scheduler_backpressure_total").increment(1);
        debug!("job channel full, re-scheduling monitor {id}");

        let jitter_ms = rand::thread_rng().gen_range(0..=200);
        let run_at = Utc::now() + chrono::Duration::milliseconds(2000 + jitter_ms);
        if let Err(err) = self.store.schedule(member, run_at).await {
            error!("failed to re-schedule backpressured monitor {id}: {err}");
        }
        if let Err(err) = self.store.ack_job(id).await {
            error!("failed to release lease of backpressured monitor {id}: {err}");
        }
    }
}
