use std::time::Duration;

use chrono::Utc;
use common::model::config::ReclaimerConfig;
use log::{error, info};
use metrics::counter;
use store::Store;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Restores jobs whose lease expired: a crashed worker, a dead process, a
/// stall longer than the visibility timeout. An expired lease is by
/// definition abandoned, so moving it back is always safe.
pub struct Reclaimer {
    interval: Duration,
    limit: usize,
    store: Store,
    shutdown: watch::Receiver<bool>,
}

impl Reclaimer {
    pub fn new(config: &ReclaimerConfig, store: Store, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            limit: config.limit,
            store,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("reclaimer started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("reclaimer stopped");
    }

    async fn tick(&self) {
        match self.store.reclaim_monitors(Utc::now(), self.limit).await {
            Ok(0) => {}
            Ok(count) => {
                info!("reclaimed {count} expired leases");
                counter!("reclaimer_reclaimed_total").increment(count as u64);
            }
            Err(err) => error!("reclaim pass failed: {err}"),
        }
    }
}
