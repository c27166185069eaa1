use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CreateMonitor, Monitor};
use engine::MonitorDirectory;
use errors::{Error, ErrorKind, Result};
use log::{debug, error, warn};
use metrics::counter;
use store::Store;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::repository::MonitorRepository;

/// Bound on the deferred re-schedule queue; beyond it updates are dropped
/// (and logged), never blocked on.
const DEFERRED_QUEUE_CAPACITY: usize = 1024;
const DEFERRED_MAX_ATTEMPTS: u64 = 5;

/// Monitors each user may register.
const MONITOR_QUOTA: u64 = 10;

struct DeferredSchedule {
    monitor_id: Uuid,
    run_at: DateTime<Utc>,
}

/// Cache-through monitor service: the pipeline's read path and the CRUD
/// layer's write path, with the enable/disable side-effects that keep the
/// Redis state consistent with the SQL rows.
pub struct MonitorRegistry {
    repo: MonitorRepository,
    store: Store,
    deferred_tx: mpsc::Sender<DeferredSchedule>,
}

impl MonitorRegistry {
    pub fn new(repo: MonitorRepository, store: Store) -> Arc<Self> {
        let (deferred_tx, deferred_rx) = mpsc::channel(DEFERRED_QUEUE_CAPACITY);
        tokio::spawn(drain_deferred(store.clone(), deferred_rx));
        Arc::new(Self {
            repo,
            store,
            deferred_tx,
        })
    }

    pub async fn create_monitor(&self, cmd: CreateMonitor) -> Result<Uuid> {
        validate_create(&cmd)?;
        let used = self.repo.count_for_user(cmd.user_id).await?;
        if used >= MONITOR_QUOTA {
            return Err(Error::with_message(
                ErrorKind::Forbidden,
                format!("monitor quota of {MONITOR_QUOTA} reached"),
            )
            .with_op("service.monitor.create"));
        }

        let id = self.repo.create(&cmd).await?;
        let first_run = Utc::now() + chrono::Duration::seconds(i64::from(cmd.interval_sec));
        self.store.schedule(&id.to_string(), first_run).await?;
        Ok(id)
    }

    pub async fn get_monitor(&self, user_id: Uuid, id: Uuid) -> Result<Monitor> {
        if let Ok(Some(monitor)) = self.store.get_monitor(id).await {
            if monitor.user_id != user_id {
                return Err(Error::with_message(ErrorKind::Forbidden, "not your monitor")
                    .with_op("service.monitor.get"));
            }
            return Ok(monitor);
        }
        let monitor = self.repo.get_owned(user_id, id).await?;
        if let Err(err) = self.store.set_monitor(&monitor).await {
            warn!("failed to cache monitor {id}: {err}");
        }
        Ok(monitor)
    }

    pub async fn list_monitors(
        &self,
        user_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Monitor>> {
        self.repo.list(user_id, limit.min(100), offset).await
    }

    pub async fn monitor_status(&self, id: Uuid) -> Result<Option<HashMap<String, String>>> {
        self.store.get_status(id).await
    }

    /// Flips a monitor's enabled flag. Disable clears every Redis trace of
    /// the monitor (best effort, the TTLs are the backstop); enable puts it
    /// back on the schedule one interval out.
    pub async fn set_enabled(&self, user_id: Uuid, id: Uuid, enabled: bool) -> Result<()> {
        let current = self.repo.get_owned(user_id, id).await?;
        if current.enabled == enabled {
            return Err(Error::with_message(
                ErrorKind::Conflict,
                "monitor already in the requested state",
            )
            .with_op("service.monitor.set_enabled"));
        }

        self.repo.set_enabled(user_id, id, enabled).await?;

        if enabled {
            let next_run = Utc::now() + chrono::Duration::seconds(i64::from(current.interval_sec));
            self.store.schedule(&id.to_string(), next_run).await?;
        } else {
            if let Err(err) = self.store.del_monitor(id).await {
                warn!("failed to drop cached monitor {id}: {err}");
            }
            if let Err(err) = self.store.del_schedule(id).await {
                warn!("failed to unschedule monitor {id}: {err}");
            }
            if let Err(err) = self.store.clear_incident(id).await {
                warn!("failed to clear incident of monitor {id}: {err}");
            }
            if let Err(err) = self.store.del_status(id).await {
                warn!("failed to clear status of monitor {id}: {err}");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MonitorDirectory for MonitorRegistry {
    async fn load_monitor(&self, id: Uuid) -> Result<Monitor> {
        match self.store.get_monitor(id).await {
            Ok(Some(monitor)) => return Ok(monitor),
            Ok(None) => {}
            Err(err) => warn!("monitor cache read failed for {id}: {err}"),
        }
        let monitor = self.repo.get_by_id(id).await?;
        if let Err(err) = self.store.set_monitor(&monitor).await {
            // A failed cache fill costs one extra DB read next time, nothing
            // more.
            warn!("failed to cache monitor {id}: {err}");
        }
        Ok(monitor)
    }

    async fn schedule_monitor(&self, id: Uuid, interval_sec: i32, caller: &'static str) {
        let run_at = Utc::now() + chrono::Duration::seconds(i64::from(interval_sec));
        if let Err(err) = self.store.schedule(&id.to_string(), run_at).await {
            warn!("schedule of monitor {id} failed (from {caller}): {err}, deferring");
            let deferred = DeferredSchedule {
                monitor_id: id,
                run_at,
            };
            if self.deferred_tx.try_send(deferred).is_err() {
                error!("deferred re-schedule queue full, dropping update for monitor {id}");
                counter!("reschedule_dropped_total").increment(1);
            }
        }
    }
}

/// Retries deferred schedule writes with linear backoff until they stick or
/// the attempt budget runs out.
async fn drain_deferred(store: Store, mut rx: mpsc::Receiver<DeferredSchedule>) {
    while let Some(entry) = rx.recv().await {
        let member = entry.monitor_id.to_string();
        let mut attempt: u64 = 0;
        loop {
            match store.schedule(&member, entry.run_at).await {
                Ok(()) => {
                    debug!("deferred re-schedule of monitor {} landed", entry.monitor_id);
                    break;
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= DEFERRED_MAX_ATTEMPTS {
                        error!(
                            "giving up deferred re-schedule of monitor {}: {err}",
                            entry.monitor_id
                        );
                        counter!("reschedule_dropped_total").increment(1);
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(500 * attempt)).await;
                }
            }
        }
    }
}

fn validate_create(cmd: &CreateMonitor) -> Result<()> {
    fn invalid(msg: &str) -> Error {
        Error::with_message(ErrorKind::InvalidInput, msg).with_op("service.monitor.create")
    }

    let url = url::Url::parse(&cmd.url).map_err(|_| invalid("url is not parseable"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("url scheme must be http or https"));
    }
    if cmd.interval_sec < 10 {
        return Err(invalid("interval_sec must be at least 10"));
    }
    if !(100..=599).contains(&cmd.expected_status) {
        return Err(invalid("expected_status must be a valid HTTP status"));
    }
    if cmd.latency_threshold_ms <= 0 {
        return Err(invalid("latency_threshold_ms must be positive"));
    }
    if cmd.alert_email.is_empty() || !cmd.alert_email.contains('@') {
        return Err(invalid("alert_email must be an email address"));
    }
    Ok(())
}
