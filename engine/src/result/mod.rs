//! Turns probe outcomes into state-machine transitions and re-schedules,
//! emitting at most one alert per outage.

mod failure;
mod success;

use std::sync::Arc;

use common::model::config::ResultProcessorConfig;
use common::{AlertEvent, HttpResult};
use log::{info, warn};
use store::Store;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::{IncidentSink, MonitorDirectory};

pub struct ResultProcessor {
    success_worker_count: usize,
    failure_worker_count: usize,
    success_channel_size: usize,
    failure_channel_size: usize,
    retry_max_attempts: i64,
    incident_alert_threshold: i64,
    store: Store,
    directory: Arc<dyn MonitorDirectory>,
    incidents: Arc<dyn IncidentSink>,
}

pub struct ResultWorkers {
    pub router: JoinHandle<()>,
    pub workers: Vec<JoinHandle<()>>,
}

impl ResultProcessor {
    pub fn new(
        config: &ResultProcessorConfig,
        store: Store,
        directory: Arc<dyn MonitorDirectory>,
        incidents: Arc<dyn IncidentSink>,
    ) -> Self {
        Self {
            success_worker_count: config.success_worker_count,
            failure_worker_count: config.failure_worker_count,
            success_channel_size: config.success_channel_size,
            failure_channel_size: config.failure_channel_size,
            retry_max_attempts: config.retry_max_attempts,
            incident_alert_threshold: config.incident_alert_threshold,
            store,
            directory,
            incidents,
        }
    }

    /// Spawns the router and the success/failure worker pools. The router
    /// owns the downstream senders, so when the result channel closes both
    /// worker channels close behind it and everything drains in order.
    pub fn start(
        self: Arc<Self>,
        result_rx: mpsc::Receiver<HttpResult>,
        alert_tx: mpsc::Sender<AlertEvent>,
    ) -> ResultWorkers {
        let (success_tx, success_rx) = mpsc::channel(self.success_channel_size);
        let (failure_tx, failure_rx) = mpsc::channel(self.failure_channel_size);
        let success_rx = Arc::new(Mutex::new(success_rx));
        let failure_rx = Arc::new(Mutex::new(failure_rx));

        let mut workers = Vec::with_capacity(self.success_worker_count + self.failure_worker_count);
        for _ in 0..self.success_worker_count {
            workers.push(tokio::spawn(success_worker(self.clone(), success_rx.clone())));
        }
        for _ in 0..self.failure_worker_count {
            workers.push(tokio::spawn(failure_worker(
                self.clone(),
                failure_rx.clone(),
                alert_tx.clone(),
            )));
        }
        let router = tokio::spawn(route(result_rx, success_tx, failure_tx));
        info!(
            "result processor started ({} success / {} failure workers)",
            self.success_worker_count, self.failure_worker_count
        );
        ResultWorkers { router, workers }
    }
}

async fn route(
    mut result_rx: mpsc::Receiver<HttpResult>,
    success_tx: mpsc::Sender<HttpResult>,
    failure_tx: mpsc::Sender<HttpResult>,
) {
    while let Some(result) = result_rx.recv().await {
        let routed = if result.success {
            success_tx.send(result).await
        } else {
            failure_tx.send(result).await
        };
        if routed.is_err() {
            warn!("result workers gone, dropping remaining results");
            break;
        }
    }
    // Dropping the senders here closes both worker channels.
}

async fn success_worker(
    processor: Arc<ResultProcessor>,
    rx: Arc<Mutex<mpsc::Receiver<HttpResult>>>,
) {
    loop {
        let result = { rx.lock().await.recv().await };
        let Some(result) = result else { break };
        processor.handle_success(result).await;
    }
}

async fn failure_worker(
    processor: Arc<ResultProcessor>,
    rx: Arc<Mutex<mpsc::Receiver<HttpResult>>>,
    alert_tx: mpsc::Sender<AlertEvent>,
) {
    loop {
        let result = { rx.lock().await.recv().await };
        let Some(result) = result else { break };
        processor.handle_failure(result, &alert_tx).await;
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use common::{CheckReason, Monitor};
    use errors::{Error, ErrorKind, Result};
    use uuid::Uuid;

    use super::*;

    /// Directory stub that records every re-schedule request.
    #[derive(Default)]
    pub struct RecordingDirectory {
        pub rescheduled: StdMutex<Vec<(Uuid, i32, &'static str)>>,
    }

    #[async_trait]
    impl MonitorDirectory for RecordingDirectory {
        async fn load_monitor(&self, _id: Uuid) -> Result<Monitor> {
            Err(Error::with_message(ErrorKind::NotFound, "not used by these tests"))
        }

        async fn schedule_monitor(&self, id: Uuid, interval_sec: i32, caller: &'static str) {
            self.rescheduled.lock().unwrap().push((id, interval_sec, caller));
        }
    }

    /// Incident sink stub tracking open rows per monitor.
    #[derive(Default)]
    pub struct RecordingSink {
        pub created: StdMutex<Vec<Uuid>>,
        pub closed: StdMutex<Vec<Uuid>>,
        pub open: StdMutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl IncidentSink for RecordingSink {
        async fn create(&self, _start_time: DateTime<Utc>, result: &HttpResult) -> Result<()> {
            self.created.lock().unwrap().push(result.monitor_id);
            self.open.lock().unwrap().push(result.monitor_id);
            Ok(())
        }

        async fn close_incident(&self, monitor_id: Uuid, _end_time: DateTime<Utc>) -> Result<()> {
            let mut open = self.open.lock().unwrap();
            match open.iter().position(|id| *id == monitor_id) {
                Some(index) => {
                    open.remove(index);
                    self.closed.lock().unwrap().push(monitor_id);
                    Ok(())
                }
                None => Err(Error::with_message(ErrorKind::NotFound, "no open incident")),
            }
        }
    }

    pub fn processor_config() -> ResultProcessorConfig {
        ResultProcessorConfig {
            success_worker_count: 1,
            failure_worker_count: 1,
            success_channel_size: 16,
            failure_channel_size: 16,
            retry_max_attempts: 2,
            incident_alert_threshold: 3,
        }
    }

    pub fn processor(
        store: Store,
        directory: Arc<RecordingDirectory>,
        incidents: Arc<RecordingSink>,
    ) -> Arc<ResultProcessor> {
        Arc::new(ResultProcessor::new(
            &processor_config(),
            store,
            directory,
            incidents,
        ))
    }

    pub fn success_result(id: Uuid) -> HttpResult {
        HttpResult {
            monitor_id: id,
            success: true,
            status: 200,
            latency_ms: 120,
            reason: CheckReason::None,
            retryable: false,
            checked_at: Utc::now(),
            interval_sec: 60,
        }
    }

    pub fn failure_result(id: Uuid, reason: CheckReason, retryable: bool) -> HttpResult {
        HttpResult {
            monitor_id: id,
            success: false,
            status: if reason == CheckReason::None { 503 } else { -1 },
            latency_ms: 0,
            reason,
            retryable,
            checked_at: Utc::now(),
            interval_sec: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::CheckReason;
    use uuid::Uuid;

    use super::testutil::*;
    use super::*;

    #[tokio::test]
    async fn router_splits_by_outcome_and_drains_on_close() {
        let store = Store::memory();
        let directory = Arc::new(RecordingDirectory::default());
        let incidents = Arc::new(RecordingSink::default());
        let processor = processor(store.clone(), directory, incidents);

        let (result_tx, result_rx) = mpsc::channel(16);
        let (alert_tx, _alert_rx) = mpsc::channel(16);
        let handles = processor.start(result_rx, alert_tx);

        let ok_id = Uuid::new_v4();
        let bad_id = Uuid::new_v4();
        result_tx.send(success_result(ok_id)).await.unwrap();
        result_tx
            .send(failure_result(bad_id, CheckReason::None, false))
            .await
            .unwrap();
        drop(result_tx);

        tokio::time::timeout(Duration::from_secs(2), async {
            handles.router.await.unwrap();
            for worker in handles.workers {
                worker.await.unwrap();
            }
        })
        .await
        .expect("pipeline drains after result channel closes");

        // Success path re-scheduled directly through the store.
        assert!(store
            .schedule_score(&ok_id.to_string())
            .await
            .unwrap()
            .is_some());
        // Failure path opened a redis incident.
        assert!(store.get_incident(bad_id).await.unwrap().is_some());
    }
}
