use chrono::Utc;
use common::{AlertEvent, HttpResult};
use log::{debug, error, info, warn};
use metrics::counter;
use tokio::sync::mpsc;

use super::ResultProcessor;

/// Delay before a fast retry of a transiently failing probe.
const RETRY_DELAY_SECS: i32 = 5;

impl ResultProcessor {
    /// Decision tree, in order: terminal misconfiguration parks the monitor;
    /// retryable faults burn the fast-retry budget; everything left runs the
    /// incident state machine with its at-most-once alert gate.
    pub(crate) async fn handle_failure(&self, r: HttpResult, alert_tx: &mpsc::Sender<AlertEvent>) {
        let id = r.monitor_id;
        debug!("monitor {id} check failed: {}", r.reason);

        if r.reason.is_terminal() {
            // User misconfiguration: record it where the user can see it,
            // release the lease, and take the monitor off the schedule so it
            // does not cycle through the reclaimer once per visibility window.
            info!("terminal failure ({}) for monitor {id}, parking it", r.reason);
            if let Err(err) = self
                .store
                .store_status(id, r.status, r.latency_ms, r.checked_at)
                .await
            {
                error!("failed to store terminal status of monitor {id}: {err}");
            }
            if let Err(err) = self.store.ack_job(id).await {
                error!("failed to ack lease of monitor {id}: {err}");
            }
            if let Err(err) = self.store.del_schedule(id).await {
                error!("failed to unschedule monitor {id}: {err}");
            }
            counter!("checks_terminal_total").increment(1);
            return;
        }

        if r.retryable {
            match self.store.increment_retry(id).await {
                Ok(count) if count <= self.retry_max_attempts => {
                    debug!(
                        "fast retry {count}/{} for monitor {id}",
                        self.retry_max_attempts
                    );
                    counter!("checks_retried_total").increment(1);
                    self.directory
                        .schedule_monitor(id, RETRY_DELAY_SECS, "result.failure_worker")
                        .await;
                    if let Err(err) = self.store.ack_job(id).await {
                        error!("failed to ack lease of monitor {id}: {err}");
                    }
                    return;
                }
                Ok(_) => {
                    // Budget spent; this burst is over, the failure is real.
                    if let Err(err) = self.store.clear_retry(id).await {
                        error!("failed to clear retry counter of monitor {id}: {err}");
                    }
                }
                Err(err) => {
                    error!("failed to bump retry counter of monitor {id}: {err}");
                    self.directory
                        .schedule_monitor(id, r.interval_sec, "result.failure_worker")
                        .await;
                    if let Err(err) = self.store.ack_job(id).await {
                        error!("failed to ack lease of monitor {id}: {err}");
                    }
                    return;
                }
            }
        }

        self.run_incident_machine(&r, alert_tx).await;

        self.directory
            .schedule_monitor(id, r.interval_sec, "result.failure_worker")
            .await;
        if let Err(err) = self.store.ack_job(id).await {
            error!("failed to ack lease of monitor {id}: {err}");
        }
    }

    async fn run_incident_machine(&self, r: &HttpResult, alert_tx: &mpsc::Sender<AlertEvent>) {
        let id = r.monitor_id;

        let (failure_count, first) = match self.store.increment_incident(id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("failed to bump incident counter of monitor {id}: {err}");
                return;
            }
        };
        if first {
            debug!("opened redis incident for monitor {id}");
        }
        if failure_count < self.incident_alert_threshold {
            debug!(
                "monitor {id} failure {failure_count}/{} before alerting",
                self.incident_alert_threshold
            );
            return;
        }

        // Atomic gate: exactly one worker (on any replica) gets true per
        // outage.
        match self.store.mark_incident_alerted_if_not_set(id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("monitor {id} already alerted for this outage");
                return;
            }
            Err(err) => {
                error!("alert gate failed for monitor {id}: {err}");
                return;
            }
        }

        info!("alerting for monitor {id} after {failure_count} hard failures");
        // Marker first: a crash between these two writes makes the next
        // success attempt a close that finds no row, which is tolerated.
        if let Err(err) = self.store.mark_db_incident_created(id).await {
            error!("failed to mark db incident for monitor {id}: {err}");
        }
        if let Err(err) = self.incidents.create(Utc::now(), r).await {
            error!("failed to create db incident for monitor {id}: {err}");
        }
        if alert_tx.send(AlertEvent { monitor_id: id }).await.is_err() {
            warn!("alert channel closed, dropping alert for monitor {id}");
        }
        counter!("alerts_emitted_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::CheckReason;
    use store::Store;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::result::testutil::*;

    struct Harness {
        store: Store,
        directory: Arc<RecordingDirectory>,
        incidents: Arc<RecordingSink>,
        processor: Arc<crate::ResultProcessor>,
        alert_tx: mpsc::Sender<common::AlertEvent>,
        alert_rx: mpsc::Receiver<common::AlertEvent>,
    }

    fn harness() -> Harness {
        let store = Store::memory();
        let directory = Arc::new(RecordingDirectory::default());
        let incidents = Arc::new(RecordingSink::default());
        let processor = processor(store.clone(), directory.clone(), incidents.clone());
        let (alert_tx, alert_rx) = mpsc::channel(16);
        Harness {
            store,
            directory,
            incidents,
            processor,
            alert_tx,
            alert_rx,
        }
    }

    #[tokio::test]
    async fn terminal_failure_parks_the_monitor() {
        let mut h = harness();
        let id = Uuid::new_v4();
        let member = id.to_string();
        h.store.schedule(&member, chrono::Utc::now()).await.unwrap();
        h.store
            .fetch_and_move_to_inflight(chrono::Utc::now(), 10, std::time::Duration::from_secs(30))
            .await
            .unwrap();

        let result = failure_result(id, CheckReason::InvalidRequest, false);
        h.processor.handle_failure(result, &h.alert_tx).await;

        // Status records the misconfiguration; the id is in neither set.
        let status = h.store.get_status(id).await.unwrap().unwrap();
        assert_eq!(status.get("status_code").map(String::as_str), Some("-1"));
        assert_eq!(h.store.schedule_score(&member).await.unwrap(), None);
        assert_eq!(h.store.inflight_score(&member).await.unwrap(), None);
        assert!(h.directory.rescheduled.lock().unwrap().is_empty());
        assert!(h.store.get_incident(id).await.unwrap().is_none());
        assert!(h.alert_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn retry_budget_then_incident_then_single_alert() {
        let mut h = harness();
        let id = Uuid::new_v4();

        // Two fast retries within budget.
        for attempt in 1..=2 {
            let result = failure_result(id, CheckReason::Timeout, true);
            h.processor.handle_failure(result, &h.alert_tx).await;
            let rescheduled = h.directory.rescheduled.lock().unwrap().clone();
            assert_eq!(rescheduled.len(), attempt);
            assert_eq!(rescheduled[attempt - 1].1, 5, "fast retry delay");
            assert!(h.store.get_incident(id).await.unwrap().is_none());
        }

        // Third retryable failure exhausts the budget: incident opens.
        let result = failure_result(id, CheckReason::Timeout, true);
        h.processor.handle_failure(result, &h.alert_tx).await;
        let incident = h.store.get_incident(id).await.unwrap().unwrap();
        assert_eq!(incident.get("failure_count").map(String::as_str), Some("1"));
        assert!(h.alert_rx.try_recv().is_err(), "no alert below threshold");
        // Retry counter was cleared with the budget.
        assert_eq!(h.store.increment_retry(id).await.unwrap(), 1);
        h.store.clear_retry(id).await.unwrap();

        // Two more hard failures reach the threshold; alert fires once.
        for _ in 0..2 {
            let result = failure_result(id, CheckReason::None, false);
            h.processor.handle_failure(result, &h.alert_tx).await;
        }
        let event = h.alert_rx.try_recv().expect("alert emitted at threshold");
        assert_eq!(event.monitor_id, id);
        assert_eq!(*h.incidents.created.lock().unwrap(), vec![id]);

        // Further hard failures never alert again within the same outage.
        for _ in 0..3 {
            let result = failure_result(id, CheckReason::None, false);
            h.processor.handle_failure(result, &h.alert_tx).await;
        }
        assert!(h.alert_rx.try_recv().is_err(), "at most one alert per outage");
        assert_eq!(h.incidents.created.lock().unwrap().len(), 1);

        // Every non-terminal failure re-scheduled the monitor.
        let rescheduled = h.directory.rescheduled.lock().unwrap().clone();
        assert_eq!(rescheduled.len(), 8);
        assert!(rescheduled[2..].iter().all(|(_, interval, _)| *interval == 60));
    }

    #[tokio::test]
    async fn non_retryable_failure_skips_the_retry_path() {
        let mut h = harness();
        let id = Uuid::new_v4();

        let result = failure_result(id, CheckReason::None, false);
        h.processor.handle_failure(result, &h.alert_tx).await;

        let incident = h.store.get_incident(id).await.unwrap().unwrap();
        assert_eq!(incident.get("failure_count").map(String::as_str), Some("1"));
        assert!(h.alert_rx.try_recv().is_err());
        // Fresh retry counter proves the retry path was never taken.
        assert_eq!(h.store.increment_retry(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hard_failure_releases_the_lease() {
        let mut h = harness();
        let id = Uuid::new_v4();
        let member = id.to_string();
        h.store.schedule(&member, chrono::Utc::now()).await.unwrap();
        h.store
            .fetch_and_move_to_inflight(chrono::Utc::now(), 10, std::time::Duration::from_secs(30))
            .await
            .unwrap();

        let result = failure_result(id, CheckReason::None, false);
        h.processor.handle_failure(result, &h.alert_tx).await;
        assert_eq!(h.store.inflight_score(&member).await.unwrap(), None);
        let _ = h.alert_rx.try_recv();
    }
}
