use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::model::config::AlertConfig;
use common::AlertEvent;
use errors::{Error, ErrorKind, Result};
use log::{error, info};
use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Delivery seam for alert events. The pipeline's contract ends at handing
/// one event per outage to a notifier; transport guarantees live behind it.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: &AlertEvent) -> Result<()>;
}

/// Default sink: the alert lands in the logs and the metrics.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        info!("ALERT monitor {} is down", event.monitor_id);
        Ok(())
    }
}

/// Posts each alert as JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::new(ErrorKind::Internal, Some(e)).with_op("alert.webhook"))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        let payload = serde_json::json!({
            "monitor_id": event.monitor_id,
            "fired_at": chrono::Utc::now(),
        });
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Error::new(ErrorKind::Dependency, Some(e)).with_op("alert.webhook"))?;
        Ok(())
    }
}

/// Fixed pool of workers draining the alert channel into the notifier.
pub struct AlertService {
    worker_count: usize,
    notifier: Arc<dyn Notifier>,
}

impl AlertService {
    pub fn new(config: &AlertConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            worker_count: config.worker_count,
            notifier,
        }
    }

    pub fn start(&self, alert_rx: mpsc::Receiver<AlertEvent>) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(alert_rx));
        let handles = (0..self.worker_count)
            .map(|_| {
                let rx = rx.clone();
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    loop {
                        let event = { rx.lock().await.recv().await };
                        let Some(event) = event else { break };
                        match notifier.notify(&event).await {
                            Ok(()) => {
                                counter!("alerts_delivered_total").increment(1);
                            }
                            Err(err) => {
                                error!(
                                    "failed to deliver alert for monitor {}: {err}",
                                    event.monitor_id
                                );
                                counter!("alerts_failed_total").increment(1);
                            }
                        }
                    }
                })
            })
            .collect();
        info!("alert service started {} workers", self.worker_count);
        handles
    }
}
