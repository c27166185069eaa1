use chrono::Utc;
use common::HttpResult;
use errors::Result;
use log::{debug, error};
use metrics::counter;

use super::ResultProcessor;

impl ResultProcessor {
    /// Records the healthy observation and closes any open outage. The lease
    /// ack and the re-schedule always run, even when the bookkeeping fails:
    /// a hiccup while persisting state must not stop the monitor's cadence.
    pub(crate) async fn handle_success(&self, r: HttpResult) {
        if let Err(err) = self.record_recovery(&r).await {
            error!(
                "recovery bookkeeping failed for monitor {}: {err}",
                r.monitor_id
            );
        }

        if let Err(err) = self.store.ack_job(r.monitor_id).await {
            error!("failed to ack lease of monitor {}: {err}", r.monitor_id);
        }
        let next_run = Utc::now() + chrono::Duration::seconds(i64::from(r.interval_sec));
        if let Err(err) = self
            .store
            .schedule(&r.monitor_id.to_string(), next_run)
            .await
        {
            error!("failed to re-schedule monitor {}: {err}", r.monitor_id);
        }
    }

    async fn record_recovery(&self, r: &HttpResult) -> Result<()> {
        let id = r.monitor_id;

        if let Err(err) = self
            .store
            .store_status(id, r.status, r.latency_ms, r.checked_at)
            .await
        {
            // Status is a convenience view; losing one write must not block
            // incident recovery below.
            error!("failed to store status of monitor {id}: {err}");
        }

        let Some(incident) = self.store.get_incident(id).await? else {
            let _ = self.store.clear_retry(id).await;
            return Ok(());
        };

        if incident.get("db_incident").map(String::as_str) == Some("true") {
            // Close the durable row before clearing the Redis hash: if we
            // crash in between, the next success retries the close; the
            // reverse order would leave the row open forever.
            match self.incidents.close_incident(id, Utc::now()).await {
                Ok(()) => debug!("closed db incident for monitor {id}"),
                Err(err) if err.is_not_found() => {
                    // Marker without a row: the previous alerting worker
                    // crashed between the marker write and the insert.
                    debug!("no open db incident for monitor {id}, marker was stale");
                }
                Err(err) => return Err(err),
            }
        }

        self.store.clear_incident(id).await?;
        let _ = self.store.clear_retry(id).await;
        counter!("incidents_recovered_total").increment(1);
        debug!("monitor {id} recovered");
        Ok(())
    }
}
