use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use common::{CheckReason, HttpResult, Monitor};
use errors::{Error, ErrorKind, Result};
use log::warn;
use url::Url;

use crate::Probe;

/// Builds the single shared client every probe goes through, so connection
/// pooling and keep-alives actually help under thousands of monitors.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .tcp_keepalive(Duration::from_secs(30))
        .tcp_nodelay(true)
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .http2_keep_alive_interval(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::new(ErrorKind::Internal, Some(e)).with_op("probe.build_client"))
}

pub struct HttpProber {
    client: reqwest::Client,
    max_timeout: Duration,
}

impl HttpProber {
    /// `max_timeout` is the ceiling for per-monitor deadlines; config
    /// validation keeps it below the lease visibility timeout.
    pub fn new(client: reqwest::Client, max_timeout: Duration) -> Self {
        Self {
            client,
            max_timeout,
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn check(&self, monitor: &Monitor) -> HttpResult {
        let started = Instant::now();
        let deadline = effective_timeout(monitor.timeout_sec, self.max_timeout);

        let url = match Url::parse(&monitor.url) {
            Ok(url) => url,
            Err(e) => {
                // User misconfiguration; the result processor parks it.
                warn!(
                    "monitor {} has an unusable url {:?}: {e}",
                    monitor.id, monitor.url
                );
                return failure_result(monitor, CheckReason::InvalidRequest, false, 0);
            }
        };

        match self.client.get(url).timeout(deadline).send().await {
            Ok(response) => {
                let latency_ms = started.elapsed().as_millis() as i64;
                let status = i32::from(response.status().as_u16());
                HttpResult {
                    monitor_id: monitor.id,
                    success: meets_expectations(monitor, status, latency_ms),
                    status,
                    latency_ms,
                    reason: CheckReason::None,
                    retryable: false,
                    checked_at: Utc::now(),
                    interval_sec: monitor.interval_sec,
                }
            }
            Err(err) => {
                let (reason, retryable) = classify(&err);
                failure_result(monitor, reason, retryable, 0)
            }
        }
    }
}

fn failure_result(
    monitor: &Monitor,
    reason: CheckReason,
    retryable: bool,
    latency_ms: i64,
) -> HttpResult {
    HttpResult {
        monitor_id: monitor.id,
        success: false,
        status: -1,
        latency_ms,
        reason,
        retryable,
        checked_at: Utc::now(),
        interval_sec: monitor.interval_sec,
    }
}

fn meets_expectations(monitor: &Monitor, status: i32, latency_ms: i64) -> bool {
    status == monitor.expected_status && latency_ms <= i64::from(monitor.latency_threshold_ms)
}

/// Per-monitor deadline clamped into `[1s, ceiling]`; non-positive values
/// fall back to the ceiling.
fn effective_timeout(timeout_sec: i32, ceiling: Duration) -> Duration {
    if timeout_sec <= 0 {
        return ceiling;
    }
    Duration::from_secs(timeout_sec as u64).clamp(Duration::from_secs(1), ceiling)
}

fn classify(err: &reqwest::Error) -> (CheckReason, bool) {
    if err.is_builder() {
        return (CheckReason::InvalidRequest, false);
    }
    if err.is_timeout() {
        return (CheckReason::Timeout, true);
    }
    if source_chain_mentions(err, "dns") {
        return (CheckReason::DnsFailure, false);
    }
    if io_timed_out(err) {
        return (CheckReason::NetworkTimeout, true);
    }
    if err.is_connect() || err.is_body() || err.is_decode() {
        return (CheckReason::NetworkError, true);
    }
    (CheckReason::Unknown, true)
}

fn source_chain_mentions(err: &reqwest::Error, needle: &str) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.to_string().to_lowercase().contains(needle) {
            return true;
        }
        source = inner.source();
    }
    false
}

fn io_timed_out(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = inner.source();
    }
    false
}
