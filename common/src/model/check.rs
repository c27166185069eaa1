use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One leased unit of work: "probe this monitor now". Lives for at most a
/// few seconds between the scheduler and an executor worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPayload {
    pub monitor_id: Uuid,
}

/// Closed classification of probe failures. `None` means an HTTP response
/// was received and success is decided from status + latency alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckReason {
    None,
    InvalidRequest,
    DnsFailure,
    Timeout,
    NetworkTimeout,
    NetworkError,
    Unknown,
}

impl CheckReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckReason::None => "",
            CheckReason::InvalidRequest => "INVALID_REQUEST",
            CheckReason::DnsFailure => "DNS_FAILURE",
            CheckReason::Timeout => "TIMEOUT",
            CheckReason::NetworkTimeout => "NETWORK_TIMEOUT",
            CheckReason::NetworkError => "NETWORK_ERROR",
            CheckReason::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Terminal reasons indicate user misconfiguration; the monitor is
    /// parked instead of re-scheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckReason::InvalidRequest | CheckReason::DnsFailure)
    }
}

impl fmt::Display for CheckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one probe, routed by the result processor.
#[derive(Debug, Clone)]
pub struct HttpResult {
    pub monitor_id: Uuid,
    pub success: bool,
    pub status: i32,
    pub latency_ms: i64,
    pub reason: CheckReason,
    pub retryable: bool,
    pub checked_at: DateTime<Utc>,
    pub interval_sec: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEvent {
    pub monitor_id: Uuid,
}
