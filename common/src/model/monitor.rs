use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-registered HTTP endpoint. Owned by the CRUD layer; the pipeline
/// consumes it read-only (the cached JSON form is this struct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub alert_email: String,
    pub interval_sec: i32,
    pub timeout_sec: i32,
    pub latency_threshold_ms: i32,
    pub expected_status: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMonitor {
    pub user_id: Uuid,
    pub url: String,
    pub alert_email: String,
    pub interval_sec: i32,
    pub timeout_sec: i32,
    pub latency_threshold_ms: i32,
    pub expected_status: i32,
}
