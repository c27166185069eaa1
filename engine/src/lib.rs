//! The execution pipeline: scheduler → executor → result processor, with the
//! reclaimer recovering abandoned leases and the alert sink draining alert
//! events. All coordination state lives in the Redis store; the pipeline
//! reaches the outside world only through the two capability traits below.

pub mod alert;
pub mod engine;
pub mod executor;
pub mod reclaimer;
pub mod result;
pub mod scheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{HttpResult, Monitor};
use errors::Result;
use uuid::Uuid;

pub use alert::{AlertService, LogNotifier, Notifier, WebhookNotifier};
pub use engine::{Engine, EngineHandle};
pub use executor::Executor;
pub use reclaimer::Reclaimer;
pub use result::ResultProcessor;
pub use scheduler::Scheduler;

/// Read side of the monitor CRUD collaborator: load a monitor's config
/// (cache-through) and hand an id back to the schedule.
#[async_trait]
pub trait MonitorDirectory: Send + Sync + 'static {
    /// NotFound means the monitor was deleted; the caller drops the job.
    async fn load_monitor(&self, id: Uuid) -> Result<Monitor>;

    /// Best-effort re-schedule at `now + interval_sec`. Implementations
    /// absorb persistent store failures into their own retry queue; the
    /// pipeline never sees them. `caller` tags the origin for logs.
    async fn schedule_monitor(&self, id: Uuid, interval_sec: i32, caller: &'static str);
}

/// Durable incident rows. Both operations are idempotent under retry:
/// closing a monitor with no open row returns NotFound, which callers
/// swallow.
#[async_trait]
pub trait IncidentSink: Send + Sync + 'static {
    async fn create(&self, start_time: DateTime<Utc>, result: &HttpResult) -> Result<()>;
    async fn close_incident(&self, monitor_id: Uuid, end_time: DateTime<Utc>) -> Result<()>;
}
