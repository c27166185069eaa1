pub mod model;
pub mod state;

pub use model::check::{AlertEvent, CheckReason, HttpResult, JobPayload};
pub use model::config::Config;
pub use model::monitor::{CreateMonitor, Monitor};
pub use state::State;
