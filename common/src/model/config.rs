use errors::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub api_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedisConfig {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: u16,
    pub redis_username: Option<String>,
    pub redis_password: Option<String>,
    pub pool_size: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbConfig {
    pub database_host: String,
    pub database_port: u16,
    pub database_user: String,
    pub database_password: String,
    pub database_name: String,
    pub database_schema: String,
}

/// Capacities of the three top-level channels. These are the backpressure
/// points of the pipeline: a full job channel pushes work back into the
/// schedule set, a full result channel stalls probes, a full alert channel
/// stalls failure workers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub job_channel_size: usize,
    pub result_channel_size: usize,
    pub alert_channel_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub visibility_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReclaimerConfig {
    pub interval_secs: u64,
    pub limit: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutorConfig {
    pub worker_count: usize,
    pub http_semaphore_count: usize,
    #[serde(default = "default_http_request_timeout_secs")]
    pub http_request_timeout_secs: u64,
}

fn default_http_request_timeout_secs() -> u64 {
    15
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResultProcessorConfig {
    pub success_worker_count: usize,
    pub failure_worker_count: usize,
    pub success_channel_size: usize,
    pub failure_channel_size: usize,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: i64,
    #[serde(default = "default_incident_alert_threshold")]
    pub incident_alert_threshold: i64,
}

fn default_retry_max_attempts() -> i64 {
    2
}

fn default_incident_alert_threshold() -> i64 {
    3
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlertConfig {
    pub worker_count: usize,
    pub webhook_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub env: String,
    pub service_name: String,
    pub log_dir: Option<String>,
    pub api: Option<ApiConfig>,
    pub redis: RedisConfig,
    pub db: DbConfig,
    pub app: AppConfig,
    pub scheduler: SchedulerConfig,
    pub reclaimer: ReclaimerConfig,
    pub executor: ExecutorConfig,
    pub result_processor: ResultProcessorConfig,
    pub alert: AlertConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, Some(e)).with_op("config.load"))?;
        let config: Config = toml::from_str(&config_str)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, Some(e)).with_op("config.load"))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would break the recovery contract: every
    /// probe deadline must fit inside its lease, and expired leases must be
    /// noticed before they pile up.
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: String) -> Error {
            Error::with_message(ErrorKind::InvalidInput, msg).with_op("config.validate")
        }

        if self.scheduler.interval_secs == 0 {
            return Err(invalid("scheduler.interval_secs must be > 0".into()));
        }
        if self.scheduler.batch_size == 0 {
            return Err(invalid("scheduler.batch_size must be > 0".into()));
        }
        if self.reclaimer.interval_secs == 0 {
            return Err(invalid("reclaimer.interval_secs must be > 0".into()));
        }
        if self.reclaimer.limit == 0 {
            return Err(invalid("reclaimer.limit must be > 0".into()));
        }
        if !(5..=200).contains(&self.executor.worker_count) {
            return Err(invalid(format!(
                "executor.worker_count must be in 5..=200, got {}",
                self.executor.worker_count
            )));
        }
        if !(5..=6000).contains(&self.executor.http_semaphore_count) {
            return Err(invalid(format!(
                "executor.http_semaphore_count must be in 5..=6000, got {}",
                self.executor.http_semaphore_count
            )));
        }
        for (name, size) in [
            ("app.job_channel_size", self.app.job_channel_size),
            ("app.result_channel_size", self.app.result_channel_size),
            ("app.alert_channel_size", self.app.alert_channel_size),
        ] {
            if !(100..=5000).contains(&size) {
                return Err(invalid(format!("{name} must be in 100..=5000, got {size}")));
            }
        }
        if self.result_processor.success_worker_count == 0
            || self.result_processor.failure_worker_count == 0
        {
            return Err(invalid("result_processor worker counts must be > 0".into()));
        }
        if self.result_processor.retry_max_attempts < 0 {
            return Err(invalid("result_processor.retry_max_attempts must be >= 0".into()));
        }
        if self.result_processor.incident_alert_threshold < 1 {
            return Err(invalid(
                "result_processor.incident_alert_threshold must be >= 1".into(),
            ));
        }
        if self.alert.worker_count == 0 {
            return Err(invalid("alert.worker_count must be > 0".into()));
        }

        // Recovery contract: a slow-but-alive probe must never outlive its
        // lease, and expired leases must be reclaimed promptly.
        if self.scheduler.visibility_timeout_secs <= self.executor.http_request_timeout_secs {
            return Err(invalid(format!(
                "scheduler.visibility_timeout_secs ({}) must be > executor.http_request_timeout_secs ({})",
                self.scheduler.visibility_timeout_secs, self.executor.http_request_timeout_secs
            )));
        }
        if self.reclaimer.interval_secs >= self.scheduler.visibility_timeout_secs {
            return Err(invalid(format!(
                "reclaimer.interval_secs ({}) must be < scheduler.visibility_timeout_secs ({})",
                self.reclaimer.interval_secs, self.scheduler.visibility_timeout_secs
            )));
        }

        Ok(())
    }
}
