//! End-to-end pipeline runs over the in-process store: schedule → lease →
//! probe → result → re-schedule, with scripted probe outcomes standing in
//! for the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::model::config::{
    AlertConfig, ApiConfig, AppConfig, Config, DbConfig, ExecutorConfig, RedisConfig,
    ReclaimerConfig, ResultProcessorConfig, SchedulerConfig,
};
use common::{AlertEvent, CheckReason, HttpResult, Monitor};
use engine::{Engine, IncidentSink, MonitorDirectory, Notifier};
use errors::{Error, ErrorKind, Result};
use probe::Probe;
use store::Store;
use uuid::Uuid;

fn engine_config() -> Config {
    Config {
        env: "development".to_string(),
        service_name: "pulsemon-test".to_string(),
        log_dir: None,
        api: Some(ApiConfig {
            port: 0,
            api_key: None,
        }),
        redis: RedisConfig {
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_username: None,
            redis_password: None,
            pool_size: None,
        },
        db: DbConfig {
            database_host: "127.0.0.1".to_string(),
            database_port: 5432,
            database_user: "test".to_string(),
            database_password: "test".to_string(),
            database_name: "test".to_string(),
            database_schema: "public".to_string(),
        },
        app: AppConfig {
            job_channel_size: 100,
            result_channel_size: 100,
            alert_channel_size: 100,
        },
        scheduler: SchedulerConfig {
            interval_secs: 1,
            batch_size: 100,
            visibility_timeout_secs: 30,
        },
        reclaimer: ReclaimerConfig {
            interval_secs: 1,
            limit: 100,
        },
        executor: ExecutorConfig {
            worker_count: 5,
            http_semaphore_count: 16,
            http_request_timeout_secs: 15,
        },
        result_processor: ResultProcessorConfig {
            success_worker_count: 2,
            failure_worker_count: 2,
            success_channel_size: 100,
            failure_channel_size: 100,
            retry_max_attempts: 2,
            incident_alert_threshold: 3,
        },
        alert: AlertConfig {
            worker_count: 2,
            webhook_url: None,
        },
    }
}

fn monitor(id: Uuid, interval_sec: i32) -> Monitor {
    Monitor {
        id,
        user_id: Uuid::new_v4(),
        url: "https://example.com/health".to_string(),
        alert_email: "ops@example.com".to_string(),
        interval_sec,
        timeout_sec: 10,
        latency_threshold_ms: 500,
        expected_status: 200,
        enabled: true,
    }
}

/// Directory stub that serves from a fixed map and re-schedules straight
/// into the store, like the real registry does.
struct MapDirectory {
    monitors: HashMap<Uuid, Monitor>,
    store: Store,
}

#[async_trait]
impl MonitorDirectory for MapDirectory {
    async fn load_monitor(&self, id: Uuid) -> Result<Monitor> {
        self.monitors
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::with_message(ErrorKind::NotFound, "monitor not found"))
    }

    async fn schedule_monitor(&self, id: Uuid, interval_sec: i32, _caller: &'static str) {
        let run_at = Utc::now() + chrono::Duration::seconds(i64::from(interval_sec));
        let _ = self.store.schedule(&id.to_string(), run_at).await;
    }
}

#[derive(Default)]
struct MemorySink {
    created: StdMutex<Vec<Uuid>>,
    closed: StdMutex<Vec<Uuid>>,
}

#[async_trait]
impl IncidentSink for MemorySink {
    async fn create(&self, _start_time: chrono::DateTime<Utc>, result: &HttpResult) -> Result<()> {
        self.created.lock().unwrap().push(result.monitor_id);
        Ok(())
    }

    async fn close_incident(&self, monitor_id: Uuid, _end_time: chrono::DateTime<Utc>) -> Result<()> {
        let created = self.created.lock().unwrap().iter().filter(|id| **id == monitor_id).count();
        let mut closed = self.closed.lock().unwrap();
        let already_closed = closed.iter().filter(|id| **id == monitor_id).count();
        if already_closed >= created {
            return Err(Error::with_message(ErrorKind::NotFound, "no open incident"));
        }
        closed.push(monitor_id);
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    Ok { status: i32, latency_ms: i64 },
    Fail { reason: CheckReason, retryable: bool },
    HttpError { status: i32 },
}

/// Plays back a per-monitor script of outcomes; repeats the last entry when
/// the script runs dry. Counts every probe.
struct ScriptedProber {
    scripts: StdMutex<HashMap<Uuid, Vec<Outcome>>>,
    probes: AtomicUsize,
}

impl ScriptedProber {
    fn new(scripts: HashMap<Uuid, Vec<Outcome>>) -> Self {
        Self {
            scripts: StdMutex::new(scripts),
            probes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Probe for ScriptedProber {
    async fn check(&self, monitor: &Monitor) -> HttpResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(monitor.id).or_insert_with(|| {
                vec![Outcome::Ok {
                    status: 200,
                    latency_ms: 100,
                }]
            });
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0]
            }
        };
        match outcome {
            Outcome::Ok { status, latency_ms } => HttpResult {
                monitor_id: monitor.id,
                success: status == monitor.expected_status
                    && latency_ms <= i64::from(monitor.latency_threshold_ms),
                status,
                latency_ms,
                reason: CheckReason::None,
                retryable: false,
                checked_at: Utc::now(),
                interval_sec: monitor.interval_sec,
            },
            Outcome::HttpError { status } => HttpResult {
                monitor_id: monitor.id,
                success: false,
                status,
                latency_ms: 10,
                reason: CheckReason::None,
                retryable: false,
                checked_at: Utc::now(),
                interval_sec: monitor.interval_sec,
            },
            Outcome::Fail { reason, retryable } => HttpResult {
                monitor_id: monitor.id,
                success: false,
                status: -1,
                latency_ms: 0,
                reason,
                retryable,
                checked_at: Utc::now(),
                interval_sec: monitor.interval_sec,
            },
        }
    }
}

/// Notifier that collects every delivered alert.
#[derive(Default)]
struct CollectingNotifier {
    delivered: StdMutex<Vec<AlertEvent>>,
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        self.delivered.lock().unwrap().push(*event);
        Ok(())
    }
}

async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..600 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

struct Pipeline {
    store: Store,
    sink: Arc<MemorySink>,
    prober: Arc<ScriptedProber>,
    notifier: Arc<CollectingNotifier>,
    handle: engine::EngineHandle,
}

fn start_pipeline(monitors: Vec<Monitor>, scripts: HashMap<Uuid, Vec<Outcome>>) -> Pipeline {
    let store = Store::memory();
    let directory = Arc::new(MapDirectory {
        monitors: monitors.into_iter().map(|m| (m.id, m)).collect(),
        store: store.clone(),
    });
    let sink = Arc::new(MemorySink::default());
    let prober = Arc::new(ScriptedProber::new(scripts));
    let notifier = Arc::new(CollectingNotifier::default());

    let engine = Engine {
        store: store.clone(),
        directory,
        incidents: sink.clone(),
        prober: prober.clone(),
        notifier: notifier.clone(),
    };
    let handle = engine.start(&engine_config());
    Pipeline {
        store,
        sink,
        prober,
        notifier,
        handle,
    }
}

#[tokio::test(start_paused = true)]
async fn green_path_records_status_and_reschedules() {
    let id = Uuid::new_v4();
    let pipeline = start_pipeline(
        vec![monitor(id, 60)],
        HashMap::from([(
            id,
            vec![Outcome::Ok {
                status: 200,
                latency_ms: 120,
            }],
        )]),
    );
    let before = Utc::now().timestamp_millis();
    pipeline.store.schedule(&id.to_string(), Utc::now()).await.unwrap();

    let p = &pipeline;
    wait_until("status hash", move || async move {
        p.store.get_status(id).await.unwrap().is_some()
    })
    .await;
    wait_until("re-schedule", move || async move {
        p.store
            .schedule_score(&id.to_string())
            .await
            .unwrap()
            .is_some()
    })
    .await;

    let status = pipeline.store.get_status(id).await.unwrap().unwrap();
    assert_eq!(status.get("status_code").map(String::as_str), Some("200"));
    assert_eq!(status.get("latency_ms").map(String::as_str), Some("120"));

    let score = pipeline
        .store
        .schedule_score(&id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert!(score >= before + 60_000, "next run one interval out");

    assert!(pipeline.store.get_incident(id).await.unwrap().is_none());
    assert!(pipeline.notifier.delivered.lock().unwrap().is_empty());
    assert!(pipeline.sink.created.lock().unwrap().is_empty());

    pipeline.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sustained_outage_alerts_once_and_recovers() {
    let id = Uuid::new_v4();
    // Three hard HTTP failures, then healthy forever.
    let pipeline = start_pipeline(
        vec![monitor(id, 0)],
        HashMap::from([(
            id,
            vec![
                Outcome::HttpError { status: 503 },
                Outcome::HttpError { status: 503 },
                Outcome::HttpError { status: 503 },
                Outcome::Ok {
                    status: 200,
                    latency_ms: 80,
                },
            ],
        )]),
    );
    pipeline.store.schedule(&id.to_string(), Utc::now()).await.unwrap();

    let p = &pipeline;
    wait_until("alert delivery", move || async move {
        !p.notifier.delivered.lock().unwrap().is_empty()
    })
    .await;
    wait_until("incident recovery", move || async move {
        p.store.get_incident(id).await.unwrap().is_none()
            && !p.sink.closed.lock().unwrap().is_empty()
    })
    .await;

    pipeline.handle.shutdown().await;

    // Exactly one alert, one db row opened, one db row closed.
    assert_eq!(pipeline.notifier.delivered.lock().unwrap().len(), 1);
    assert_eq!(*pipeline.sink.created.lock().unwrap(), vec![id]);
    assert_eq!(*pipeline.sink.closed.lock().unwrap(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn expired_lease_is_reclaimed_and_probed() {
    let id = Uuid::new_v4();
    let pipeline = start_pipeline(vec![monitor(id, 60)], HashMap::new());

    // A worker died holding this lease: it sits in inflight, already expired.
    pipeline.store.schedule(&id.to_string(), Utc::now()).await.unwrap();
    let leased = pipeline
        .store
        .fetch_and_move_to_inflight(Utc::now(), 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(leased.len(), 1);

    let p = &pipeline;
    wait_until("recovered probe", move || async move {
        p.prober.probes.load(Ordering::SeqCst) >= 1
    })
    .await;
    wait_until("status after recovery", move || async move {
        p.store.get_status(id).await.unwrap().is_some()
    })
    .await;

    pipeline.handle.shutdown().await;
    assert_eq!(pipeline.prober.probes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_url_parks_the_monitor() {
    let id = Uuid::new_v4();
    let pipeline = start_pipeline(
        vec![monitor(id, 60)],
        HashMap::from([(
            id,
            vec![Outcome::Fail {
                reason: CheckReason::InvalidRequest,
                retryable: false,
            }],
        )]),
    );
    pipeline.store.schedule(&id.to_string(), Utc::now()).await.unwrap();

    let p = &pipeline;
    wait_until("terminal status", move || async move {
        p.store.get_status(id).await.unwrap().is_some()
    })
    .await;

    pipeline.handle.shutdown().await;

    let status = pipeline.store.get_status(id).await.unwrap().unwrap();
    assert_eq!(status.get("status_code").map(String::as_str), Some("-1"));
    let member = id.to_string();
    assert_eq!(pipeline.store.schedule_score(&member).await.unwrap(), None);
    assert_eq!(pipeline.store.inflight_score(&member).await.unwrap(), None);
    assert!(pipeline.store.get_incident(id).await.unwrap().is_none());
    assert!(pipeline.notifier.delivered.lock().unwrap().is_empty());
    assert_eq!(pipeline.prober.probes.load(Ordering::SeqCst), 1);
}
