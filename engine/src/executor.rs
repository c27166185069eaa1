use std::sync::Arc;

use common::model::config::ExecutorConfig;
use common::{HttpResult, JobPayload};
use log::{debug, error, info, warn};
use metrics::{counter, gauge};
use probe::Probe;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::MonitorDirectory;

/// Drains the job channel with a fixed worker pool. Each worker loads the
/// monitor and hands the probe itself to a detached task bounded by the
/// global HTTP semaphore, so one slow endpoint never stalls job pickup.
pub struct Executor {
    worker_count: usize,
    http_sem_count: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<JobPayload>>>,
    result_tx: mpsc::Sender<HttpResult>,
    directory: Arc<dyn MonitorDirectory>,
    prober: Arc<dyn Probe>,
    http_sem: Arc<Semaphore>,
    workers: Vec<JoinHandle<()>>,
}

impl Executor {
    pub fn new(
        config: &ExecutorConfig,
        job_rx: mpsc::Receiver<JobPayload>,
        result_tx: mpsc::Sender<HttpResult>,
        directory: Arc<dyn MonitorDirectory>,
        prober: Arc<dyn Probe>,
    ) -> Self {
        Self {
            worker_count: config.worker_count,
            http_sem_count: config.http_semaphore_count,
            job_rx: Arc::new(Mutex::new(job_rx)),
            result_tx,
            directory,
            prober,
            http_sem: Arc::new(Semaphore::new(config.http_semaphore_count)),
            workers: Vec::new(),
        }
    }

    pub fn start_workers(&mut self) {
        for worker_id in 0..self.worker_count {
            self.workers.push(tokio::spawn(run_worker(
                worker_id,
                self.job_rx.clone(),
                self.result_tx.clone(),
                self.directory.clone(),
                self.prober.clone(),
                self.http_sem.clone(),
            )));
        }
        info!("executor started {} workers", self.worker_count);
    }

    /// Waits for the workers to drain the (closed) job channel, then for
    /// every detached probe task to finish. Dropping `self` afterwards closes
    /// the result channel.
    pub async fn stop(self) {
        for handle in self.workers {
            let _ = handle.await;
        }
        let _all_permits = self
            .http_sem
            .acquire_many(self.http_sem_count as u32)
            .await;
        info!("executor stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    job_rx: Arc<Mutex<mpsc::Receiver<JobPayload>>>,
    result_tx: mpsc::Sender<HttpResult>,
    directory: Arc<dyn MonitorDirectory>,
    prober: Arc<dyn Probe>,
    http_sem: Arc<Semaphore>,
) {
    loop {
        // One worker at a time parks on the receiver; the lock is released
        // before the job is processed.
        let job = { job_rx.lock().await.recv().await };
        let Some(job) = job else { break };
        debug!("worker {worker_id} picked up monitor {}", job.monitor_id);

        let monitor = match directory.load_monitor(job.monitor_id).await {
            Ok(monitor) => monitor,
            Err(err) => {
                if err.is_not_found() {
                    // Deleted monitor: drop silently, the delete path already
                    // removed its schedule entry.
                    debug!("monitor {} no longer exists, dropping job", job.monitor_id);
                    counter!("executor_jobs_dropped_total", "cause" => "deleted").increment(1);
                    continue;
                }
                // Transient load failure: push the job a few seconds out
                // instead of spinning on it.
                error!("failed to load monitor {}: {err}", job.monitor_id);
                directory
                    .schedule_monitor(job.monitor_id, 5, "executor.worker")
                    .await;
                counter!("executor_jobs_dropped_total", "cause" => "load_error").increment(1);
                continue;
            }
        };
        if !monitor.enabled {
            counter!("executor_jobs_dropped_total", "cause" => "disabled").increment(1);
            continue;
        }

        let permit = match http_sem.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let prober = prober.clone();
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            gauge!("executor_active_probes").increment(1.0);
            let result = prober.check(&monitor).await;
            gauge!("executor_active_probes").decrement(1.0);
            counter!(
                "executor_probes_total",
                "outcome" => if result.success { "success" } else { "failure" }
            )
            .increment(1);
            if result_tx.send(result).await.is_err() {
                warn!("result channel closed, dropping probe outcome");
            }
        });
    }
    debug!("executor worker {worker_id} exited");
}
