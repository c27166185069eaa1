use std::sync::Arc;

use common::Config;
use log::info;
use probe::Probe;
use store::Store;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::alert::{AlertService, Notifier};
use crate::executor::Executor;
use crate::reclaimer::Reclaimer;
use crate::result::{ResultProcessor, ResultWorkers};
use crate::scheduler::Scheduler;
use crate::{IncidentSink, MonitorDirectory};

/// Everything the pipeline needs from the outside, wired together by
/// [`Engine::start`] into the running task graph.
pub struct Engine {
    pub store: Store,
    pub directory: Arc<dyn MonitorDirectory>,
    pub incidents: Arc<dyn IncidentSink>,
    pub prober: Arc<dyn Probe>,
    pub notifier: Arc<dyn Notifier>,
}

/// Handle over the running pipeline; consumed by [`EngineHandle::shutdown`].
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    reclaimer: JoinHandle<()>,
    executor: Executor,
    result_workers: ResultWorkers,
    alert_workers: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn start(self, config: &Config) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (job_tx, job_rx) = mpsc::channel(config.app.job_channel_size);
        let (result_tx, result_rx) = mpsc::channel(config.app.result_channel_size);
        let (alert_tx, alert_rx) = mpsc::channel(config.app.alert_channel_size);

        let reclaimer = Reclaimer::new(&config.reclaimer, self.store.clone(), shutdown_rx.clone());
        let reclaimer = tokio::spawn(reclaimer.run());

        // The scheduler owns the only job sender: when it exits, the job
        // channel closes and the executor workers drain out behind it.
        let scheduler = Scheduler::new(&config.scheduler, job_tx, self.store.clone(), shutdown_rx);
        let scheduler = tokio::spawn(scheduler.run());

        let mut executor = Executor::new(
            &config.executor,
            job_rx,
            result_tx,
            self.directory.clone(),
            self.prober,
        );
        executor.start_workers();

        let processor = Arc::new(ResultProcessor::new(
            &config.result_processor,
            self.store,
            self.directory,
            self.incidents,
        ));
        let result_workers = processor.start(result_rx, alert_tx);

        let alert_service = AlertService::new(&config.alert, self.notifier);
        let alert_workers = alert_service.start(alert_rx);

        info!("engine started");
        EngineHandle {
            shutdown_tx,
            scheduler,
            reclaimer,
            executor,
            result_workers,
            alert_workers,
        }
    }
}

impl EngineHandle {
    /// Ordered drain: scheduler and reclaimer stop first (leased work is
    /// recovered after restart), then each stage's channel closes as its
    /// upstream exits and the stage drains what it already holds.
    pub async fn shutdown(self) {
        info!("engine shutting down");
        let _ = self.shutdown_tx.send(true);

        let _ = self.scheduler.await;
        let _ = self.reclaimer.await;

        // Joins the workers, waits for detached probes, closes the result
        // channel.
        self.executor.stop().await;

        let _ = self.result_workers.router.await;
        for worker in self.result_workers.workers {
            let _ = worker.await;
        }
        for worker in self.alert_workers {
            let _ = worker.await;
        }
        info!("engine stopped");
    }
}
