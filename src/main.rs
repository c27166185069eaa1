use std::process;
use std::sync::Arc;
use std::time::Duration;

use common::{Config, State};
use engine::{Engine, LogNotifier, Notifier, WebhookNotifier};
use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;
use monitors::{IncidentRepository, MonitorRegistry, MonitorRepository};
use probe::HttpProber;
use pulsemon::api::{self, ApiState};
use store::Store;

#[tokio::main]
async fn main() {
    let config_path =
        std::env::var("PULSEMON_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load {config_path}: {err}");
            process::exit(1);
        }
    };

    let log_dir = config.log_dir.as_deref().map(std::path::Path::new);
    let _log_guard = utils::logger::init(&config.service_name, &config.env, log_dir);
    info!("logger initialized");

    // The recorder must exist before any pipeline task touches a metric.
    let prometheus_handle = PrometheusBuilder::new().install_recorder().ok();

    let state = match State::new(config.clone()).await {
        Ok(state) => state,
        Err(err) => {
            error!("failed to initialize shared state: {err}");
            process::exit(1);
        }
    };

    let store = Store::redis(state.redis.clone());
    let registry = MonitorRegistry::new(MonitorRepository::new(state.db.clone()), store.clone());
    let incidents = Arc::new(IncidentRepository::new(state.db.clone()));

    let client = match probe::build_client() {
        Ok(client) => client,
        Err(err) => {
            error!("failed to build http client: {err}");
            process::exit(1);
        }
    };
    let prober = Arc::new(HttpProber::new(
        client,
        Duration::from_secs(config.executor.http_request_timeout_secs),
    ));

    let notifier: Arc<dyn Notifier> = match &config.alert.webhook_url {
        Some(url) => match WebhookNotifier::new(url.clone()) {
            Ok(notifier) => Arc::new(notifier),
            Err(err) => {
                error!("failed to build webhook notifier: {err}");
                process::exit(1);
            }
        },
        None => Arc::new(LogNotifier),
    };

    let engine = Engine {
        store: store.clone(),
        directory: registry.clone(),
        incidents,
        prober,
        notifier,
    };
    let engine_handle = engine.start(&config);

    let api_state = ApiState {
        state: state.clone(),
        registry,
        store,
        prometheus_handle,
    };
    let port = config.api.as_ref().map(|api| api.port).unwrap_or(8080);
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind api port {port}: {err}");
            process::exit(1);
        }
    };
    info!("api listening on :{port}");

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let app = api::router(api_state);
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = api_shutdown_rx.await;
            })
            .await
        {
            error!("api server error: {err}");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    // Stop taking requests first, then drain the pipeline stage by stage.
    let _ = api_shutdown_tx.send(());
    let _ = server.await;
    engine_handle.shutdown().await;

    info!("graceful shutdown complete");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
