use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber and the `log` macro bridge.
///
/// `RUST_LOG` wins when set; otherwise development environments default to
/// `debug` for the workspace crates and `info` elsewhere. Returns the
/// non-blocking writer guard when a log directory is configured; it must be
/// held for the lifetime of the process or buffered lines are lost.
pub fn init(service_name: &str, env: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let _ = LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init();

    let default_filter = if env == "development" {
        format!("info,{service_name}=debug,engine=debug,store=debug,monitors=debug")
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let file_appender = log_dir.and_then(|dir| {
        tracing_appender::rolling::Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(service_name)
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| eprintln!("file logging disabled: {e}"))
            .ok()
    });

    match file_appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .try_init();
            None
        }
    }
}
