use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::api::auth::auth_middleware;
use crate::api::health;
use crate::api::monitors;
use crate::api::state::ApiState;

/// Configures the control-plane router.
///
/// # Routes
/// - Public:
///   - `GET /metrics`: Prometheus metrics
///   - `GET /health`: component health
/// - Protected (requires the configured API key):
///   - `POST /monitors`, `GET /monitors`, `GET /monitors/:id`
///   - `GET /monitors/:id/status`
///   - `POST /monitors/:id/enable`, `POST /monitors/:id/disable`
pub fn router(state: ApiState) -> Router {
    let protected_routes = Router::new()
        .route("/monitors", post(monitors::create_monitor).get(monitors::list_monitors))
        .route("/monitors/:id", get(monitors::get_monitor))
        .route("/monitors/:id/status", get(monitors::monitor_status))
        .route("/monitors/:id/enable", post(monitors::enable_monitor))
        .route("/monitors/:id/disable", post(monitors::disable_monitor))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health::health_check));

    protected_routes.merge(public_routes).with_state(state)
}

/// Renders the Prometheus registry in text format.
pub async fn metrics_handler(State(state): State<ApiState>) -> String {
    if let Some(handle) = &state.prometheus_handle {
        handle.render()
    } else {
        "Prometheus metrics not available (recorder not initialized)".to_string()
    }
}
