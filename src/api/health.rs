use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::ApiState;

#[derive(Serialize)]
pub struct ComponentStatus {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentStatus {
    fn up() -> Self {
        Self {
            status: "up".to_string(),
            error: None,
        }
    }
    fn down(e: impl ToString) -> Self {
        Self {
            status: "down".to_string(),
            error: Some(e.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct Components {
    redis: ComponentStatus,
    db: ComponentStatus,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    components: Components,
}

pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let redis_status = match state.store.ping().await {
        Ok(_) => ComponentStatus::up(),
        Err(e) => ComponentStatus::down(e),
    };
    let db_status = match state.state.db.ping().await {
        Ok(_) => ComponentStatus::up(),
        Err(e) => ComponentStatus::down(e),
    };

    let global_status = if redis_status.status == "up" && db_status.status == "up" {
        "up"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: global_status.to_string(),
        components: Components {
            redis: redis_status,
            db: db_status,
        },
    })
}
