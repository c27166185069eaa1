use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::state::ApiState;
use crate::common::{CreateMonitor, Monitor};
use crate::errors::{Error, ErrorKind};

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: Uuid,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    50
}

pub async fn create_monitor(
    State(state): State<ApiState>,
    Json(cmd): Json<CreateMonitor>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let id = state.registry.create_monitor(cmd).await?;
    Ok(Json(CreatedResponse { id }))
}

pub async fn get_monitor(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<Monitor>, ApiError> {
    let monitor = state.registry.get_monitor(owner.user_id, id).await?;
    Ok(Json(monitor))
}

pub async fn list_monitors(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Monitor>>, ApiError> {
    let monitors = state
        .registry
        .list_monitors(query.user_id, query.limit, query.offset)
        .await?;
    Ok(Json(monitors))
}

pub async fn monitor_status(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    let status = state.registry.monitor_status(id).await?.ok_or_else(|| {
        ApiError::from(Error::with_message(
            ErrorKind::NotFound,
            "no observation recorded yet",
        ))
    })?;
    Ok(Json(status))
}

pub async fn enable_monitor(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<(), ApiError> {
    state.registry.set_enabled(owner.user_id, id, true).await?;
    Ok(())
}

pub async fn disable_monitor(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<(), ApiError> {
    state.registry.set_enabled(owner.user_id, id, false).await?;
    Ok(())
}
