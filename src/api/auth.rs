use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::state::ApiState;

/// Validates requests against the configured API key. Accepts
/// `Authorization: Bearer <key>` or `x-api-key: <key>`; with no key
/// configured, protected routes are closed.
pub async fn auth_middleware(
    State(state): State<ApiState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = state.state.config.read().await;

    let api_config = config.api.as_ref().ok_or(StatusCode::FORBIDDEN)?;
    let configured_key = api_config.api_key.as_ref().ok_or(StatusCode::FORBIDDEN)?;

    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    let api_key_header = headers.get("x-api-key").and_then(|h| h.to_str().ok());

    match (auth_header, api_key_header) {
        (Some(token), _) if token == configured_key => {}
        (_, Some(key)) if key == configured_key => {}
        _ => return Err(StatusCode::UNAUTHORIZED),
    }
    drop(config);

    Ok(next.run(request).await)
}
