//! Webhook API Handler

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};
use renex_core::dto::hook::HookResponse;
use serde_json::Value as JsonValue;

use super::{AppState, signature};
use crate::api::error::{ApiError, ApiResult};

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
}

/// POST /hook
/// Queue an event batch for the repository a webhook is about
///
/// With a webhook secret configured, the delivery must carry a valid GitHub
/// signature or GitLab token; it is checked against the raw body before
/// anything is parsed.
pub async fn receive_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<HookResponse>> {
    if let Some(secret) = &state.api.webhook_secret {
        if !signature::authenticate(&headers, &body, secret) {
            tracing::warn!("Rejected webhook without a valid signature or token");
            return Err(ApiError::Unauthorized);
        }
    }

    if !is_json(&headers) {
        return Err(ApiError::BadRequest(
            "Content-Type must be application/json".to_string(),
        ));
    }

    let payload: JsonValue = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON payload: {}", e)))?;

    let response = state.hooks.handle(&headers, &payload).await?;
    Ok(Json(response))
}
