//! Feature switches and the shared API secret

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{AppState, signature};
use crate::api::error::ApiError;

/// Header carrying the inspection secret
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// Gate for inspection routes: the API must be enabled and, if a secret is
/// configured, the request must present it
pub async fn require_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.api.api_enabled {
        return Err(ApiError::BadRequest("API is disabled".to_string()));
    }

    if let Some(secret) = &state.api.api_secret {
        let presented = request
            .headers()
            .get(API_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());

        if !presented.is_some_and(|presented| signature::secrets_match(presented, secret)) {
            tracing::debug!("Rejected {} without a valid API secret", request.uri());
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

/// Gate for the webhook route
pub async fn require_webhook(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.api.webhook_enabled {
        return Err(ApiError::BadRequest("Webhook is disabled".to_string()));
    }

    Ok(next.run(request).await)
}
