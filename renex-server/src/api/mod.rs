//! API Module
//!
//! HTTP API layer of the executor.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod guard;
pub mod health;
pub mod hook;
pub mod jobs;
pub mod signature;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::producer::HookProducer;
use crate::scheduler::Scheduler;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub hooks: HookProducer,
    pub api: Arc<ApiConfig>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let inspection = Router::new()
        .route("/jobs", get(jobs::list_jobs))
        .route("/queue", get(jobs::list_queue))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_api,
        ));

    let webhooks = Router::new()
        .route("/hook", post(hook::receive_hook))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_webhook,
        ));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .merge(inspection)
        .merge(webhooks)
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::testing::{FakeDiscovery, FakeRunner, batch, repo};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use renex_core::WorkClass;
    use serde_json::{Value as JsonValue, json};
    use tower::ServiceExt;

    fn state(api: ApiConfig) -> AppState {
        let scheduler = Arc::new(Scheduler::new(FakeRunner::new(), SchedulerConfig::default()));
        let discovery = FakeDiscovery::new(vec![repo("api")]);
        AppState {
            hooks: HookProducer::new(discovery, scheduler.clone()),
            scheduler,
            api: Arc::new(api),
        }
    }

    fn enabled() -> ApiConfig {
        ApiConfig {
            api_enabled: true,
            webhook_enabled: true,
            ..ApiConfig::default()
        }
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn hook_request(event: &str, content_type: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/hook")
            .header(header::CONTENT_TYPE, content_type)
            .header("x-github-event", event)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state(ApiConfig::default()));
        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_inspection_disabled() {
        let app = create_router(state(ApiConfig::default()));

        let response = app.oneshot(get_request("/jobs")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "API is disabled");
    }

    #[tokio::test]
    async fn test_queue_and_jobs_by_class() {
        let state = state(enabled());
        state.scheduler.enqueue(batch(WorkClass::Scheduled, "a"));
        state.scheduler.enqueue(batch(WorkClass::Event, "b"));
        let app = create_router(state.clone());

        let response = app.clone().oneshot(get_request("/queue")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let queue = body_json(response).await;
        assert_eq!(queue["scheduled"].as_array().unwrap().len(), 1);
        assert_eq!(queue["event"][0]["type"], "event");
        assert_eq!(queue["event"][0]["repositories"][0]["path"], "acme/b");
        assert!(queue["event"][0]["queued_at"].is_string());

        state.scheduler.tick().await;

        let response = app.oneshot(get_request("/jobs")).await.unwrap();
        let jobs = body_json(response).await;
        assert_eq!(jobs["scheduled"].as_array().unwrap().len(), 1);
        assert_eq!(jobs["event"].as_array().unwrap().len(), 1);
        assert!(jobs["scheduled"][0]["started_at"].is_string());
    }

    #[tokio::test]
    async fn test_api_secret() {
        let app = create_router(state(ApiConfig {
            api_secret: Some("hunter2".to_string()),
            ..enabled()
        }));

        let response = app.clone().oneshot(get_request("/jobs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Unauthorized");

        let wrong = Request::builder()
            .uri("/queue")
            .header("x-api-secret", "guess")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let right = Request::builder()
            .uri("/queue")
            .header("x-api-secret", "hunter2")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(right).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_hook_queues_batch() {
        let state = state(enabled());
        let app = create_router(state.clone());
        let payload = json!({ "repository": { "full_name": "acme/api" } });

        let response = app
            .oneshot(hook_request("pull_request", "application/json", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        assert_eq!(body["event_kind"], "pull_request");
        assert_eq!(body["merge_request"], true);
        assert_eq!(
            body["batch_id"],
            state.scheduler.queue().event[0].batch.id.as_str()
        );
    }

    #[tokio::test]
    async fn test_hook_ignored_repository() {
        let app = create_router(state(enabled()));
        let payload = json!({ "repository": { "full_name": "acme/unknown" } });

        let response = app
            .oneshot(hook_request("push", "application/json; charset=utf-8", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ignored");
        assert!(body.get("batch_id").is_none());
    }

    #[tokio::test]
    async fn test_hook_rejections() {
        let payload = json!({ "repository": { "full_name": "acme/api" } });

        let app = create_router(state(ApiConfig::default()));
        let response = app
            .oneshot(hook_request("push", "application/json", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = create_router(state(enabled()));
        let response = app
            .clone()
            .oneshot(hook_request("push", "text/plain", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(hook_request("star", "application/json", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "event 'star' is not allowed"
        );
    }

    #[tokio::test]
    async fn test_hook_discovery_outage_is_internal_error() {
        let scheduler = Arc::new(Scheduler::new(FakeRunner::new(), SchedulerConfig::default()));
        let discovery = FakeDiscovery::new(vec![repo("api")]);
        discovery.fail_fetches(1);
        let app = create_router(AppState {
            hooks: HookProducer::new(discovery, scheduler.clone()),
            scheduler,
            api: Arc::new(enabled()),
        });
        let payload = json!({ "repository": { "full_name": "acme/api" } });

        let response = app
            .oneshot(hook_request("push", "application/json", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn secret_protected() -> ApiConfig {
        ApiConfig {
            webhook_secret: Some("whsec".to_string()),
            ..enabled()
        }
    }

    fn signed_hook_request(body: &str, name: &str, value: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/hook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-github-event", "push")
            .header(name, value)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_hook_signature_is_verified() {
        let state = state(secret_protected());
        let app = create_router(state.clone());
        let body = json!({ "repository": { "full_name": "acme/api" } }).to_string();

        let response = app
            .clone()
            .oneshot(signed_hook_request(
                &body,
                signature::GITHUB_SIGNATURE_HEADER,
                &signature::sign(body.as_bytes(), "whsec"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.scheduler.queue().event.len(), 1);

        let response = app
            .clone()
            .oneshot(signed_hook_request(
                &body,
                signature::GITHUB_SIGNATURE_HEADER,
                &signature::sign(body.as_bytes(), "guess"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // unsigned deliveries are refused once a secret is configured
        let response = app
            .oneshot(hook_request(
                "push",
                "application/json",
                json!({ "repository": { "full_name": "acme/api" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Unauthorized");
        assert_eq!(state.scheduler.queue().event.len(), 1);
    }

    #[tokio::test]
    async fn test_hook_gitlab_token_is_verified() {
        let app = create_router(state(secret_protected()));
        let body = json!({ "repository": { "full_name": "acme/api" } }).to_string();

        let response = app
            .clone()
            .oneshot(signed_hook_request(
                &body,
                signature::GITLAB_TOKEN_HEADER,
                "whsec",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(signed_hook_request(
                &body,
                signature::GITLAB_TOKEN_HEADER,
                "whsec2",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_hook_malformed_body() {
        let app = create_router(state(enabled()));
        let request = Request::builder()
            .method("POST")
            .uri("/hook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-github-event", "push")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
