//! Control surface: REST endpoints plus the WebSocket reply channel.

mod routes;
mod ws;

pub use routes::TaskResult;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::coordinator::Coordinator;

/// Build the Axum router for the coordinator.
pub fn control_routes(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/scheduler/start", post(routes::start_scheduler))
        .route("/api/scheduler/stop", post(routes::stop_scheduler))
        .route("/api/tasks", post(routes::add_task))
        .route("/api/tasks/execute", post(routes::execute_task))
        .route("/api/tasks/{id}", delete(routes::remove_task))
        .route("/api/tasks/{id}/abort", post(routes::abort_task))
        .route("/api/interactions/respond", post(routes::respond))
        .route(
            "/api/executions/{id}/interactions",
            post(routes::interact),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(coordinator)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::engine::testing::{Script, ScriptedEngine};

    fn app(script: Script) -> Router {
        let (engine, _) = ScriptedEngine::new(script);
        let config = CoordinatorConfig::default()
            .with_max_concurrent(1)
            .with_teardown_grace(Duration::from_millis(50));
        let coordinator = Arc::new(Coordinator::new(config, engine).unwrap());
        control_routes(coordinator)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, TaskResult) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn add_task_returns_next_execution() {
        let app = app(Script::Complete);
        let (status, body) = call(
            &app,
            "POST",
            "/api/tasks",
            serde_json::json!({
                "id": "t1",
                "name": "Report",
                "schedule": {"type": "interval", "unit": "hour", "value": 1}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.success);
        assert!(body.next_execute_at.is_some());
    }

    #[tokio::test]
    async fn invalid_schedule_is_bad_request() {
        let app = app(Script::Complete);
        let (status, body) = call(
            &app,
            "POST",
            "/api/tasks",
            serde_json::json!({
                "id": "t1",
                "schedule": {"type": "interval", "unit": "week", "value": 1}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert!(body.error.unwrap().contains("unit"));
    }

    #[tokio::test]
    async fn remove_unknown_task_is_not_found() {
        let app = app(Script::Complete);
        let (status, body) = call(&app, "DELETE", "/api/tasks/ghost", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn second_execute_is_queued() {
        let app = app(Script::Gated);
        let (_, first) = call(
            &app,
            "POST",
            "/api/tasks/execute",
            serde_json::json!({"id": "a"}),
        )
        .await;
        assert!(first.execution_id.is_some());

        let (_, second) = call(
            &app,
            "POST",
            "/api/tasks/execute",
            serde_json::json!({"id": "b"}),
        )
        .await;
        assert!(second.success);
        assert_eq!(second.queued, Some(true));
        assert_eq!(second.position, Some(1));
    }

    #[tokio::test]
    async fn unmatched_reply_is_not_found() {
        let app = app(Script::Complete);
        let (status, body) = call(
            &app,
            "POST",
            "/api/interactions/respond",
            serde_json::json!({"requestId": "nope", "success": true, "result": true}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn interaction_for_unknown_execution_is_gone() {
        let app = app(Script::Complete);
        let uri = format!("/api/executions/{}/interactions", uuid::Uuid::new_v4());
        let (status, _) = call(
            &app,
            "POST",
            &uri,
            serde_json::json!({"interactType": "confirm", "prompt": "ok?"}),
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
    }
}
