//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        .route("/reconcile", post(handlers::trigger_reconcile));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::directory::InMemoryDirectory;
    use crate::roster::StaticRoster;
    use crate::scheduler::{Reconciler, Scheduler};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<Scheduler>, mpsc::Receiver<()>) {
        let config = DaemonConfig::development();
        let directory = Arc::new(InMemoryDirectory::new(config.guild()));
        let reconciler = Arc::new(Reconciler::new(
            directory,
            Arc::new(StaticRoster::new()),
            &config,
        ));
        let (scheduler, rx) = Scheduler::new(config.scheduler.clone(), reconciler);
        (create_router(AppState::new(scheduler.clone())), scheduler, rx)
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _rx) = app();
        let response = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_status_reports_bindings_and_last_tick() {
        let (app, scheduler, _rx) = app();
        scheduler.reconcile_once().await;

        let response = app
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["guild_id"], "dev-guild");
        assert_eq!(body["teams"][0]["side"], "red");
        assert_eq!(body["teams"][1]["role"], "Blue");
        assert_eq!(body["scheduler"]["ticks"], 1);
        assert_eq!(body["scheduler"]["last_tick"]["guild_available"], true);
    }

    #[tokio::test]
    async fn test_trigger_queues_tick() {
        let (app, _, mut rx) = app();
        let response = app
            .oneshot(
                Request::post("/api/v1/reconcile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_trigger_after_loop_exit_is_unavailable() {
        let (app, _, rx) = app();
        drop(rx);

        let response = app
            .oneshot(
                Request::post("/api/v1/reconcile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["code"], "UNAVAILABLE");
    }
}
