//! The control-plane HTTP server (§4.8), grounded on the teacher's
//! callback-server axum idiom: a thin `Router` over shared `State`, built
//! once and served with graceful shutdown wired to the same cancellation
//! token as everything else.

mod assets;
mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(routes::run_handler))
        .route("/api/status", get(routes::status_handler))
        .route("/api/history", get(routes::history_handler))
        .route("/api/history/logs", get(routes::history_logs_handler))
        .route("/reload", post(routes::reload_handler))
        .route("/config", get(routes::config_handler))
        .route("/metrics", get(routes::metrics_handler))
        .route("/healthz", get(routes::healthz_handler))
        .route("/", get(assets::index_handler))
        .route("/{*path}", get(assets::asset_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arc_swap::ArcSwap;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::{EngineConfig, ListenerConfig};
    use crate::logcapture::LogCollector;
    use crate::metrics::Metrics;
    use crate::run_manager::RunManager;
    use crate::scheduler::TriggerManager;
    use crate::store::MemoryStore;

    use super::*;

    fn test_state() -> AppState {
        let config = EngineConfig {
            listener: ListenerConfig {
                addr: "0.0.0.0:8080".to_string(),
                tls_cert: None,
                tls_key: None,
            },
            cron: Vec::new(),
            state_dir: "/tmp/pbsflow-test".to_string(),
            log_level: "info".to_string(),
            workflow_config: serde_yaml::Value::Null,
        };
        let config = Arc::new(ArcSwap::new(Arc::new(config)));
        let run_manager = Arc::new(RunManager::new(
            Default::default(),
            Arc::new(MemoryStore::new(None)),
            LogCollector::new(),
        ));
        let triggers = Arc::new(TriggerManager::new(Vec::new(), run_manager.clone()).unwrap());
        AppState {
            config,
            config_path: "/tmp/pbsflow-test/config.yaml".into(),
            run_manager,
            triggers,
            metrics: Arc::new(Metrics::new()),
            build: state::BuildInfo::new(Utc::now()),
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok_as_plain_text() {
        let app = build_router(test_state());
        let request = axum::http::Request::builder()
            .uri("/healthz")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn status_reports_idle_run_with_no_history() {
        let app = build_router(test_state());
        let request = axum::http::Request::builder()
            .uri("/api/status")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["run"]["summary"].is_null());
        assert!(json["next_run"].is_null());
    }

    #[tokio::test]
    async fn run_with_unknown_workflow_is_rejected() {
        let app = build_router(test_state());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"workflows":["does-not-exist"]}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_is_served_as_yaml() {
        let app = build_router(test_state());
        let request = axum::http::Request::builder()
            .uri("/config")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(
            response.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
            "text/yaml"
        );
    }
}
