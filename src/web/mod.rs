//! Web server module: a thin control surface over the engine.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::scheduler::Manager;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub manager: Arc<Manager>,
}

/// Web server for Warden.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, manager: Arc<Manager>) -> Self {
        Self {
            state: AppState { config, manager },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/health", get(handlers::handle_health))
            .route("/api/monitors", get(handlers::handle_get_monitors))
            .route("/api/monitors/{id}", get(handlers::handle_get_monitor))
            .route("/api/sync", post(handlers::handle_sync))
            .route(
                "/api/settings/latency-threshold",
                get(handlers::handle_get_latency_threshold)
                    .put(handlers::handle_set_latency_threshold),
            )
            .route(
                "/api/groups/{id}/maintenance",
                get(handlers::handle_group_maintenance),
            )
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::{self, Incident, Store};
    use crate::notify::NotificationQueue;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::Value;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    async fn setup() -> (NamedTempFile, Arc<Store>, Router) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        store
            .create_monitor(&db::Monitor {
                id: "m1".to_string(),
                group_id: "g1".to_string(),
                name: "Homepage".to_string(),
                url: "https://example.com".to_string(),
                ..Default::default()
            })
            .unwrap();

        let (queue, _rx) = NotificationQueue::new(10);
        let manager = Manager::new(store.clone(), EngineConfig::default(), queue).unwrap();
        manager.sync().await;

        let server = Server::new(ServerConfig::default(), manager);
        (tmp, store, server.routes())
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_get_monitors() {
        let (_tmp, _store, router) = setup().await;

        let resp = router.clone().oneshot(get("/api/monitors")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["name"], "Homepage");

        let resp = router.clone().oneshot(get("/api/monitors/m1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["url"], "https://example.com");

        let resp = router.oneshot(get("/api/monitors/nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_latency_threshold_roundtrip() {
        let (_tmp, store, router) = setup().await;

        let req = Request::builder()
            .method("PUT")
            .uri("/api/settings/latency-threshold")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"threshold": 750}"#))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.get_setting("latency_threshold").unwrap().as_deref(), Some("750"));

        let resp = router
            .clone()
            .oneshot(get("/api/settings/latency-threshold"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["threshold"], 750);

        let req = Request::builder()
            .method("PUT")
            .uri("/api/settings/latency-threshold")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"threshold": 0}"#))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_and_maintenance() {
        let (_tmp, store, router) = setup().await;
        store
            .create_incident(&Incident {
                id: "i1".to_string(),
                start_time: Utc::now() - ChronoDuration::minutes(1),
                end_time: Some(Utc::now() + ChronoDuration::hours(1)),
                affected_groups: vec!["g1".to_string()],
                ..Default::default()
            })
            .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/api/sync")
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = router
            .clone()
            .oneshot(get("/api/groups/g1/maintenance"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["in_maintenance"], true);

        let resp = router.oneshot(get("/api/health")).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["monitors"], 1);
    }
}
