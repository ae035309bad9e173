//! Builds the `axum::Router` exposing exactly this project's HTTP surface,
//! mirroring the layering `S3Server::create_router` applies (tracing first,
//! state last).

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_get).post(handlers::index_post))
        .route("/local/", post(handlers::local_post))
        .route(
            "/local/{key}/",
            get(handlers::local_key_get).head(handlers::local_key_head),
        )
        .route(
            "/file/{key}/",
            get(handlers::file_key_get).head(handlers::file_key_head),
        )
        .route("/join/", get(handlers::join_get).post(handlers::join_post))
        .route("/config/", get(handlers::config_get))
        .route("/heartbeat/", post(handlers::heartbeat_post))
        .route("/favicon.ico", get(handlers::favicon))
        .fallback(handlers::not_found)
        .layer(
            TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cask_cluster::{Node, Site};
    use cask_storage::{Backend, LocalBackend};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(dir.path()));
        let myself = Node::new("self", "http://self", true);
        let site = Site::new(
            myself,
            "s3cr3t",
            Duration::from_secs(30),
            backend,
            1,
            1,
            Duration::from_secs(5),
        );
        (AppState::new(site), dir)
    }

    #[tokio::test]
    async fn favicon_is_no_content() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/favicon.ico")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn config_get_returns_node_json() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/config/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn local_key_get_without_secret_is_forbidden() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/local/sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn file_get_missing_key_is_not_found() {
        let (state, _dir) = test_state();
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/file/sha1:ae28605f0ffc34fe5314342f78efaa13ee45f699/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
