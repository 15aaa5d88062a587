pub mod api;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

/// Build the Axum router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let flow_routes = Router::new()
        .route("/start", post(api::start_flow))
        .route("/status/{client_id}", get(api::get_flow_status))
        .route("/update/{client_id}", put(api::update_flow_stage))
        .route("/services", get(api::list_services))
        .route("/cancel/{client_id}", post(api::cancel_flow));

    Router::new()
        .route("/health", get(api::health))
        .nest("/flow", flow_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router until `cancel` fires.
pub async fn spawn_http_server(
    state: Arc<AppState>,
    port: u16,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, anyhow::Error> {
    let router = build_router(state);
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .ok();
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use ascend_flow::collaborators::stub::StubCollaborators;
    use ascend_flow::collaborators::Collaborators;
    use ascend_flow::{EventBus, FlowConfig, Orchestrator};

    fn test_state() -> Arc<AppState> {
        let collaborators = Collaborators::from_shared(StubCollaborators::new().into_shared());
        let orchestrator = Orchestrator::new(collaborators, EventBus::new(8), FlowConfig::default());
        AppState::new(Arc::new(orchestrator), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_health() {
        let resp = build_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/flow/services")
            .header("Origin", "http://localhost:3000")
            .header("Access-Control-Request-Method", "GET")
            .body(Body::empty())
            .unwrap();
        let resp = build_router(test_state()).oneshot(req).await.unwrap();
        assert!(resp
            .headers()
            .get("access-control-allow-origin")
            .is_some());
    }

    #[tokio::test]
    async fn test_spawn_http_server_starts_and_stops() {
        let cancel = CancellationToken::new();
        let handle = spawn_http_server(test_state(), 0, cancel.clone()).await;
        assert!(handle.is_ok(), "server should start on port 0");

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle.unwrap())
            .await
            .expect("server should shut down within 2s")
            .expect("server task should not panic");
    }
}
