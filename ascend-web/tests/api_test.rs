use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ascend_flow::collaborators::stub::{Fault, StubCollaborators};
use ascend_flow::collaborators::Collaborators;
use ascend_flow::{EventBus, FlowConfig, Orchestrator};
use ascend_web::state::AppState;

fn state_with(stub: StubCollaborators) -> Arc<AppState> {
    let collaborators = Collaborators::from_shared(stub.into_shared());
    let orchestrator = Orchestrator::new(collaborators, EventBus::new(16), FlowConfig::default());
    AppState::new(Arc::new(orchestrator), CancellationToken::new())
}

fn router_with(stub: StubCollaborators) -> Router {
    ascend_web::build_router(state_with(stub))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn jane(client_id: &str) -> Value {
    json!({
        "source": "vr_agency",
        "clientId": client_id,
        "clientInfo": { "name": "Jane Doe", "businessType": "consulting" }
    })
}

#[tokio::test]
async fn test_start_flow_returns_created() {
    let resp = router_with(StubCollaborators::new())
        .oneshot(json_request("POST", "/flow/start", jane("jane-1")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["clientId"], "jane-1");
    assert_eq!(body["currentStage"], "completed");
    assert_eq!(
        body["workspaceUrl"],
        "https://workspace.example.com/projects/proj-jane-1"
    );
    assert_eq!(body["notionUrl"], "https://notion.example.com/kb-jane-1");
    assert!(!body["partnerIntegrations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_flow_rejects_invalid_referral() {
    let referral = json!({
        "source": "vr_agency",
        "clientInfo": { "name": "", "businessType": "consulting" }
    });
    let resp = router_with(StubCollaborators::new())
        .oneshot(json_request("POST", "/flow/start", referral))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn test_start_flow_stage_failure_returns_500() {
    let stub =
        StubCollaborators::new().with_fault("create_client_entry", Fault::Fail("notion down".into()));
    let resp = router_with(stub)
        .oneshot(json_request("POST", "/flow/start", jane("jane-2")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("notion down"));
}

#[tokio::test]
async fn test_status_for_unknown_client_returns_404() {
    let resp = router_with(StubCollaborators::new())
        .oneshot(get("/flow/status/nobody"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_status_after_flow() {
    let router = router_with(StubCollaborators::new());
    let resp = router
        .clone()
        .oneshot(json_request("POST", "/flow/start", jane("jane-3")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router.oneshot(get("/flow/status/jane-3")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["clientId"], "jane-3");
    assert_eq!(body["data"]["monitoringId"], "mon-jane-3");
}

#[tokio::test]
async fn test_status_lookup_failure_returns_500() {
    let stub = StubCollaborators::new()
        .with_fault("get_client_progress", Fault::Unavailable("monitor offline".into()));
    let resp = router_with(stub)
        .oneshot(get("/flow/status/jane-4"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_update_stage() {
    let router = router_with(StubCollaborators::new());
    let update = json!({ "stage": "implementation", "data": { "status": "in_progress" } });
    let resp = router
        .clone()
        .oneshot(json_request("PUT", "/flow/update/jane-5", update))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["success"], true);

    let resp = router.oneshot(get("/flow/status/jane-5")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["currentStage"], "implementation");
    assert_eq!(
        body["data"]["stages"]["implementation"]["status"],
        "in_progress"
    );
}

#[tokio::test]
async fn test_update_unknown_stage_returns_400() {
    let update = json!({ "stage": "launch_party", "data": {} });
    let resp = router_with(StubCollaborators::new())
        .oneshot(json_request("PUT", "/flow/update/jane-6", update))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_services_lists_catalog() {
    let resp = router_with(StubCollaborators::new())
        .oneshot(get("/flow/services"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 4);
    assert!(ids.contains(&"supported_self_employment"));
    assert!(ids.contains(&"business_readiness_coaching"));
}

#[tokio::test]
async fn test_cancel_without_running_flow_returns_404() {
    let resp = router_with(StubCollaborators::new())
        .oneshot(json_request("POST", "/flow/cancel/nobody", json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_running_flow() {
    let stub = StubCollaborators::new()
        .with_fault("process_referral", Fault::Delay(Duration::from_millis(200)));
    let state = state_with(stub);
    let router = ascend_web::build_router(state.clone());

    let start = tokio::spawn(
        router
            .clone()
            .oneshot(json_request("POST", "/flow/start", jane("jane-7"))),
    );

    for _ in 0..100 {
        if state.orchestrator().is_running("jane-7") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let resp = router
        .oneshot(json_request("POST", "/flow/cancel/jane-7", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = start.await.unwrap().unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("cancelled"));
    assert!(!state.orchestrator().is_running("jane-7"));
}

#[tokio::test]
async fn test_repeat_start_for_same_client_returns_409() {
    let router = router_with(StubCollaborators::new());
    let resp = router
        .clone()
        .oneshot(json_request("POST", "/flow/start", jane("jane-8")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = router
        .oneshot(json_request("POST", "/flow/start", jane("jane-8")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["success"], false);
}

async fn assert_bad_request(resp: axum::response::Response) {
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[tokio::test]
async fn test_malformed_bodies_return_json_400() {
    let router = router_with(StubCollaborators::new());

    let unparsable = Request::builder()
        .method("POST")
        .uri("/flow/start")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_bad_request(router.clone().oneshot(unparsable).await.unwrap()).await;

    let mistyped = json_request("POST", "/flow/start", json!({ "source": 5 }));
    assert_bad_request(router.clone().oneshot(mistyped).await.unwrap()).await;

    let wrong_content_type = Request::builder()
        .method("POST")
        .uri("/flow/start")
        .header("content-type", "text/plain")
        .body(Body::from("{}"))
        .unwrap();
    assert_bad_request(router.clone().oneshot(wrong_content_type).await.unwrap()).await;

    let missing_stage = json_request("PUT", "/flow/update/jane-9", json!({ "data": {} }));
    assert_bad_request(router.oneshot(missing_stage).await.unwrap()).await;
}
