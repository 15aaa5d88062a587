use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use ascend_flow::collaborators::types::{ProgressSnapshot, ServiceCategory};
use ascend_flow::context::Referral;
use ascend_flow::{FlowError, FlowStage};

use crate::state::AppState;

/// Error response: `{success: false, error}` with a status derived from the
/// flow error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        let status = match &err {
            FlowError::Validation(_) => StatusCode::BAD_REQUEST,
            FlowError::NotFound(_) => StatusCode::NOT_FOUND,
            FlowError::AlreadyRunning(_) | FlowError::AlreadyExists(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

/// Unreadable or mistyped bodies are validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid request: {}", rejection.body_text()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFlowResponse {
    pub success: bool,
    pub client_id: String,
    pub current_stage: FlowStage,
    pub workspace_url: Option<String>,
    pub notion_url: Option<String>,
    pub partner_integrations: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Run a complete flow for the posted referral.
pub async fn start_flow(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Referral>, JsonRejection>,
) -> Result<(StatusCode, Json<StartFlowResponse>), ApiError> {
    let Json(referral) = payload?;
    let context = state
        .orchestrator()
        .execute_complete_flow(referral, state.flow_token())
        .await
        .map_err(|failure| ApiError::from(failure.error))?;

    let metrics = &context.progress_metrics;
    let response = StartFlowResponse {
        success: true,
        client_id: context.client_id().to_string(),
        current_stage: context.current_stage(),
        workspace_url: metrics.workspace_project.as_ref().map(|p| p.url.clone()),
        notion_url: metrics.knowledge_base_entry.as_ref().map(|e| e.url.clone()),
        partner_integrations: context.partner_integrations().to_vec(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_flow_status(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<DataResponse<ProgressSnapshot>>, ApiError> {
    let snapshot = state.orchestrator().get_flow_status(&client_id).await?;
    Ok(Json(DataResponse {
        success: true,
        data: snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFlowStage {
    pub stage: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

pub async fn update_flow_stage(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    payload: Result<Json<UpdateFlowStage>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = payload?;
    state
        .orchestrator()
        .update_flow_stage(&client_id, &body.stage, body.data)
        .await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Stage '{}' updated for client '{}'", body.stage.trim(), client_id),
    }))
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<Vec<ServiceCategory>>>, ApiError> {
    let services = state.orchestrator().get_available_services().await?;
    Ok(Json(DataResponse {
        success: true,
        data: services,
    }))
}

pub async fn cancel_flow(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.orchestrator().cancel_flow(&client_id) {
        warn!(client_id = %client_id, "cancel requested for flow that is not running");
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("No running flow for client '{}'", client_id),
        ));
    }
    info!(client_id = %client_id, "flow cancel accepted");
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Cancellation requested for client '{}'", client_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascend_flow::error::CollaboratorError;

    #[test]
    fn test_flow_errors_map_to_status_codes() {
        let cases = [
            (FlowError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (FlowError::NotFound("c-1".into()), StatusCode::NOT_FOUND),
            (FlowError::AlreadyRunning("c-1".into()), StatusCode::CONFLICT),
            (FlowError::AlreadyExists("c-1".into()), StatusCode::CONFLICT),
            (
                FlowError::Integration {
                    stage: FlowStage::Implementation,
                    source: CollaboratorError::permanent("create_client_entry", "down"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                FlowError::Eligibility {
                    client_id: "c-1".into(),
                    criteria: vec![],
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }

    #[test]
    fn test_start_response_is_camel_case() {
        let response = StartFlowResponse {
            success: true,
            client_id: "c-1".to_string(),
            current_stage: FlowStage::Completed,
            workspace_url: Some("https://workspace.example.com/projects/proj-c-1".to_string()),
            notion_url: None,
            partner_integrations: vec!["tax_services".to_string()],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["clientId"], "c-1");
        assert_eq!(value["currentStage"], "completed");
        assert!(value["notionUrl"].is_null());
        assert_eq!(value["partnerIntegrations"][0], "tax_services");
    }
}
