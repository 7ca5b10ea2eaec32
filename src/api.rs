//! HTTP surface for the analysis service.
//!
//! - `GET /` – Service banner.
//! - `GET /health` – Liveness probe.
//! - `POST /analyze` – Queue analysis of `{projectId, documentPath}`; answers `202` before any
//!   external call is made.
//! - `POST /projects/:project_id/analyze` – Queue analysis of the first PDF listed on a project.
//! - `GET /metrics` – Pipeline counters.

use crate::firestore::FirestoreError;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{AnalysisApi, AnalysisRequest};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

const SERVICE_NAME: &str = "Mining Analysis AI";
const ACCEPTED_MESSAGE: &str = "Analysis started in background";

/// Build the HTTP router around an analysis scheduler.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: AnalysisApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze", post(analyze::<S>))
        .route("/projects/:project_id/analyze", post(analyze_project::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "status": "online", "service": SERVICE_NAME }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Serialize)]
struct AcceptedResponse {
    status: &'static str,
    message: &'static str,
}

/// Validate and queue a single document analysis.
async fn analyze<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError>
where
    S: AnalysisApi,
{
    require_non_blank("projectId", &request.project_id)?;
    require_non_blank("documentPath", &request.document_path)?;

    tracing::info!(
        project_id = %request.project_id,
        document_path = %request.document_path,
        "Analysis request accepted"
    );
    service.submit(request);

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            message: ACCEPTED_MESSAGE,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectAcceptedResponse {
    status: &'static str,
    message: &'static str,
    project_id: String,
    document_path: String,
}

/// Queue analysis of the first PDF attached to a project.
async fn analyze_project<S>(
    State(service): State<Arc<S>>,
    Path(project_id): Path<String>,
) -> Result<(StatusCode, Json<ProjectAcceptedResponse>), ApiError>
where
    S: AnalysisApi,
{
    require_non_blank("projectId", &project_id)?;
    let project = service
        .find_project(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Project {project_id} not found")))?;
    let pdf = project
        .first_pdf()
        .ok_or_else(|| ApiError::BadRequest("No PDF document found in project".into()))?;

    let document_path = format!("projects/{project_id}/{}", pdf.name);
    tracing::info!(project_id = %project_id, document_path = %document_path, "Project analysis requested");
    service.submit(AnalysisRequest::new(project_id.clone(), document_path.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(ProjectAcceptedResponse {
            status: "accepted",
            message: ACCEPTED_MESSAGE,
            project_id,
            document_path,
        }),
    ))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: AnalysisApi,
{
    Json(service.metrics_snapshot())
}

fn require_non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Errors surfaced to HTTP clients as `{error}` bodies.
#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("project lookup failed: {0}")]
    Database(#[from] FirestoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(err) => {
                tracing::error!(error = %err, "Project lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
