use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::post,
};
use services::services::bulk_email::{BulkEmailReport, BulkEmailRequest};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

/// Send a templated email to a job's applicants
pub async fn send_bulk_email(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<BulkEmailRequest>,
) -> Result<ResponseJson<ApiResponse<BulkEmailReport>>, ApiError> {
    let report = state.bulk_email().send(&scope, job_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().route("/jobs/{job_id}/bulk-email", post(send_bulk_email))
}
