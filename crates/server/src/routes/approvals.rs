use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::approval::{ApprovalKind, ApprovalRequest};
use serde::Deserialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RequestApprovalRequest {
    pub kind: ApprovalKind,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
    pub note: Option<String>,
}

pub async fn request_approval(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<RequestApprovalRequest>,
) -> Result<ResponseJson<ApiResponse<ApprovalRequest>>, ApiError> {
    let approval = state
        .approvals()
        .request_approval(&scope, application_id, payload.kind, payload.note.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(approval)))
}

pub async fn list_approvals(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ApprovalRequest>>>, ApiError> {
    let approvals = state
        .approvals()
        .list_for_application(&scope, application_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(approvals)))
}

/// Approve or reject a pending request
pub async fn decide(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(approval_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<ResponseJson<ApiResponse<ApprovalRequest>>, ApiError> {
    let approval = state
        .approvals()
        .decide(&scope, approval_id, payload.approve, payload.note.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(approval)))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(approval_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ApprovalRequest>>, ApiError> {
    let approval = state.approvals().cancel(&scope, approval_id).await?;
    Ok(ResponseJson(ApiResponse::success(approval)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/applications/{application_id}/approvals",
            get(list_approvals).post(request_approval),
        )
        .nest(
            "/approvals/{approval_id}",
            Router::new()
                .route("/decision", post(decide))
                .route("/cancel", post(cancel)),
        )
}
