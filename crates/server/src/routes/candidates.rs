//! Candidate intake with duplicate warnings.

use axum::{
    Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::post,
};
use db::models::candidate::CreateCandidate;
use serde::Deserialize;
use services::services::duplicate_detector::{CandidateCreated, DuplicateMatch};
use utils::response::ApiResponse;

use crate::{AppState, auth::CurrentMember, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct NewCandidate {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateCheck {
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
}

/// Create a candidate. A likely duplicate is reported, never refused.
pub async fn create_candidate(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Json(payload): Json<NewCandidate>,
) -> Result<ResponseJson<ApiResponse<CandidateCreated>>, ApiError> {
    if !scope.can_manage_candidates() {
        return Err(ApiError::Forbidden("cannot create candidates"));
    }
    let data = CreateCandidate {
        organization_id: scope.organization_id,
        first_name: payload.first_name,
        last_name: payload.last_name,
        email: payload.email,
        linkedin_url: payload.linkedin_url,
    };
    let created = state.duplicates().create_candidate(&data).await?;
    Ok(ResponseJson(ApiResponse::success(created)))
}

pub async fn check_duplicates(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Json(payload): Json<DuplicateCheck>,
) -> Result<ResponseJson<ApiResponse<Option<DuplicateMatch>>>, ApiError> {
    if !scope.can_manage_candidates() {
        return Err(ApiError::Forbidden("cannot look up candidates"));
    }
    let found = state
        .duplicates()
        .find_duplicate(
            scope.organization_id,
            payload.email.as_deref(),
            payload.linkedin_url.as_deref(),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(found)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/candidates", post(create_candidate))
        .route("/candidates/duplicates", post(check_duplicates))
}
