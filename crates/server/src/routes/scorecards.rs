use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::scorecard::Scorecard;
use services::services::scoring::{AdvancementReport, SubmitScorecard};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

/// Create or replace the caller's scorecard for a stage
pub async fn submit_scorecard(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<SubmitScorecard>,
) -> Result<ResponseJson<ApiResponse<Scorecard>>, ApiError> {
    let scorecard = state
        .scoring()
        .submit_scorecard(&scope, application_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(scorecard)))
}

pub async fn list_scorecards(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Scorecard>>>, ApiError> {
    let scorecards = state.scoring().scorecards(&scope, application_id).await?;
    Ok(ResponseJson(ApiResponse::success(scorecards)))
}

pub async fn get_recommendation(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<AdvancementReport>>, ApiError> {
    let report = state.scoring().recommendation(&scope, application_id).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/applications/{application_id}",
        Router::new()
            .route("/scorecards", get(list_scorecards).post(submit_scorecard))
            .route("/recommendation", get(get_recommendation)),
    )
}
