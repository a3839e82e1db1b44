use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::stage_event::ApplicationStageEvent;
use serde::Deserialize;
use services::services::pipeline::StageMove;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct MoveApplicationRequest {
    pub stage_id: String,
    pub note: Option<String>,
}

/// Move an application to another stage of its job's pipeline
pub async fn move_application(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<MoveApplicationRequest>,
) -> Result<ResponseJson<ApiResponse<StageMove>>, ApiError> {
    let moved = state
        .pipeline()
        .move_application(
            &scope,
            application_id,
            &payload.stage_id,
            payload.note.as_deref(),
        )
        .await?;
    Ok(ResponseJson(ApiResponse::success(moved)))
}

pub async fn stage_history(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(application_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ApplicationStageEvent>>>, ApiError> {
    let events = state.pipeline().stage_history(&scope, application_id).await?;
    Ok(ResponseJson(ApiResponse::success(events)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/applications/{application_id}",
        Router::new()
            .route("/move", post(move_application))
            .route("/history", get(stage_history)),
    )
}
