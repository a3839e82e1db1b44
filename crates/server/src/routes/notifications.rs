use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::notification::Notification;
use serde::Deserialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Query(query): Query<NotificationQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications = state
        .notifications()
        .list_for_member(scope.member_id, query.unread_only)
        .await?;
    Ok(ResponseJson(ApiResponse::success(notifications)))
}

/// Returns false when there was nothing unread to mark
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(notification_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<bool>>, ApiError> {
    let marked = state
        .notifications()
        .mark_read(scope.member_id, notification_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(marked)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
) -> Result<ResponseJson<ApiResponse<u64>>, ApiError> {
    let marked = state.notifications().mark_all_read(scope.member_id).await?;
    Ok(ResponseJson(ApiResponse::success(marked)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{notification_id}/read", post(mark_read))
}
