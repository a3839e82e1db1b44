//! Job listing, pipeline configuration and pipeline views.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json as ResponseJson, Response},
    routing::{get, put},
};
use db::models::job::Job;
use serde::Deserialize;
use services::services::{
    csv_export::export_filename,
    pipeline::{JobPipeline, StagesUpdated},
    stage_registry::{PhaseProgress, StageDefinition},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::CurrentMember, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct UpdateStagesRequest {
    pub stages: Vec<StageDefinition>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
) -> Result<ResponseJson<ApiResponse<Vec<Job>>>, ApiError> {
    let jobs = state.pipeline().list_jobs(&scope).await?;
    Ok(ResponseJson(ApiResponse::success(jobs)))
}

pub async fn get_job(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Job>>, ApiError> {
    let job = state.pipeline().find_job(&scope, job_id).await?;
    Ok(ResponseJson(ApiResponse::success(job)))
}

/// Replace a job's pipeline stages
pub async fn update_stages(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<UpdateStagesRequest>,
) -> Result<ResponseJson<ApiResponse<StagesUpdated>>, ApiError> {
    let updated = state
        .pipeline()
        .update_job_stages(&scope, job_id, payload.stages)
        .await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn get_progress(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<PhaseProgress>>, ApiError> {
    let progress = state.pipeline().job_progress(&scope, job_id).await?;
    Ok(ResponseJson(ApiResponse::success(progress)))
}

/// Applications of a job, each resolved against the job's stages
pub async fn list_applications(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<JobPipeline>>, ApiError> {
    let pipeline = state.pipeline().list_applications(&scope, job_id).await?;
    Ok(ResponseJson(ApiResponse::success(pipeline)))
}

pub async fn export_csv(
    State(state): State<AppState>,
    CurrentMember(scope): CurrentMember,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (job, csv) = state.csv_export().export_job_pipeline(&scope, job_id).await?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(&job));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .nest(
            "/jobs/{job_id}",
            Router::new()
                .route("/stages", put(update_stages))
                .route("/progress", get(get_progress))
                .route("/applications", get(list_applications))
                .route("/export.csv", get(export_csv)),
        )
}
