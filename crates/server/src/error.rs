use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    approvals::ApprovalError, bulk_email::BulkEmailError, csv_export::CsvExportError,
    pipeline::PipelineError, scoring::ScoringError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    CsvExport(#[from] CsvExportError),
    #[error(transparent)]
    BulkEmail(#[from] BulkEmailError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("missing or unknown member header")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) => match e {
                PipelineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::StageRegistry(_) | PipelineError::UnknownStage(_) => {
                    StatusCode::BAD_REQUEST
                }
                PipelineError::JobNotFound | PipelineError::ApplicationNotFound => {
                    StatusCode::NOT_FOUND
                }
                PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
                PipelineError::ApprovalRequired(_) => StatusCode::CONFLICT,
            },
            ApiError::Scoring(e) => match e {
                ScoringError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ScoringError::StageRegistry(_)
                | ScoringError::InvalidRating(_)
                | ScoringError::UnknownStage(_) => StatusCode::BAD_REQUEST,
                ScoringError::ApplicationNotFound => StatusCode::NOT_FOUND,
                ScoringError::Forbidden(_) => StatusCode::FORBIDDEN,
            },
            ApiError::Approval(e) => match e {
                ApprovalError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ApprovalError::ApplicationNotFound | ApprovalError::NotFound => {
                    StatusCode::NOT_FOUND
                }
                ApprovalError::Forbidden(_) | ApprovalError::SelfDecision => StatusCode::FORBIDDEN,
                ApprovalError::AlreadyPending(_) | ApprovalError::NotPending(_) => {
                    StatusCode::CONFLICT
                }
            },
            ApiError::CsvExport(e) => match e {
                CsvExportError::Database(_)
                | CsvExportError::Csv(_)
                | CsvExportError::Io(_)
                | CsvExportError::Utf8(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CsvExportError::StageRegistry(_) => StatusCode::BAD_REQUEST,
                CsvExportError::JobNotFound => StatusCode::NOT_FOUND,
                CsvExportError::Forbidden(_) => StatusCode::FORBIDDEN,
            },
            ApiError::BulkEmail(e) => match e {
                BulkEmailError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                BulkEmailError::StageRegistry(_)
                | BulkEmailError::UnknownStage(_)
                | BulkEmailError::EmptyField(_)
                | BulkEmailError::TooManyRecipients { .. } => StatusCode::BAD_REQUEST,
                BulkEmailError::JobNotFound => StatusCode::NOT_FOUND,
                BulkEmailError::Forbidden(_) => StatusCode::FORBIDDEN,
            },
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status();
        let error_message = if status_code.is_server_error() {
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use db::models::approval::{ApprovalKind, ApprovalStatus};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (PipelineError::JobNotFound.into(), StatusCode::NOT_FOUND),
            (
                PipelineError::ApprovalRequired(ApprovalKind::Offer).into(),
                StatusCode::CONFLICT,
            ),
            (ScoringError::InvalidRating(9).into(), StatusCode::BAD_REQUEST),
            (
                ApprovalError::NotPending(ApprovalStatus::Approved).into(),
                StatusCode::CONFLICT,
            ),
            (ApprovalError::SelfDecision.into(), StatusCode::FORBIDDEN),
            (
                BulkEmailError::TooManyRecipients {
                    requested: 9,
                    max: 1,
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }
}
