use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "approval_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalKind {
    Offer,
    Hire,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "approval_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub application_id: Uuid,
    pub kind: ApprovalKind,
    pub status: ApprovalStatus,
    pub requested_by: Uuid,
    pub decided_by: Option<Uuid>,
    pub request_note: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

const APPROVAL_COLUMNS: &str = "id, organization_id, application_id, kind, status, requested_by, decided_by, request_note, decision_note, created_at, decided_at";

impl ApprovalRequest {
    pub async fn create(
        pool: &SqlitePool,
        organization_id: Uuid,
        application_id: Uuid,
        kind: ApprovalKind,
        requested_by: Uuid,
        request_note: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ApprovalRequest>(&format!(
            r#"INSERT INTO approval_requests (id, organization_id, application_id, kind, status, requested_by, request_note, created_at)
               VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7)
               RETURNING {APPROVAL_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(application_id)
        .bind(kind)
        .bind(requested_by)
        .bind(request_note)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApprovalRequest>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_pending(
        pool: &SqlitePool,
        application_id: Uuid,
        kind: ApprovalKind,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApprovalRequest>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE application_id = $1 AND kind = $2 AND status = 'pending'"
        ))
        .bind(application_id)
        .bind(kind)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_application(
        pool: &SqlitePool,
        application_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApprovalRequest>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_requests WHERE application_id = $1 ORDER BY created_at DESC"
        ))
        .bind(application_id)
        .fetch_all(pool)
        .await
    }

    pub async fn has_approved(
        pool: &SqlitePool,
        application_id: Uuid,
        kind: ApprovalKind,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM approval_requests WHERE application_id = $1 AND kind = $2 AND status = 'approved'",
        )
        .bind(application_id)
        .bind(kind)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Close a pending request. Returns `None` if it was no longer pending.
    pub async fn close(
        pool: &SqlitePool,
        id: Uuid,
        status: ApprovalStatus,
        decided_by: Uuid,
        decision_note: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApprovalRequest>(&format!(
            r#"UPDATE approval_requests
               SET status = $2, decided_by = $3, decision_note = $4, decided_at = $5
               WHERE id = $1 AND status = 'pending'
               RETURNING {APPROVAL_COLUMNS}"#
        ))
        .bind(id)
        .bind(status)
        .bind(decided_by)
        .bind(decision_note)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }
}
