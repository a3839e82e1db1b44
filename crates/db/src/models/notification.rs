use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequested,
    ApprovalDecided,
    StageChanged,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Notification {
    pub id: Uuid,
    pub member_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const NOTIFICATION_COLUMNS: &str = "id, member_id, kind, title, body, link, read_at, created_at";

impl Notification {
    pub async fn create(
        pool: &SqlitePool,
        member_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: Option<&str>,
        link: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"INSERT INTO notifications (id, member_id, kind, title, body, link, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {NOTIFICATION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(kind)
        .bind(title)
        .bind(body)
        .bind(link)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_member(
        pool: &SqlitePool,
        member_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"SELECT {NOTIFICATION_COLUMNS} FROM notifications
               WHERE member_id = $1 AND ($2 = 0 OR read_at IS NULL)
               ORDER BY created_at DESC
               LIMIT $3"#
        ))
        .bind(member_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_read(
        pool: &SqlitePool,
        member_id: Uuid,
        id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $3 WHERE id = $1 AND member_id = $2 AND read_at IS NULL",
        )
        .bind(id)
        .bind(member_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_all_read(pool: &SqlitePool, member_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE member_id = $1 AND read_at IS NULL",
        )
        .bind(member_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
