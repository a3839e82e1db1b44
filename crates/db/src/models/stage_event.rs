use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One movement of an application between pipeline stages
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ApplicationStageEvent {
    pub id: Uuid,
    pub application_id: Uuid,
    pub from_stage_id: Option<String>,
    pub to_stage_id: String,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApplicationStageEvent {
    pub async fn create<'e, E>(
        executor: E,
        application_id: Uuid,
        from_stage_id: Option<&str>,
        to_stage_id: &str,
        actor_id: Option<Uuid>,
        note: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ApplicationStageEvent>(
            r#"INSERT INTO application_stage_events (id, application_id, from_stage_id, to_stage_id, actor_id, note, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, application_id, from_stage_id, to_stage_id, actor_id, note, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(from_stage_id)
        .bind(to_stage_id)
        .bind(actor_id)
        .bind(note)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_application(
        pool: &SqlitePool,
        application_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApplicationStageEvent>(
            r#"SELECT id, application_id, from_stage_id, to_stage_id, actor_id, note, created_at
               FROM application_stage_events
               WHERE application_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(application_id)
        .fetch_all(pool)
        .await
    }
}
