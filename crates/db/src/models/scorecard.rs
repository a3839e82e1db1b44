use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Reviewer's overall call on a candidate
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "recommendation", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Recommendation {
    StrongNo,
    No,
    Yes,
    StrongYes,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Scorecard {
    pub id: Uuid,
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
    pub stage_id: String,
    pub rating: i64,
    pub recommendation: Recommendation,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate rating for one application
#[derive(Debug, Clone, FromRow)]
pub struct RatingAggregate {
    pub application_id: Uuid,
    pub average_rating: f64,
    pub scorecard_count: i64,
}

const SCORECARD_COLUMNS: &str = "id, application_id, reviewer_id, stage_id, rating, recommendation, notes, created_at, updated_at";

impl Scorecard {
    /// Insert or replace the reviewer's scorecard for this application and stage.
    pub async fn upsert(
        pool: &SqlitePool,
        application_id: Uuid,
        reviewer_id: Uuid,
        stage_id: &str,
        rating: i64,
        recommendation: Recommendation,
        notes: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Scorecard>(&format!(
            r#"INSERT INTO scorecards (id, application_id, reviewer_id, stage_id, rating, recommendation, notes, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               ON CONFLICT(application_id, reviewer_id, stage_id) DO UPDATE SET
                   rating = excluded.rating,
                   recommendation = excluded.recommendation,
                   notes = excluded.notes,
                   updated_at = excluded.updated_at
               RETURNING {SCORECARD_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(reviewer_id)
        .bind(stage_id)
        .bind(rating)
        .bind(recommendation)
        .bind(notes)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_application(
        pool: &SqlitePool,
        application_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Scorecard>(&format!(
            "SELECT {SCORECARD_COLUMNS} FROM scorecards WHERE application_id = $1 ORDER BY created_at ASC"
        ))
        .bind(application_id)
        .fetch_all(pool)
        .await
    }

    /// Average rating per application across a job.
    pub async fn aggregates_for_job(
        pool: &SqlitePool,
        job_id: Uuid,
    ) -> Result<Vec<RatingAggregate>, sqlx::Error> {
        sqlx::query_as::<_, RatingAggregate>(
            r#"SELECT s.application_id AS application_id,
                      AVG(s.rating) AS average_rating,
                      COUNT(*) AS scorecard_count
               FROM scorecards s
               JOIN applications a ON a.id = s.application_id
               WHERE a.job_id = $1
               GROUP BY s.application_id"#,
        )
        .bind(job_id)
        .fetch_all(pool)
        .await
    }
}
