use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::access_control::ApplicationPredicate;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Active,
    Hired,
    Rejected,
    Withdrawn,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Application {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub stage_id: Option<String>, // Stage id within the job's registry; NULL means not yet placed
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub stage_entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ApplicationWithCandidate {
    #[serde(flatten)]
    #[ts(flatten)]
    #[sqlx(flatten)]
    pub application: Application,
    pub candidate_first_name: String,
    pub candidate_last_name: String,
    pub candidate_email: Option<String>,
}

impl std::ops::Deref for ApplicationWithCandidate {
    type Target = Application;
    fn deref(&self) -> &Self::Target {
        &self.application
    }
}

impl ApplicationWithCandidate {
    pub fn candidate_name(&self) -> String {
        format!("{} {}", self.candidate_first_name, self.candidate_last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateApplication {
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub stage_id: Option<String>,
}

const APPLICATION_COLUMNS: &str = "a.id, a.organization_id, a.job_id, a.candidate_id, a.stage_id, a.status, a.applied_at, a.stage_entered_at, a.updated_at";

const CANDIDATE_JOIN_COLUMNS: &str = "c.first_name AS candidate_first_name, c.last_name AS candidate_last_name, c.email AS candidate_email";

impl Application {
    pub async fn create(
        pool: &SqlitePool,
        organization_id: Uuid,
        data: &CreateApplication,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Application>(
            r#"INSERT INTO applications (id, organization_id, job_id, candidate_id, stage_id, status, applied_at, stage_entered_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 'active', $6, $6, $6)
               RETURNING id, organization_id, job_id, candidate_id, stage_id, status, applied_at, stage_entered_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(data.job_id)
        .bind(data.candidate_id)
        .bind(&data.stage_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Look up one application, returning `None` when it is outside `predicate`.
    pub async fn find_by_id_scoped(
        pool: &SqlitePool,
        predicate: &ApplicationPredicate,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.id = "
        ));
        query.push_bind(id);
        query.push(" AND ");
        predicate.push_sql(&mut query, "a");

        query.build_query_as::<Application>().fetch_optional(pool).await
    }

    /// Applications of a job visible under `predicate`, oldest first.
    pub async fn find_for_job_scoped(
        pool: &SqlitePool,
        predicate: &ApplicationPredicate,
        job_id: Uuid,
    ) -> Result<Vec<ApplicationWithCandidate>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {APPLICATION_COLUMNS}, {CANDIDATE_JOIN_COLUMNS} FROM applications a JOIN candidates c ON c.id = a.candidate_id WHERE a.job_id = "
        ));
        query.push_bind(job_id);
        query.push(" AND ");
        predicate.push_sql(&mut query, "a");
        query.push(" ORDER BY a.applied_at ASC");

        query
            .build_query_as::<ApplicationWithCandidate>()
            .fetch_all(pool)
            .await
    }

    /// Subset of `ids` belonging to `job_id` and visible under `predicate`.
    pub async fn find_by_ids_scoped(
        pool: &SqlitePool,
        predicate: &ApplicationPredicate,
        job_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ApplicationWithCandidate>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {APPLICATION_COLUMNS}, {CANDIDATE_JOIN_COLUMNS} FROM applications a JOIN candidates c ON c.id = a.candidate_id WHERE a.job_id = "
        ));
        query.push_bind(job_id);
        query.push(" AND a.id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        query.push(") AND ");
        predicate.push_sql(&mut query, "a");
        query.push(" ORDER BY a.applied_at ASC");

        query
            .build_query_as::<ApplicationWithCandidate>()
            .fetch_all(pool)
            .await
    }

    /// All applications of a job, regardless of viewer.
    pub async fn find_by_job_id(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications a WHERE a.job_id = $1 ORDER BY a.applied_at ASC"
        ))
        .bind(job_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update_stage<'e, E>(
        executor: E,
        id: Uuid,
        stage_id: &str,
        status: ApplicationStatus,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Application>(
            r#"UPDATE applications
               SET stage_id = $2, status = $3, stage_entered_at = $4, updated_at = $4
               WHERE id = $1
               RETURNING id, organization_id, job_id, candidate_id, stage_id, status, applied_at, stage_entered_at, updated_at"#,
        )
        .bind(id)
        .bind(stage_id)
        .bind(status)
        .bind(now)
        .fetch_one(executor)
        .await
    }
}
