use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::access_control::JobPredicate;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Draft,
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Job {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub stages: Option<String>, // JSON-encoded stage list; NULL means the default pipeline
    pub requires_offer_approval: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateJob {
    pub organization_id: Uuid,
    pub title: String,
    pub stages: Option<String>,
    pub requires_offer_approval: bool,
    pub status: Option<JobStatus>,
}

const JOB_COLUMNS: &str = "j.id, j.organization_id, j.title, j.stages, j.requires_offer_approval, j.status, j.created_at, j.updated_at";

impl Job {
    pub async fn create(pool: &SqlitePool, data: &CreateJob) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Job>(
            r#"INSERT INTO jobs (id, organization_id, title, stages, requires_offer_approval, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               RETURNING id, organization_id, title, stages, requires_offer_approval, status, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.organization_id)
        .bind(&data.title)
        .bind(&data.stages)
        .bind(data.requires_offer_approval)
        .bind(data.status.unwrap_or_default())
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs j WHERE j.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Jobs visible under `predicate`, newest first.
    pub async fn find_scoped(
        pool: &SqlitePool,
        predicate: &JobPredicate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs j WHERE "));
        predicate.push_sql(&mut query, "j");
        query.push(" ORDER BY j.created_at DESC");

        query.build_query_as::<Job>().fetch_all(pool).await
    }

    /// Look up one job, returning `None` when it exists but is outside `predicate`.
    pub async fn find_by_id_scoped(
        pool: &SqlitePool,
        predicate: &JobPredicate,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs j WHERE j.id = "));
        query.push_bind(id);
        query.push(" AND ");
        predicate.push_sql(&mut query, "j");

        query.build_query_as::<Job>().fetch_optional(pool).await
    }

    pub async fn update_stages<'e, E>(
        executor: E,
        id: Uuid,
        stages: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE jobs SET stages = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(stages)
            .bind(Utc::now())
            .execute(executor)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        access_control::{MemberScope, scoped_job_where},
        models::{
            member::{CreateOrgMember, OrgMember, OrgRole},
            organization::Organization,
        },
    };

    async fn open_job(pool: &SqlitePool, organization_id: Uuid, title: &str) -> Job {
        Job::create(
            pool,
            &CreateJob {
                organization_id,
                title: title.to_string(),
                stages: None,
                requires_offer_approval: false,
                status: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_scoped_respects_assignments_and_tenancy() {
        let db = DBService::in_memory().await.unwrap();
        let org = Organization::create(&db.pool, "Verdant Labs").await.unwrap();
        let other_org = Organization::create(&db.pool, "Other Co").await.unwrap();

        let solar = open_job(&db.pool, org.id, "Solar Engineer").await;
        let wind = open_job(&db.pool, org.id, "Wind Analyst").await;
        let _foreign = open_job(&db.pool, other_org.id, "Foreign Role").await;

        let manager = OrgMember::create(
            &db.pool,
            &CreateOrgMember {
                organization_id: org.id,
                name: "Ada".to_string(),
                email: "ada@verdant.test".to_string(),
                role: OrgRole::HiringManager,
                has_full_access: false,
                assigned_job_ids: vec![solar.id],
            },
        )
        .await
        .unwrap();
        let owner = OrgMember::create(
            &db.pool,
            &CreateOrgMember {
                organization_id: org.id,
                name: "Olu".to_string(),
                email: "olu@verdant.test".to_string(),
                role: OrgRole::Owner,
                has_full_access: false,
                assigned_job_ids: vec![],
            },
        )
        .await
        .unwrap();

        let manager_scope = MemberScope::load(&db.pool, manager.id).await.unwrap().unwrap();
        let jobs = Job::find_scoped(&db.pool, &scoped_job_where(&manager_scope))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, solar.id);

        let owner_scope = MemberScope::load(&db.pool, owner.id).await.unwrap().unwrap();
        let jobs = Job::find_scoped(&db.pool, &scoped_job_where(&owner_scope))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.organization_id == org.id));

        let hidden = Job::find_by_id_scoped(&db.pool, &scoped_job_where(&manager_scope), wind.id)
            .await
            .unwrap();
        assert!(hidden.is_none());
    }
}
