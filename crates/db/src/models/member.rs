use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Role of a member inside their organization
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "org_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Recruiter,
    HiringManager,
    Interviewer,
}

impl OrgRole {
    /// Owners and admins see every job regardless of the member's flag.
    pub fn implies_full_access(self) -> bool {
        matches!(self, OrgRole::Owner | OrgRole::Admin)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct OrgMember {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: OrgRole,
    pub has_full_access: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOrgMember {
    pub organization_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: OrgRole,
    pub has_full_access: bool,
    pub assigned_job_ids: Vec<Uuid>,
}

const MEMBER_COLUMNS: &str = "id, organization_id, name, email, role, has_full_access, created_at";

impl OrgMember {
    pub async fn create(pool: &SqlitePool, data: &CreateOrgMember) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let member = sqlx::query_as::<_, OrgMember>(&format!(
            r#"INSERT INTO org_members (id, organization_id, name, email, role, has_full_access, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {MEMBER_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(data.organization_id)
        .bind(&data.name)
        .bind(&data.email)
        .bind(data.role)
        .bind(data.has_full_access)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        for job_id in &data.assigned_job_ids {
            sqlx::query("INSERT INTO member_job_assignments (member_id, job_id) VALUES ($1, $2)")
                .bind(member.id)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(member)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrgMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM org_members WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_organization(
        pool: &SqlitePool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrgMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM org_members WHERE organization_id = $1 ORDER BY created_at ASC"
        ))
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }

    pub async fn assigned_job_ids(
        pool: &SqlitePool,
        member_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT job_id FROM member_job_assignments WHERE member_id = $1")
                .bind(member_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
