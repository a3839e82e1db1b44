use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Candidate {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    #[serde(skip)]
    #[ts(skip)]
    pub email_normalized: Option<String>,
    pub linkedin_url: Option<String>,
    #[serde(skip)]
    #[ts(skip)]
    pub linkedin_slug: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateCandidate {
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
}

/// Lookup keys derived from a candidate's contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateKeys {
    pub email_normalized: Option<String>,
    pub linkedin_slug: Option<String>,
}

const CANDIDATE_COLUMNS: &str = "id, organization_id, first_name, last_name, email, email_normalized, linkedin_url, linkedin_slug, created_at";

impl Candidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateCandidate,
        keys: &CandidateKeys,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Candidate>(&format!(
            r#"INSERT INTO candidates (id, organization_id, first_name, last_name, email, email_normalized, linkedin_url, linkedin_slug, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {CANDIDATE_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(data.organization_id)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.email)
        .bind(&keys.email_normalized)
        .bind(&data.linkedin_url)
        .bind(&keys.linkedin_slug)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Candidate>(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Oldest candidate in the organization with this normalized email.
    pub async fn find_by_normalized_email(
        pool: &SqlitePool,
        organization_id: Uuid,
        email_normalized: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Candidate>(&format!(
            r#"SELECT {CANDIDATE_COLUMNS} FROM candidates
               WHERE organization_id = $1 AND email_normalized = $2
               ORDER BY created_at ASC
               LIMIT 1"#
        ))
        .bind(organization_id)
        .bind(email_normalized)
        .fetch_optional(pool)
        .await
    }

    /// Oldest candidate in the organization with this LinkedIn handle.
    pub async fn find_by_linkedin_slug(
        pool: &SqlitePool,
        organization_id: Uuid,
        linkedin_slug: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Candidate>(&format!(
            r#"SELECT {CANDIDATE_COLUMNS} FROM candidates
               WHERE organization_id = $1 AND linkedin_slug = $2
               ORDER BY created_at ASC
               LIMIT 1"#
        ))
        .bind(organization_id)
        .bind(linkedin_slug)
        .fetch_optional(pool)
        .await
    }
}
