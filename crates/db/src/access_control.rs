//! Per-member visibility rules for jobs and applications.
//!
//! A [`MemberScope`] describes what one organization member may see. The
//! predicate builders turn it into SQL fragments for [`QueryBuilder`] and can
//! evaluate the same rule in memory, so handlers that already hold a row do
//! not need a second round trip.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{
    job::Job,
    member::{OrgMember, OrgRole},
};

/// The read/write envelope of a single organization member.
#[derive(Debug, Clone, Serialize)]
pub struct MemberScope {
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub role: OrgRole,
    pub has_full_access: bool,
    pub assigned_job_ids: HashSet<Uuid>,
}

impl MemberScope {
    pub fn new(member: &OrgMember, assigned_job_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            organization_id: member.organization_id,
            member_id: member.id,
            role: member.role,
            has_full_access: member.has_full_access || member.role.implies_full_access(),
            assigned_job_ids: assigned_job_ids.into_iter().collect(),
        }
    }

    /// Load a member and their job assignments.
    pub async fn load(pool: &SqlitePool, member_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let Some(member) = OrgMember::find_by_id(pool, member_id).await? else {
            return Ok(None);
        };
        let assigned = OrgMember::assigned_job_ids(pool, member.id).await?;
        Ok(Some(Self::new(&member, assigned)))
    }

    pub fn can_read_job(&self, job: &Job) -> bool {
        scoped_job_where(self).matches_job(job.organization_id, job.id)
    }

    pub fn can_manage_jobs(&self) -> bool {
        match self.role {
            OrgRole::Owner | OrgRole::Admin => true,
            OrgRole::Recruiter => self.has_full_access,
            OrgRole::HiringManager | OrgRole::Interviewer => false,
        }
    }

    pub fn can_move_applications(&self, job: &Job) -> bool {
        self.role != OrgRole::Interviewer && self.can_read_job(job)
    }

    pub fn can_score(&self, job: &Job) -> bool {
        self.can_read_job(job)
    }

    pub fn can_decide_approvals(&self) -> bool {
        self.has_full_access
            && matches!(
                self.role,
                OrgRole::Owner | OrgRole::Admin | OrgRole::HiringManager
            )
    }

    pub fn can_send_bulk_email(&self) -> bool {
        self.role != OrgRole::Interviewer
    }

    pub fn can_manage_candidates(&self) -> bool {
        self.role != OrgRole::Interviewer
    }

    pub fn can_export(&self, job: &Job) -> bool {
        self.role != OrgRole::Interviewer && self.can_read_job(job)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Organization(Uuid),
    AssignedJobs {
        organization_id: Uuid,
        job_ids: Vec<Uuid>,
    },
}

impl Scope {
    fn for_member(scope: &MemberScope) -> Self {
        if scope.has_full_access {
            return Scope::Organization(scope.organization_id);
        }
        let mut job_ids: Vec<Uuid> = scope.assigned_job_ids.iter().copied().collect();
        job_ids.sort();
        Scope::AssignedJobs {
            organization_id: scope.organization_id,
            job_ids,
        }
    }

    fn matches(&self, organization_id: Uuid, job_id: Uuid) -> bool {
        match self {
            Scope::Organization(org) => *org == organization_id,
            Scope::AssignedJobs {
                organization_id: org,
                job_ids,
            } => *org == organization_id && job_ids.contains(&job_id),
        }
    }

    fn push_sql(&self, query: &mut QueryBuilder<'_, Sqlite>, alias: &str, job_column: &str) {
        match self {
            Scope::Organization(org) => {
                query.push(format!("({alias}.organization_id = "));
                query.push_bind(*org);
                query.push(")");
            }
            Scope::AssignedJobs { job_ids, .. } if job_ids.is_empty() => {
                query.push("(1 = 0)");
            }
            Scope::AssignedJobs {
                organization_id,
                job_ids,
            } => {
                query.push(format!("({alias}.organization_id = "));
                query.push_bind(*organization_id);
                query.push(format!(" AND {alias}.{job_column} IN ("));
                let mut ids = query.separated(", ");
                for id in job_ids {
                    ids.push_bind(*id);
                }
                query.push("))");
            }
        }
    }
}

/// Row filter for the `jobs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPredicate(Scope);

impl JobPredicate {
    /// Append the predicate for a `jobs` table aliased as `alias`.
    pub fn push_sql(&self, query: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        self.0.push_sql(query, alias, "id");
    }

    pub fn matches_job(&self, organization_id: Uuid, job_id: Uuid) -> bool {
        self.0.matches(organization_id, job_id)
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self.0, Scope::Organization(_))
    }
}

/// Row filter for the `applications` table, applied through `job_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationPredicate(Scope);

impl ApplicationPredicate {
    /// Append the predicate for an `applications` table aliased as `alias`.
    pub fn push_sql(&self, query: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        self.0.push_sql(query, alias, "job_id");
    }

    pub fn matches_application(&self, organization_id: Uuid, job_id: Uuid) -> bool {
        self.0.matches(organization_id, job_id)
    }
}

pub fn scoped_job_where(scope: &MemberScope) -> JobPredicate {
    JobPredicate(Scope::for_member(scope))
}

pub fn scoped_application_where(scope: &MemberScope) -> ApplicationPredicate {
    ApplicationPredicate(Scope::for_member(scope))
}
