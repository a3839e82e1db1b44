use db::{
    DBService,
    access_control::MemberScope,
    models::{
        application::{Application, CreateApplication},
        candidate::{Candidate, CandidateKeys, CreateCandidate},
        job::{CreateJob, Job},
        member::{CreateOrgMember, OrgMember, OrgRole},
        organization::Organization,
    },
};
use uuid::Uuid;

pub(crate) struct Fixture {
    pub db: DBService,
    pub org: Organization,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = DBService::in_memory().await.unwrap();
        let org = Organization::create(&db.pool, "Canopy Climate").await.unwrap();
        Self { db, org }
    }

    pub async fn job(&self, title: &str, requires_offer_approval: bool) -> Job {
        Job::create(
            &self.db.pool,
            &CreateJob {
                organization_id: self.org.id,
                title: title.to_string(),
                stages: None,
                requires_offer_approval,
                status: None,
            },
        )
        .await
        .unwrap()
    }

    pub async fn member(&self, name: &str, role: OrgRole, has_full_access: bool, jobs: &[Uuid]) -> MemberScope {
        let member = OrgMember::create(
            &self.db.pool,
            &CreateOrgMember {
                organization_id: self.org.id,
                name: name.to_string(),
                email: format!("{}@canopy.test", name.to_lowercase()),
                role,
                has_full_access,
                assigned_job_ids: jobs.to_vec(),
            },
        )
        .await
        .unwrap();
        MemberScope::load(&self.db.pool, member.id).await.unwrap().unwrap()
    }

    pub async fn owner(&self) -> MemberScope {
        self.member("Olu", OrgRole::Owner, true, &[]).await
    }

    pub async fn candidate(&self, first_name: &str, email: Option<&str>) -> Candidate {
        Candidate::create(
            &self.db.pool,
            &CreateCandidate {
                organization_id: self.org.id,
                first_name: first_name.to_string(),
                last_name: "Rivera".to_string(),
                email: email.map(str::to_string),
                linkedin_url: None,
            },
            &CandidateKeys::default(),
        )
        .await
        .unwrap()
    }

    pub async fn application(&self, job: &Job, first_name: &str, stage_id: Option<&str>) -> Application {
        let email = format!("{}@example.org", first_name.to_lowercase());
        let candidate = self.candidate(first_name, Some(&email)).await;
        Application::create(
            &self.db.pool,
            self.org.id,
            &CreateApplication {
                job_id: job.id,
                candidate_id: candidate.id,
                stage_id: stage_id.map(str::to_string),
            },
        )
        .await
        .unwrap()
    }
}
