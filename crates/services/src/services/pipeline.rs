//! Movement of applications through a job's stages.

use db::{
    access_control::{MemberScope, scoped_application_where, scoped_job_where},
    models::{
        application::{Application, ApplicationStatus, ApplicationWithCandidate},
        approval::{ApprovalKind, ApprovalRequest},
        job::Job,
        notification::NotificationKind,
        stage_event::ApplicationStageEvent,
    },
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    approvals::approval_deciders,
    notification::NotificationService,
    stage_registry::{
        PhaseGroup, PhaseProgress, ResolvedStage, StageDefinition, StageRegistry,
        StageRegistryError,
    },
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    StageRegistry(#[from] StageRegistryError),
    #[error("job not found")]
    JobNotFound,
    #[error("application not found")]
    ApplicationNotFound,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("an approved {0} approval is required for this move")]
    ApprovalRequired(ApprovalKind),
}

/// An application together with its resolved position in the pipeline
#[derive(Debug, Clone, Serialize, TS)]
pub struct PipelineApplication {
    #[serde(flatten)]
    #[ts(flatten)]
    pub application: ApplicationWithCandidate,
    pub stage: ResolvedStage,
    /// False when the stored stage id is not part of the pipeline anymore.
    pub stage_resolved: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct JobPipeline {
    pub job: Job,
    pub stages: Vec<ResolvedStage>,
    pub applications: Vec<PipelineApplication>,
    pub progress: PhaseProgress,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct StageMove {
    pub application: Application,
    /// `None` when the application was already on the requested stage.
    pub event: Option<ApplicationStageEvent>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct StagesUpdated {
    pub stages: Vec<ResolvedStage>,
    pub relocated: usize,
}

/// Status an application takes on when it lands in `group`.
///
/// Withdrawn applications stay withdrawn unless they reach a terminal stage.
pub fn status_for_stage(group: PhaseGroup, current: ApplicationStatus) -> ApplicationStatus {
    match group {
        PhaseGroup::Hired => ApplicationStatus::Hired,
        PhaseGroup::Rejected => ApplicationStatus::Rejected,
        _ if current == ApplicationStatus::Withdrawn => ApplicationStatus::Withdrawn,
        _ => ApplicationStatus::Active,
    }
}

/// Approval a job with sign-off enabled needs before entering `group`.
pub fn required_approval(group: PhaseGroup) -> Option<ApprovalKind> {
    match group {
        PhaseGroup::Offer => Some(ApprovalKind::Offer),
        PhaseGroup::Hired => Some(ApprovalKind::Hire),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PipelineService {
    pool: SqlitePool,
    notifications: NotificationService,
}

impl PipelineService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            notifications: NotificationService::new(pool.clone()),
            pool,
        }
    }

    /// Jobs visible to the member.
    pub async fn list_jobs(&self, scope: &MemberScope) -> Result<Vec<Job>, PipelineError> {
        Ok(Job::find_scoped(&self.pool, &scoped_job_where(scope)).await?)
    }

    pub async fn find_job(&self, scope: &MemberScope, job_id: Uuid) -> Result<Job, PipelineError> {
        Job::find_by_id_scoped(&self.pool, &scoped_job_where(scope), job_id)
            .await?
            .ok_or(PipelineError::JobNotFound)
    }

    pub async fn list_applications(
        &self,
        scope: &MemberScope,
        job_id: Uuid,
    ) -> Result<JobPipeline, PipelineError> {
        let job = self.find_job(scope, job_id).await?;
        let registry = StageRegistry::for_job(&job)?;
        let rows =
            Application::find_for_job_scoped(&self.pool, &scoped_application_where(scope), job.id)
                .await?;

        let progress = registry.phase_progress(rows.iter().map(|row| row.stage_id.as_deref()));
        let applications = rows
            .into_iter()
            .map(|row| {
                let stage_resolved = row
                    .stage_id
                    .as_deref()
                    .is_none_or(|id| registry.contains(id));
                PipelineApplication {
                    stage: registry.resolve_or_initial(row.stage_id.as_deref()),
                    stage_resolved,
                    application: row,
                }
            })
            .collect();

        Ok(JobPipeline {
            stages: registry.resolved_stages(),
            job,
            applications,
            progress,
        })
    }

    pub async fn job_progress(
        &self,
        scope: &MemberScope,
        job_id: Uuid,
    ) -> Result<PhaseProgress, PipelineError> {
        Ok(self.list_applications(scope, job_id).await?.progress)
    }

    pub async fn move_application(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
        to_stage_id: &str,
        note: Option<&str>,
    ) -> Result<StageMove, PipelineError> {
        let application = Application::find_by_id_scoped(
            &self.pool,
            &scoped_application_where(scope),
            application_id,
        )
        .await?
        .ok_or(PipelineError::ApplicationNotFound)?;
        let job = Job::find_by_id(&self.pool, application.job_id)
            .await?
            .ok_or(PipelineError::JobNotFound)?;
        if !scope.can_move_applications(&job) {
            return Err(PipelineError::Forbidden("cannot move applications on this job"));
        }

        let registry = StageRegistry::for_job(&job)?;
        let target = registry
            .resolve(to_stage_id)
            .ok_or_else(|| PipelineError::UnknownStage(to_stage_id.to_string()))?;

        if application.stage_id.as_deref() == Some(target.id()) {
            debug!(application_id = %application.id, stage_id = %target.id(), "Application already on stage");
            return Ok(StageMove {
                application,
                event: None,
            });
        }

        if job.requires_offer_approval {
            if let Some(kind) = required_approval(target.phase_group()) {
                if !ApprovalRequest::has_approved(&self.pool, application.id, kind).await? {
                    return Err(PipelineError::ApprovalRequired(kind));
                }
            }
        }

        let status = status_for_stage(target.phase_group(), application.status);
        let mut tx = self.pool.begin().await?;
        let moved = Application::update_stage(&mut *tx, application.id, target.id(), status).await?;
        let event = ApplicationStageEvent::create(
            &mut *tx,
            application.id,
            application.stage_id.as_deref(),
            target.id(),
            Some(scope.member_id),
            note,
        )
        .await?;
        tx.commit().await?;

        info!(
            application_id = %moved.id,
            job_id = %job.id,
            from = ?application.stage_id,
            to = %target.id(),
            status = %moved.status,
            actor = %scope.member_id,
            "Application moved"
        );

        if target.is_terminal {
            self.announce_outcome(scope, &job, &moved, &target).await?;
        }

        Ok(StageMove {
            application: moved,
            event: Some(event),
        })
    }

    async fn announce_outcome(
        &self,
        scope: &MemberScope,
        job: &Job,
        application: &Application,
        stage: &ResolvedStage,
    ) -> Result<(), sqlx::Error> {
        let recipients: Vec<Uuid> = approval_deciders(&self.pool, scope.organization_id)
            .await?
            .into_iter()
            .filter(|id| *id != scope.member_id)
            .collect();
        let title = format!("{}: application moved to {}", job.title, stage.name());
        let link = format!("/jobs/{}/applications/{}", job.id, application.id);
        self.notifications
            .notify_members(
                &recipients,
                NotificationKind::StageChanged,
                &title,
                None,
                Some(&link),
            )
            .await;
        Ok(())
    }

    /// Replace a job's stage list, relocating applications whose stage disappeared.
    pub async fn update_job_stages(
        &self,
        scope: &MemberScope,
        job_id: Uuid,
        stages: Vec<StageDefinition>,
    ) -> Result<StagesUpdated, PipelineError> {
        let job = self.find_job(scope, job_id).await?;
        if !scope.can_manage_jobs() {
            return Err(PipelineError::Forbidden("cannot edit job stages"));
        }

        let registry = StageRegistry::new(stages)?;
        let encoded = registry.to_json()?;
        let applications = Application::find_by_job_id(&self.pool, job.id).await?;

        let mut tx = self.pool.begin().await?;
        Job::update_stages(&mut *tx, job.id, Some(&encoded)).await?;

        let mut relocated = 0;
        for application in &applications {
            let Some(current) = application.stage_id.as_deref() else {
                continue;
            };
            if registry.contains(current) {
                continue;
            }

            let target = match application.status {
                ApplicationStatus::Hired => registry.hired_stage(),
                ApplicationStatus::Rejected => registry.rejected_stage(),
                _ => None,
            }
            .unwrap_or_else(|| registry.initial_stage());
            let status = status_for_stage(target.phase_group(), application.status);

            Application::update_stage(&mut *tx, application.id, target.id(), status).await?;
            ApplicationStageEvent::create(
                &mut *tx,
                application.id,
                Some(current),
                target.id(),
                Some(scope.member_id),
                Some("Stage removed from pipeline"),
            )
            .await?;
            relocated += 1;
        }
        tx.commit().await?;

        info!(
            job_id = %job.id,
            stages = registry.len(),
            relocated,
            "Job stages updated"
        );

        Ok(StagesUpdated {
            stages: registry.resolved_stages(),
            relocated,
        })
    }

    pub async fn stage_history(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<Vec<ApplicationStageEvent>, PipelineError> {
        let application = Application::find_by_id_scoped(
            &self.pool,
            &scoped_application_where(scope),
            application_id,
        )
        .await?
        .ok_or(PipelineError::ApplicationNotFound)?;
        Ok(ApplicationStageEvent::find_by_application(&self.pool, application.id).await?)
    }
}
