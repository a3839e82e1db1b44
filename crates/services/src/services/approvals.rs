//! Offer and hire sign-off on individual applications.

use db::{
    access_control::{MemberScope, scoped_application_where},
    models::{
        application::Application,
        approval::{ApprovalKind, ApprovalRequest, ApprovalStatus},
        job::Job,
        member::OrgMember,
        notification::NotificationKind,
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::notification::NotificationService;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("application not found")]
    ApplicationNotFound,
    #[error("approval request not found")]
    NotFound,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("a {0} approval is already pending for this application")]
    AlreadyPending(ApprovalKind),
    #[error("approval request is already {0}")]
    NotPending(ApprovalStatus),
    #[error("requesters cannot decide their own approval")]
    SelfDecision,
}

/// Members allowed to decide approvals in an organization.
pub async fn approval_deciders(
    pool: &SqlitePool,
    organization_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let members = OrgMember::find_by_organization(pool, organization_id).await?;
    Ok(members
        .iter()
        .filter(|member| MemberScope::new(member, []).can_decide_approvals())
        .map(|member| member.id)
        .collect())
}

fn application_link(application: &Application) -> String {
    format!(
        "/jobs/{}/applications/{}",
        application.job_id, application.id
    )
}

#[derive(Debug, Clone)]
pub struct ApprovalService {
    pool: SqlitePool,
    notifications: NotificationService,
}

impl ApprovalService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            notifications: NotificationService::new(pool.clone()),
            pool,
        }
    }

    async fn visible_application(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<(Application, Job), ApprovalError> {
        let application = Application::find_by_id_scoped(
            &self.pool,
            &scoped_application_where(scope),
            application_id,
        )
        .await?
        .ok_or(ApprovalError::ApplicationNotFound)?;
        let job = Job::find_by_id(&self.pool, application.job_id)
            .await?
            .ok_or(ApprovalError::ApplicationNotFound)?;
        Ok((application, job))
    }

    async fn find_in_organization(
        &self,
        scope: &MemberScope,
        approval_id: Uuid,
    ) -> Result<ApprovalRequest, ApprovalError> {
        ApprovalRequest::find_by_id(&self.pool, approval_id)
            .await?
            .filter(|approval| approval.organization_id == scope.organization_id)
            .ok_or(ApprovalError::NotFound)
    }

    pub async fn request_approval(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
        kind: ApprovalKind,
        note: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let (application, job) = self.visible_application(scope, application_id).await?;
        if !scope.can_move_applications(&job) {
            return Err(ApprovalError::Forbidden("cannot request approvals for this job"));
        }
        if ApprovalRequest::find_pending(&self.pool, application.id, kind)
            .await?
            .is_some()
        {
            return Err(ApprovalError::AlreadyPending(kind));
        }

        // The partial unique index catches a concurrent request that slipped past the check.
        let approval = match ApprovalRequest::create(
            &self.pool,
            scope.organization_id,
            application.id,
            kind,
            scope.member_id,
            note,
        )
        .await
        {
            Ok(approval) => approval,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ApprovalError::AlreadyPending(kind));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            approval_id = %approval.id,
            application_id = %application.id,
            kind = %kind,
            requested_by = %scope.member_id,
            "Approval requested"
        );

        let recipients: Vec<Uuid> = approval_deciders(&self.pool, scope.organization_id)
            .await?
            .into_iter()
            .filter(|id| *id != scope.member_id)
            .collect();
        let title = format!("{kind} approval requested for {}", job.title);
        self.notifications
            .notify_members(
                &recipients,
                NotificationKind::ApprovalRequested,
                &title,
                note,
                Some(&application_link(&application)),
            )
            .await;

        Ok(approval)
    }

    pub async fn decide(
        &self,
        scope: &MemberScope,
        approval_id: Uuid,
        approve: bool,
        note: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        if !scope.can_decide_approvals() {
            return Err(ApprovalError::Forbidden("cannot decide approvals"));
        }
        let approval = self.find_in_organization(scope, approval_id).await?;
        if approval.requested_by == scope.member_id {
            return Err(ApprovalError::SelfDecision);
        }
        if approval.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending(approval.status));
        }

        let status = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        let decided = self.close(approval_id, status, scope.member_id, note).await?;

        info!(
            approval_id = %decided.id,
            status = %decided.status,
            decided_by = %scope.member_id,
            "Approval decided"
        );

        let link = Application::find_by_id(&self.pool, decided.application_id)
            .await?
            .map(|application| application_link(&application));
        let title = format!("{} approval {}", decided.kind, decided.status);
        self.notifications
            .notify_members(
                &[decided.requested_by],
                NotificationKind::ApprovalDecided,
                &title,
                note,
                link.as_deref(),
            )
            .await;

        Ok(decided)
    }

    pub async fn cancel(
        &self,
        scope: &MemberScope,
        approval_id: Uuid,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let approval = self.find_in_organization(scope, approval_id).await?;
        if approval.requested_by != scope.member_id && !scope.can_decide_approvals() {
            return Err(ApprovalError::Forbidden(
                "only the requester or an approver can cancel",
            ));
        }
        if approval.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending(approval.status));
        }

        let cancelled = self
            .close(approval_id, ApprovalStatus::Cancelled, scope.member_id, None)
            .await?;
        info!(approval_id = %cancelled.id, cancelled_by = %scope.member_id, "Approval cancelled");
        Ok(cancelled)
    }

    async fn close(
        &self,
        approval_id: Uuid,
        status: ApprovalStatus,
        decided_by: Uuid,
        note: Option<&str>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        match ApprovalRequest::close(&self.pool, approval_id, status, decided_by, note).await? {
            Some(closed) => Ok(closed),
            // Someone else closed it between our read and the update.
            None => {
                let current = ApprovalRequest::find_by_id(&self.pool, approval_id)
                    .await?
                    .ok_or(ApprovalError::NotFound)?;
                Err(ApprovalError::NotPending(current.status))
            }
        }
    }

    pub async fn list_for_application(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let (application, _) = self.visible_application(scope, application_id).await?;
        Ok(ApprovalRequest::find_by_application(&self.pool, application.id).await?)
    }

    pub async fn has_approved(
        &self,
        application_id: Uuid,
        kind: ApprovalKind,
    ) -> Result<bool, ApprovalError> {
        Ok(ApprovalRequest::has_approved(&self.pool, application_id, kind).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::models::{member::OrgRole, notification::Notification};

    use super::*;
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn test_request_and_decide_offer() {
        let fx = Fixture::new().await;
        let job = fx.job("Grid Analyst", true).await;
        let recruiter = fx.member("Rae", OrgRole::Recruiter, false, &[job.id]).await;
        let manager = fx.member("Mika", OrgRole::HiringManager, true, &[]).await;
        let application = fx.application(&job, "Ana", Some("final_interview")).await;
        let service = ApprovalService::new(fx.db.pool.clone());

        let approval = service
            .request_approval(&recruiter, application.id, ApprovalKind::Offer, Some("Strong panel"))
            .await
            .unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);

        let duplicate = service
            .request_approval(&recruiter, application.id, ApprovalKind::Offer, None)
            .await;
        assert!(matches!(duplicate, Err(ApprovalError::AlreadyPending(ApprovalKind::Offer))));

        // A hire request is tracked separately.
        service
            .request_approval(&recruiter, application.id, ApprovalKind::Hire, None)
            .await
            .unwrap();

        let inbox = Notification::find_for_member(&fx.db.pool, manager.member_id, true, 10)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|n| n.kind == NotificationKind::ApprovalRequested));

        let decided = service
            .decide(&manager, approval.id, true, Some("Go ahead"))
            .await
            .unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.decided_by, Some(manager.member_id));
        assert!(service.has_approved(application.id, ApprovalKind::Offer).await.unwrap());
        assert!(!service.has_approved(application.id, ApprovalKind::Hire).await.unwrap());

        let again = service.decide(&manager, approval.id, false, None).await;
        assert!(matches!(again, Err(ApprovalError::NotPending(ApprovalStatus::Approved))));

        let requester_inbox =
            Notification::find_for_member(&fx.db.pool, recruiter.member_id, true, 10)
                .await
                .unwrap();
        assert_eq!(requester_inbox.len(), 1);
        assert_eq!(requester_inbox[0].kind, NotificationKind::ApprovalDecided);
    }

    #[tokio::test]
    async fn test_decision_rules() {
        let fx = Fixture::new().await;
        let job = fx.job("Policy Lead", true).await;
        let owner = fx.owner().await;
        let recruiter = fx.member("Rae", OrgRole::Recruiter, true, &[]).await;
        let application = fx.application(&job, "Bo", Some("offer")).await;
        let service = ApprovalService::new(fx.db.pool.clone());

        let approval = service
            .request_approval(&owner, application.id, ApprovalKind::Offer, None)
            .await
            .unwrap();

        assert!(matches!(
            service.decide(&owner, approval.id, true, None).await,
            Err(ApprovalError::SelfDecision)
        ));
        assert!(matches!(
            service.decide(&recruiter, approval.id, true, None).await,
            Err(ApprovalError::Forbidden(_))
        ));

        // Recruiters did not request it and cannot decide, so they cannot cancel.
        assert!(matches!(
            service.cancel(&recruiter, approval.id).await,
            Err(ApprovalError::Forbidden(_))
        ));
        let cancelled = service.cancel(&owner, approval.id).await.unwrap();
        assert_eq!(cancelled.status, ApprovalStatus::Cancelled);

        // A new request is allowed once the old one is closed.
        service
            .request_approval(&owner, application.id, ApprovalKind::Offer, None)
            .await
            .unwrap();
        assert_eq!(
            service
                .list_for_application(&owner, application.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_hidden_applications_and_interviewers() {
        let fx = Fixture::new().await;
        let job = fx.job("Hydrologist", false).await;
        let other_job = fx.job("Forester", false).await;
        let recruiter = fx.member("Rae", OrgRole::Recruiter, false, &[other_job.id]).await;
        let interviewer = fx.member("Ivo", OrgRole::Interviewer, false, &[job.id]).await;
        let application = fx.application(&job, "Cy", None).await;
        let service = ApprovalService::new(fx.db.pool.clone());

        assert!(matches!(
            service
                .request_approval(&recruiter, application.id, ApprovalKind::Offer, None)
                .await,
            Err(ApprovalError::ApplicationNotFound)
        ));
        assert!(matches!(
            service
                .request_approval(&interviewer, application.id, ApprovalKind::Offer, None)
                .await,
            Err(ApprovalError::Forbidden(_))
        ));
    }
}
