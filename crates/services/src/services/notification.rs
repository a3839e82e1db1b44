//! In-app notifications for organization members.

use db::models::notification::{Notification, NotificationKind};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NotificationService {
    pool: SqlitePool,
}

impl NotificationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create one notification per member. A failed insert is logged and skipped.
    pub async fn notify_members(
        &self,
        member_ids: &[Uuid],
        kind: NotificationKind,
        title: &str,
        body: Option<&str>,
        link: Option<&str>,
    ) -> usize {
        let mut delivered = 0;
        for member_id in member_ids {
            match Notification::create(&self.pool, *member_id, kind, title, body, link).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(
                        member_id = %member_id,
                        kind = %kind,
                        error = %e,
                        "Failed to create notification"
                    );
                }
            }
        }
        debug!(kind = %kind, delivered, "Notifications created");
        delivered
    }

    pub async fn list_for_member(
        &self,
        member_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        Notification::find_for_member(&self.pool, member_id, unread_only, 100).await
    }

    /// Returns false when the notification does not exist, belongs to someone
    /// else, or was already read.
    pub async fn mark_read(&self, member_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(Notification::mark_read(&self.pool, member_id, id).await? > 0)
    }

    pub async fn mark_all_read(&self, member_id: Uuid) -> Result<u64, sqlx::Error> {
        Notification::mark_all_read(&self.pool, member_id).await
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            member::{CreateOrgMember, OrgMember, OrgRole},
            organization::Organization,
        },
    };

    use super::*;

    #[tokio::test]
    async fn test_read_state_is_per_member() {
        let db = DBService::in_memory().await.unwrap();
        let org = Organization::create(&db.pool, "Tidewater").await.unwrap();
        let mut ids = Vec::new();
        for name in ["Ines", "Kofi"] {
            let member = OrgMember::create(
                &db.pool,
                &CreateOrgMember {
                    organization_id: org.id,
                    name: name.to_string(),
                    email: format!("{}@tidewater.test", name.to_lowercase()),
                    role: OrgRole::Recruiter,
                    has_full_access: true,
                    assigned_job_ids: vec![],
                },
            )
            .await
            .unwrap();
            ids.push(member.id);
        }

        let service = NotificationService::new(db.pool.clone());
        let delivered = service
            .notify_members(&ids, NotificationKind::StageChanged, "Moved to Panel", None, None)
            .await;
        assert_eq!(delivered, 2);

        let ines = service.list_for_member(ids[0], true).await.unwrap();
        assert_eq!(ines.len(), 1);

        // Kofi cannot mark Ines's notification as read.
        assert!(!service.mark_read(ids[1], ines[0].id).await.unwrap());
        assert!(service.mark_read(ids[0], ines[0].id).await.unwrap());
        assert!(service.list_for_member(ids[0], true).await.unwrap().is_empty());
        assert_eq!(service.list_for_member(ids[0], false).await.unwrap().len(), 1);

        assert_eq!(service.mark_all_read(ids[1]).await.unwrap(), 1);
    }
}
