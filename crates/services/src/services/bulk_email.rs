//! Templated email to many applicants of one job, throttled in batches.

use std::{collections::HashSet, sync::Arc, time::Duration};

use db::{
    access_control::{MemberScope, scoped_application_where, scoped_job_where},
    models::{
        application::{Application, ApplicationWithCandidate},
        job::Job,
    },
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    config::EmailSettings,
    duplicate_detector::normalize_email,
    email::{EmailSender, OutgoingEmail},
    stage_registry::{StageRegistry, StageRegistryError},
};

#[derive(Debug, Error)]
pub enum BulkEmailError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    StageRegistry(#[from] StageRegistryError),
    #[error("job not found")]
    JobNotFound,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{requested} recipients exceeds the limit of {max}")]
    TooManyRecipients { requested: usize, max: usize },
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct BulkEmailRequest {
    /// Empty means every application of the job the sender can see.
    #[serde(default)]
    pub application_ids: Vec<Uuid>,
    pub stage_id: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
pub struct FailedRecipient {
    pub application_id: Uuid,
    pub email: String,
    pub error: String,
}

/// `requested` always equals `sent + skipped + failed.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
pub struct BulkEmailReport {
    pub requested: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: Vec<FailedRecipient>,
}

pub struct TemplateContext<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub job_title: &'a str,
    pub stage: &'a str,
}

pub fn render_template(template: &str, ctx: &TemplateContext<'_>) -> String {
    template
        .replace("{{first_name}}", ctx.first_name)
        .replace("{{last_name}}", ctx.last_name)
        .replace("{{job_title}}", ctx.job_title)
        .replace("{{stage}}", ctx.stage)
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_recipients: usize,
}

impl From<&EmailSettings> for BatchSettings {
    fn from(settings: &EmailSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            batch_delay: settings.batch_delay,
            max_recipients: settings.max_recipients,
        }
    }
}

struct Recipient {
    application_id: Uuid,
    email: OutgoingEmail,
}

#[derive(Clone)]
pub struct BulkEmailService {
    pool: SqlitePool,
    sender: Arc<dyn EmailSender>,
    settings: BatchSettings,
}

impl BulkEmailService {
    pub fn new(pool: SqlitePool, sender: Arc<dyn EmailSender>, settings: BatchSettings) -> Self {
        Self {
            pool,
            sender,
            settings,
        }
    }

    pub async fn send(
        &self,
        scope: &MemberScope,
        job_id: Uuid,
        request: &BulkEmailRequest,
    ) -> Result<BulkEmailReport, BulkEmailError> {
        if !scope.can_send_bulk_email() {
            return Err(BulkEmailError::Forbidden("cannot send bulk email"));
        }
        if request.subject.trim().is_empty() {
            return Err(BulkEmailError::EmptyField("subject"));
        }
        if request.body.trim().is_empty() {
            return Err(BulkEmailError::EmptyField("body"));
        }
        // Cap explicit ids before they become bound query parameters.
        if request.application_ids.len() > self.settings.max_recipients {
            return Err(BulkEmailError::TooManyRecipients {
                requested: request.application_ids.len(),
                max: self.settings.max_recipients,
            });
        }

        let job = Job::find_by_id_scoped(&self.pool, &scoped_job_where(scope), job_id)
            .await?
            .ok_or(BulkEmailError::JobNotFound)?;
        let registry = StageRegistry::for_job(&job)?;
        if let Some(stage_id) = request.stage_id.as_deref() {
            if !registry.contains(stage_id) {
                return Err(BulkEmailError::UnknownStage(stage_id.to_string()));
            }
        }

        let predicate = scoped_application_where(scope);
        let rows = if request.application_ids.is_empty() {
            Application::find_for_job_scoped(&self.pool, &predicate, job.id).await?
        } else {
            Application::find_by_ids_scoped(&self.pool, &predicate, job.id, &request.application_ids)
                .await?
        };
        let targets: Vec<ApplicationWithCandidate> = rows
            .into_iter()
            .filter(|row| match request.stage_id.as_deref() {
                Some(stage_id) => registry.resolve_or_initial(row.stage_id.as_deref()).id() == stage_id,
                None => true,
            })
            .collect();

        if targets.len() > self.settings.max_recipients {
            return Err(BulkEmailError::TooManyRecipients {
                requested: targets.len(),
                max: self.settings.max_recipients,
            });
        }

        let mut report = BulkEmailReport {
            requested: targets.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for row in &targets {
            let Some(normalized) = row.candidate_email.as_deref().and_then(normalize_email) else {
                debug!(application_id = %row.id, "Skipping recipient without a usable email");
                report.skipped += 1;
                continue;
            };
            if !seen.insert(normalized) {
                report.skipped += 1;
                continue;
            }

            let stage = registry.resolve_or_initial(row.stage_id.as_deref());
            let ctx = TemplateContext {
                first_name: &row.candidate_first_name,
                last_name: &row.candidate_last_name,
                job_title: &job.title,
                stage: stage.name(),
            };
            recipients.push(Recipient {
                application_id: row.id,
                email: OutgoingEmail {
                    to: row.candidate_email.clone().unwrap_or_default().trim().to_string(),
                    subject: render_template(&request.subject, &ctx),
                    body: render_template(&request.body, &ctx),
                },
            });
        }

        let batch_size = self.settings.batch_size.max(1);
        let batches = recipients.len().div_ceil(batch_size);
        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            let results = join_all(batch.iter().map(|r| self.sender.send(&r.email))).await;
            for (recipient, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        warn!(
                            application_id = %recipient.application_id,
                            error = %e,
                            "Bulk email delivery failed"
                        );
                        report.failed.push(FailedRecipient {
                            application_id: recipient.application_id,
                            email: recipient.email.to.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if index + 1 < batches && !self.settings.batch_delay.is_zero() {
                debug!(batch = index + 1, batches, "Pausing between email batches");
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            job_id = %job.id,
            sender = %scope.member_id,
            requested = report.requested,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Bulk email finished"
        );
        Ok(report)
    }
}
