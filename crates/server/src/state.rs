use std::sync::Arc;

use db::DBService;
use services::services::{
    approvals::ApprovalService,
    bulk_email::BulkEmailService,
    config::Config,
    csv_export::CsvExportService,
    duplicate_detector::DuplicateDetector,
    email::EmailSender,
    notification::NotificationService,
    pipeline::PipelineService,
    rate_limiter::SlidingWindowRateLimiter,
    scoring::ScoringService,
};

/// Shared handles for every request handler
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<Config>,
    rate_limiter: Arc<SlidingWindowRateLimiter>,
    duplicates: DuplicateDetector,
    email_sender: Arc<dyn EmailSender>,
}

impl AppState {
    pub fn new(db: DBService, config: Config, email_sender: Arc<dyn EmailSender>) -> Self {
        Self {
            rate_limiter: Arc::new(SlidingWindowRateLimiter::new(
                config.rate_limit.requests,
                config.rate_limit.window,
            )),
            duplicates: DuplicateDetector::new(db.pool.clone(), config.duplicate_cache_ttl),
            config: Arc::new(config),
            db,
            email_sender,
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn rate_limiter(&self) -> &Arc<SlidingWindowRateLimiter> {
        &self.rate_limiter
    }

    pub fn duplicates(&self) -> &DuplicateDetector {
        &self.duplicates
    }

    pub fn pipeline(&self) -> PipelineService {
        PipelineService::new(self.db.pool.clone())
    }

    pub fn scoring(&self) -> ScoringService {
        ScoringService::new(self.db.pool.clone())
    }

    pub fn approvals(&self) -> ApprovalService {
        ApprovalService::new(self.db.pool.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.pool.clone())
    }

    pub fn csv_export(&self) -> CsvExportService {
        CsvExportService::new(self.db.pool.clone())
    }

    pub fn bulk_email(&self) -> BulkEmailService {
        BulkEmailService::new(
            self.db.pool.clone(),
            self.email_sender.clone(),
            (&self.config.email).into(),
        )
    }
}
