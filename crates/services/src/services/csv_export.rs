//! Spreadsheet export of a job's pipeline.

use std::{collections::HashMap, string::FromUtf8Error};

use chrono::{DateTime, SecondsFormat, Utc};
use db::{
    access_control::{MemberScope, scoped_application_where, scoped_job_where},
    models::{
        application::Application,
        job::Job,
        scorecard::{RatingAggregate, Scorecard},
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::stage_registry::{StageRegistry, StageRegistryError};

pub const HEADER: [&str; 9] = [
    "Candidate Name",
    "Email",
    "Stage",
    "Phase",
    "Status",
    "Applied At",
    "Stage Entered At",
    "Average Rating",
    "Scorecards",
];

#[derive(Debug, Error)]
pub enum CsvExportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    StageRegistry(#[from] StageRegistryError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("job not found")]
    JobNotFound,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
}

/// Prefix cells a spreadsheet would evaluate as a formula.
pub fn escape_cell(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{value}"),
        _ => value.to_string(),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// File name for a job's export, e.g. `grid-analyst-pipeline.csv`.
pub fn export_filename(job: &Job) -> String {
    let slug = job
        .title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "pipeline.csv".to_string()
    } else {
        format!("{slug}-pipeline.csv")
    }
}

#[derive(Debug, Clone)]
pub struct CsvExportService {
    pool: SqlitePool,
}

impl CsvExportService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn export_job_pipeline(
        &self,
        scope: &MemberScope,
        job_id: Uuid,
    ) -> Result<(Job, String), CsvExportError> {
        let job = Job::find_by_id_scoped(&self.pool, &scoped_job_where(scope), job_id)
            .await?
            .ok_or(CsvExportError::JobNotFound)?;
        if !scope.can_export(&job) {
            return Err(CsvExportError::Forbidden("cannot export this job"));
        }

        let registry = StageRegistry::for_job(&job)?;
        let mut rows =
            Application::find_for_job_scoped(&self.pool, &scoped_application_where(scope), job.id)
                .await?;
        let ratings: HashMap<Uuid, RatingAggregate> =
            Scorecard::aggregates_for_job(&self.pool, job.id)
                .await?
                .into_iter()
                .map(|aggregate| (aggregate.application_id, aggregate))
                .collect();

        // Rows arrive oldest first, so a stable sort keeps applied order within a stage.
        rows.sort_by_key(|row| registry.resolve_or_initial(row.stage_id.as_deref()).position);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADER)?;
        for row in &rows {
            let stage = registry.resolve_or_initial(row.stage_id.as_deref());
            let rating = ratings.get(&row.id);
            let record = [
                row.candidate_name(),
                row.candidate_email.clone().unwrap_or_default(),
                stage.name().to_string(),
                stage.phase_group().to_string(),
                row.status.to_string(),
                timestamp(row.applied_at),
                timestamp(row.stage_entered_at),
                rating
                    .map(|r| format!("{:.2}", r.average_rating))
                    .unwrap_or_default(),
                rating.map_or(0, |r| r.scorecard_count).to_string(),
            ];
            writer.write_record(record.iter().map(|cell| escape_cell(cell)))?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        let csv = String::from_utf8(bytes)?;

        info!(job_id = %job.id, rows = rows.len(), exported_by = %scope.member_id, "Pipeline exported");
        Ok((job, csv))
    }
}

#[cfg(test)]
mod tests {
    use db::models::{member::OrgRole, scorecard::Recommendation};

    use super::*;
    use crate::services::test_support::Fixture;

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("=SUM(A1:A3)"), "'=SUM(A1:A3)");
        assert_eq!(escape_cell("+44 20 7946 0000"), "'+44 20 7946 0000");
        assert_eq!(escape_cell("-1"), "'-1");
        assert_eq!(escape_cell("@handle"), "'@handle");
        assert_eq!(escape_cell("\tindent"), "'\tindent");
        assert_eq!(escape_cell("\rreturn"), "'\rreturn");
        assert_eq!(escape_cell("Ana Rivera"), "Ana Rivera");
        assert_eq!(escape_cell(""), "");
    }

    #[test]
    fn test_export_filename() {
        let job = Job {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: "Senior Grid Analyst (Remote)".to_string(),
            stages: None,
            requires_offer_approval: false,
            status: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(export_filename(&job), "senior-grid-analyst-remote-pipeline.csv");
    }

    #[tokio::test]
    async fn test_export_orders_by_stage_and_defuses_formulas() {
        let fx = Fixture::new().await;
        let job = fx.job("Grid Analyst", false).await;
        let owner = fx.owner().await;
        let late = fx.application(&job, "Ana", Some("interview")).await;
        fx.application(&job, "=HYPERLINK", Some("screening")).await;
        fx.application(&job, "Cy", Some("retired_stage")).await;

        Scorecard::upsert(&fx.db.pool, late.id, owner.member_id, "interview", 4, Recommendation::Yes, None)
            .await
            .unwrap();

        let service = CsvExportService::new(fx.db.pool.clone());
        let (_, csv) = service.export_job_pipeline(&owner, job.id).await.unwrap();

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), HEADER);

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        // Unknown stage exports as the initial stage and sorts first.
        assert_eq!(&records[0][0], "Cy Rivera");
        assert_eq!(&records[0][2], "Applied");
        assert_eq!(&records[0][3], "applied");
        assert_eq!(&records[1][0], "'=HYPERLINK Rivera");
        assert_eq!(&records[1][2], "Screening");
        assert_eq!(&records[2][0], "Ana Rivera");
        assert_eq!(&records[2][4], "active");
        assert_eq!(&records[2][7], "4.00");
        assert_eq!(&records[2][8], "1");
        assert_eq!(&records[0][7], "");
        assert_eq!(&records[0][8], "0");
    }

    #[tokio::test]
    async fn test_interviewers_cannot_export() {
        let fx = Fixture::new().await;
        let job = fx.job("Ecologist", false).await;
        let interviewer = fx.member("Ivo", OrgRole::Interviewer, false, &[job.id]).await;
        let service = CsvExportService::new(fx.db.pool.clone());

        assert!(matches!(
            service.export_job_pipeline(&interviewer, job.id).await,
            Err(CsvExportError::Forbidden(_))
        ));
    }
}
