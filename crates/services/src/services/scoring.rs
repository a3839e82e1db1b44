//! Interview scorecards and the advancement rule built on them.

use db::{
    access_control::{MemberScope, scoped_application_where},
    models::{
        application::Application,
        job::Job,
        scorecard::{Recommendation, Scorecard},
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::stage_registry::{StageRegistry, StageRegistryError};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    StageRegistry(#[from] StageRegistryError),
    #[error("application not found")]
    ApplicationNotFound,
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("rating must be between {MIN_RATING} and {MAX_RATING}, got {0}")]
    InvalidRating(i64),
    #[error("unknown stage: {0}")]
    UnknownStage(String),
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SubmitScorecard {
    /// Defaults to the application's current stage.
    pub stage_id: Option<String>,
    pub rating: i64,
    pub recommendation: Recommendation,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
pub struct RecommendationTally {
    pub strong_no: usize,
    pub no: usize,
    pub yes: usize,
    pub strong_yes: usize,
}

impl RecommendationTally {
    fn record(&mut self, recommendation: Recommendation) {
        match recommendation {
            Recommendation::StrongNo => self.strong_no += 1,
            Recommendation::No => self.no += 1,
            Recommendation::Yes => self.yes += 1,
            Recommendation::StrongYes => self.strong_yes += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct StageScore {
    pub stage_id: String,
    pub count: usize,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct ScoreSummary {
    pub count: usize,
    /// Rounded to two decimals; `None` without scorecards.
    pub average_rating: Option<f64>,
    pub recommendations: RecommendationTally,
    /// In order of each stage's first scorecard.
    pub by_stage: Vec<StageScore>,
}

fn average(total: i64, count: usize) -> Option<f64> {
    (count > 0).then(|| (total as f64 / count as f64 * 100.0).round() / 100.0)
}

pub fn summarize(scorecards: &[Scorecard]) -> ScoreSummary {
    let mut recommendations = RecommendationTally::default();
    let mut stages: Vec<(String, i64, usize)> = Vec::new();
    let mut total = 0;

    for card in scorecards {
        total += card.rating;
        recommendations.record(card.recommendation);
        match stages.iter_mut().find(|(id, _, _)| *id == card.stage_id) {
            Some((_, sum, count)) => {
                *sum += card.rating;
                *count += 1;
            }
            None => stages.push((card.stage_id.clone(), card.rating, 1)),
        }
    }

    ScoreSummary {
        count: scorecards.len(),
        average_rating: average(total, scorecards.len()),
        recommendations,
        by_stage: stages
            .into_iter()
            .map(|(stage_id, sum, count)| StageScore {
                stage_id,
                count,
                average_rating: average(sum, count),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
pub struct ScoringPolicy {
    pub min_scorecards: usize,
    pub advance_threshold: f64,
    pub reject_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            min_scorecards: 2,
            advance_threshold: 3.5,
            reject_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum Advancement {
    Advance,
    Hold,
    Reject,
    NeedsMoreScores,
}

pub fn advancement_recommendation(summary: &ScoreSummary, policy: &ScoringPolicy) -> Advancement {
    let Some(average) = summary.average_rating else {
        return Advancement::NeedsMoreScores;
    };
    if summary.count < policy.min_scorecards {
        Advancement::NeedsMoreScores
    } else if average >= policy.advance_threshold {
        Advancement::Advance
    } else if average <= policy.reject_threshold {
        Advancement::Reject
    } else {
        Advancement::Hold
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct AdvancementReport {
    pub application_id: Uuid,
    pub summary: ScoreSummary,
    pub recommendation: Advancement,
    pub policy: ScoringPolicy,
}

#[derive(Debug, Clone)]
pub struct ScoringService {
    pool: SqlitePool,
    policy: ScoringPolicy,
}

impl ScoringService {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_policy(pool, ScoringPolicy::default())
    }

    pub fn with_policy(pool: SqlitePool, policy: ScoringPolicy) -> Self {
        Self { pool, policy }
    }

    async fn scorable_application(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<(Application, Job), ScoringError> {
        let application = Application::find_by_id_scoped(
            &self.pool,
            &scoped_application_where(scope),
            application_id,
        )
        .await?
        .ok_or(ScoringError::ApplicationNotFound)?;
        let job = Job::find_by_id(&self.pool, application.job_id)
            .await?
            .ok_or(ScoringError::ApplicationNotFound)?;
        if !scope.can_score(&job) {
            return Err(ScoringError::Forbidden("cannot score applications on this job"));
        }
        Ok((application, job))
    }

    /// Create or replace the member's scorecard for one stage of an application.
    pub async fn submit_scorecard(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
        input: &SubmitScorecard,
    ) -> Result<Scorecard, ScoringError> {
        if !(MIN_RATING..=MAX_RATING).contains(&input.rating) {
            return Err(ScoringError::InvalidRating(input.rating));
        }
        let (application, job) = self.scorable_application(scope, application_id).await?;
        let registry = StageRegistry::for_job(&job)?;

        let stage_id = match input.stage_id.as_deref() {
            Some(id) if registry.contains(id) => id.to_string(),
            Some(id) => return Err(ScoringError::UnknownStage(id.to_string())),
            None => registry
                .resolve_or_initial(application.stage_id.as_deref())
                .id()
                .to_string(),
        };

        let scorecard = Scorecard::upsert(
            &self.pool,
            application.id,
            scope.member_id,
            &stage_id,
            input.rating,
            input.recommendation,
            input.notes.as_deref(),
        )
        .await?;

        info!(
            application_id = %application.id,
            reviewer_id = %scope.member_id,
            stage_id = %stage_id,
            rating = input.rating,
            "Scorecard submitted"
        );
        Ok(scorecard)
    }

    pub async fn scorecards(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<Vec<Scorecard>, ScoringError> {
        let (application, _) = self.scorable_application(scope, application_id).await?;
        Ok(Scorecard::find_by_application(&self.pool, application.id).await?)
    }

    pub async fn summary(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<ScoreSummary, ScoringError> {
        Ok(summarize(&self.scorecards(scope, application_id).await?))
    }

    pub async fn recommendation(
        &self,
        scope: &MemberScope,
        application_id: Uuid,
    ) -> Result<AdvancementReport, ScoringError> {
        let summary = self.summary(scope, application_id).await?;
        Ok(AdvancementReport {
            application_id,
            recommendation: advancement_recommendation(&summary, &self.policy),
            summary,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::member::OrgRole;

    use super::*;
    use crate::services::test_support::Fixture;

    fn card(stage_id: &str, rating: i64, recommendation: Recommendation) -> Scorecard {
        Scorecard {
            id: Uuid::new_v4(),
            application_id: Uuid::nil(),
            reviewer_id: Uuid::new_v4(),
            stage_id: stage_id.to_string(),
            rating,
            recommendation,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize() {
        let empty = summarize(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.average_rating, None);
        assert!(empty.by_stage.is_empty());

        let summary = summarize(&[
            card("screening", 4, Recommendation::Yes),
            card("interview", 5, Recommendation::StrongYes),
            card("screening", 3, Recommendation::No),
        ]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average_rating, Some(4.0));
        assert_eq!(
            summary.recommendations,
            RecommendationTally {
                strong_no: 0,
                no: 1,
                yes: 1,
                strong_yes: 1,
            }
        );
        assert_eq!(summary.by_stage[0].stage_id, "screening");
        assert_eq!(summary.by_stage[0].average_rating, Some(3.5));
        assert_eq!(summary.by_stage[1].count, 1);

        let thirds = summarize(&[
            card("interview", 4, Recommendation::Yes),
            card("interview", 4, Recommendation::Yes),
            card("interview", 3, Recommendation::No),
        ]);
        assert_eq!(thirds.average_rating, Some(3.67));
    }

    #[test]
    fn test_advancement_thresholds() {
        let policy = ScoringPolicy::default();
        let decide = |cards: &[Scorecard]| advancement_recommendation(&summarize(cards), &policy);

        assert_eq!(decide(&[]), Advancement::NeedsMoreScores);
        assert_eq!(
            decide(&[card("s", 5, Recommendation::StrongYes)]),
            Advancement::NeedsMoreScores
        );
        assert_eq!(
            decide(&[card("s", 4, Recommendation::Yes), card("s", 3, Recommendation::Yes)]),
            Advancement::Advance
        );
        assert_eq!(
            decide(&[card("s", 3, Recommendation::Yes), card("s", 3, Recommendation::No)]),
            Advancement::Hold
        );
        assert_eq!(
            decide(&[card("s", 2, Recommendation::No), card("s", 2, Recommendation::StrongNo)]),
            Advancement::Reject
        );
    }

    #[tokio::test]
    async fn test_submit_defaults_stage_and_replaces() {
        let fx = Fixture::new().await;
        let job = fx.job("Carbon Accountant", false).await;
        let interviewer = fx.member("Ivo", OrgRole::Interviewer, false, &[job.id]).await;
        let application = fx.application(&job, "Ana", Some("interview")).await;
        let service = ScoringService::new(fx.db.pool.clone());

        let input = SubmitScorecard {
            stage_id: None,
            rating: 2,
            recommendation: Recommendation::No,
            notes: Some("Thin on modelling".to_string()),
        };
        let first = service
            .submit_scorecard(&interviewer, application.id, &input)
            .await
            .unwrap();
        assert_eq!(first.stage_id, "interview");

        let revised = service
            .submit_scorecard(
                &interviewer,
                application.id,
                &SubmitScorecard {
                    rating: 4,
                    recommendation: Recommendation::Yes,
                    ..input.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(revised.id, first.id);

        let cards = service.scorecards(&interviewer, application.id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].rating, 4);

        let report = service.recommendation(&interviewer, application.id).await.unwrap();
        assert_eq!(report.recommendation, Advancement::NeedsMoreScores);
        assert_eq!(report.summary.average_rating, Some(4.0));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let fx = Fixture::new().await;
        let job = fx.job("Ecologist", false).await;
        let other = fx.job("Surveyor", false).await;
        let owner = fx.owner().await;
        let outsider = fx.member("Ivo", OrgRole::Interviewer, false, &[other.id]).await;
        let application = fx.application(&job, "Bo", None).await;
        let service = ScoringService::new(fx.db.pool.clone());

        let input = |stage: Option<&str>, rating| SubmitScorecard {
            stage_id: stage.map(str::to_string),
            rating,
            recommendation: Recommendation::Yes,
            notes: None,
        };

        assert!(matches!(
            service.submit_scorecard(&owner, application.id, &input(None, 6)).await,
            Err(ScoringError::InvalidRating(6))
        ));
        assert!(matches!(
            service.submit_scorecard(&owner, application.id, &input(None, 0)).await,
            Err(ScoringError::InvalidRating(0))
        ));
        assert!(matches!(
            service
                .submit_scorecard(&owner, application.id, &input(Some("coffee"), 3))
                .await,
            Err(ScoringError::UnknownStage(_))
        ));
        assert!(matches!(
            service.submit_scorecard(&outsider, application.id, &input(None, 3)).await,
            Err(ScoringError::ApplicationNotFound)
        ));

        // An unplaced application is scored against the initial stage.
        let card = service
            .submit_scorecard(&owner, application.id, &input(None, 3))
            .await
            .unwrap();
        assert_eq!(card.stage_id, "applied");
    }
}
