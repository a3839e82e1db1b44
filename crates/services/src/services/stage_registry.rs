//! Resolution of a job's pipeline stages.
//!
//! Jobs persist their stages as a JSON array of `{id, name, phaseGroup}`
//! objects. A job without custom stages uses [`default_stages`].

use std::collections::{BTreeMap, HashSet};

use db::models::job::Job;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;

/// Coarse bucket a stage belongs to, used for progress reporting and gating
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhaseGroup {
    Applied,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected,
}

impl PhaseGroup {
    pub const ALL: [PhaseGroup; 6] = [
        PhaseGroup::Applied,
        PhaseGroup::Screening,
        PhaseGroup::Interview,
        PhaseGroup::Offer,
        PhaseGroup::Hired,
        PhaseGroup::Rejected,
    ];

    /// Applications in a terminal group have left the active pipeline.
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseGroup::Hired | PhaseGroup::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    pub phase_group: PhaseGroup,
}

impl StageDefinition {
    pub fn new(id: &str, name: &str, phase_group: PhaseGroup) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            phase_group,
        }
    }
}

/// A stage together with where it sits in the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStage {
    #[serde(flatten)]
    #[ts(flatten)]
    pub stage: StageDefinition,
    pub position: usize,
    pub is_terminal: bool,
    /// Position zero, whatever its group.
    pub is_first: bool,
    /// The first non-terminal stage, where new applications land.
    pub is_initial: bool,
    pub is_last: bool,
}

impl ResolvedStage {
    pub fn id(&self) -> &str {
        &self.stage.id
    }

    pub fn name(&self) -> &str {
        &self.stage.name
    }

    pub fn phase_group(&self) -> PhaseGroup {
        self.stage.phase_group
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StageCount {
    pub stage_id: String,
    pub name: String,
    pub phase_group: PhaseGroup,
    pub count: usize,
}

/// Application counts per phase group and per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PhaseProgress {
    pub by_group: BTreeMap<PhaseGroup, usize>,
    pub by_stage: Vec<StageCount>,
    pub total: usize,
    /// Applications whose stage id is not part of the pipeline.
    pub unresolved: usize,
}

impl PhaseProgress {
    pub fn count(&self, group: PhaseGroup) -> usize {
        self.by_group.get(&group).copied().unwrap_or(0)
    }

    /// Applications still moving through non-terminal stages.
    pub fn active(&self) -> usize {
        PhaseGroup::ALL
            .iter()
            .filter(|group| !group.is_terminal())
            .map(|group| self.count(*group))
            .sum()
    }
}

#[derive(Debug, Error)]
pub enum StageRegistryError {
    #[error("malformed stage list: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("duplicate stage id: {0}")]
    DuplicateId(String),
    #[error("stage ids must not be blank")]
    BlankId,
    #[error("stage {0} has a blank name")]
    BlankName(String),
    #[error("pipeline needs at least one non-terminal stage")]
    NoOpenStage,
}

/// Built-in pipeline for jobs that never customised their stages.
pub fn default_stages() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new("applied", "Applied", PhaseGroup::Applied),
        StageDefinition::new("screening", "Screening", PhaseGroup::Screening),
        StageDefinition::new("interview", "Interview", PhaseGroup::Interview),
        StageDefinition::new("final_interview", "Final Interview", PhaseGroup::Interview),
        StageDefinition::new("offer", "Offer", PhaseGroup::Offer),
        StageDefinition::new("hired", "Hired", PhaseGroup::Hired),
        StageDefinition::new("rejected", "Rejected", PhaseGroup::Rejected),
    ]
}

/// Ordered, validated stage list of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
    initial: usize,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            initial: 0,
        }
    }
}

impl StageRegistry {
    pub fn new(stages: Vec<StageDefinition>) -> Result<Self, StageRegistryError> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.id.trim().is_empty() {
                return Err(StageRegistryError::BlankId);
            }
            if stage.name.trim().is_empty() {
                return Err(StageRegistryError::BlankName(stage.id.clone()));
            }
            if !seen.insert(stage.id.as_str()) {
                return Err(StageRegistryError::DuplicateId(stage.id.clone()));
            }
        }

        let initial = stages
            .iter()
            .position(|stage| !stage.phase_group.is_terminal())
            .ok_or(StageRegistryError::NoOpenStage)?;

        Ok(Self { stages, initial })
    }

    /// Parse the persisted form. Missing, `null` or empty lists fall back to the defaults.
    pub fn from_json(raw: Option<&str>) -> Result<Self, StageRegistryError> {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::default());
        };

        let stages: Option<Vec<StageDefinition>> = serde_json::from_str(raw)?;
        match stages {
            Some(stages) if !stages.is_empty() => Self::new(stages),
            _ => Ok(Self::default()),
        }
    }

    pub fn for_job(job: &Job) -> Result<Self, StageRegistryError> {
        Self::from_json(job.stages.as_deref())
    }

    pub fn to_json(&self) -> Result<String, StageRegistryError> {
        Ok(serde_json::to_string(&self.stages)?)
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn resolved_stages(&self) -> Vec<ResolvedStage> {
        (0..self.stages.len()).map(|pos| self.resolved_at(pos)).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, stage_id: &str) -> bool {
        self.position_of(stage_id).is_some()
    }

    fn position_of(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id == stage_id)
    }

    fn resolved_at(&self, position: usize) -> ResolvedStage {
        let stage = self.stages[position].clone();
        ResolvedStage {
            is_terminal: stage.phase_group.is_terminal(),
            is_first: position == 0,
            is_initial: position == self.initial,
            is_last: position + 1 == self.stages.len(),
            position,
            stage,
        }
    }

    pub fn resolve(&self, stage_id: &str) -> Option<ResolvedStage> {
        self.position_of(stage_id).map(|pos| self.resolved_at(pos))
    }

    /// Resolve `stage_id`, treating missing or unknown ids as the initial stage.
    pub fn resolve_or_initial(&self, stage_id: Option<&str>) -> ResolvedStage {
        stage_id
            .and_then(|id| self.resolve(id))
            .unwrap_or_else(|| self.initial_stage())
    }

    /// First non-terminal stage; where new applications land.
    pub fn initial_stage(&self) -> ResolvedStage {
        self.resolved_at(self.initial)
    }

    /// Next non-terminal stage after `stage_id`. Terminal stages have no successor.
    pub fn next_stage(&self, stage_id: &str) -> Option<ResolvedStage> {
        let position = self.position_of(stage_id)?;
        if self.stages[position].phase_group.is_terminal() {
            return None;
        }
        (position + 1..self.stages.len())
            .find(|pos| !self.stages[*pos].phase_group.is_terminal())
            .map(|pos| self.resolved_at(pos))
    }

    /// Closest non-terminal stage before `stage_id`.
    pub fn previous_stage(&self, stage_id: &str) -> Option<ResolvedStage> {
        let position = self.position_of(stage_id)?;
        (0..position)
            .rev()
            .find(|pos| !self.stages[*pos].phase_group.is_terminal())
            .map(|pos| self.resolved_at(pos))
    }

    pub fn stages_in_group(&self, group: PhaseGroup) -> Vec<&StageDefinition> {
        self.stages
            .iter()
            .filter(|stage| stage.phase_group == group)
            .collect()
    }

    pub fn first_stage_in_group(&self, group: PhaseGroup) -> Option<ResolvedStage> {
        self.stages
            .iter()
            .position(|stage| stage.phase_group == group)
            .map(|pos| self.resolved_at(pos))
    }

    pub fn hired_stage(&self) -> Option<ResolvedStage> {
        self.first_stage_in_group(PhaseGroup::Hired)
    }

    pub fn rejected_stage(&self) -> Option<ResolvedStage> {
        self.first_stage_in_group(PhaseGroup::Rejected)
    }

    /// Count applications by phase group and stage.
    ///
    /// `None` and ids outside the pipeline count towards the initial stage.
    /// Ids outside the pipeline are also tallied in `unresolved`.
    pub fn phase_progress<'a, I>(&self, stage_ids: I) -> PhaseProgress
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut per_stage = vec![0usize; self.stages.len()];
        let mut unresolved = 0;
        let mut total = 0;

        for stage_id in stage_ids {
            total += 1;
            match stage_id {
                None => per_stage[self.initial] += 1,
                Some(id) => match self.position_of(id) {
                    Some(pos) => per_stage[pos] += 1,
                    None => {
                        per_stage[self.initial] += 1;
                        unresolved += 1;
                    }
                },
            }
        }

        let mut by_group: BTreeMap<PhaseGroup, usize> =
            PhaseGroup::ALL.iter().map(|group| (*group, 0)).collect();
        let by_stage = self
            .stages
            .iter()
            .zip(per_stage)
            .map(|(stage, count)| {
                *by_group.entry(stage.phase_group).or_default() += count;
                StageCount {
                    stage_id: stage.id.clone(),
                    name: stage.name.clone(),
                    phase_group: stage.phase_group,
                    count,
                }
            })
            .collect();

        PhaseProgress {
            by_group,
            by_stage,
            total,
            unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> StageRegistry {
        StageRegistry::new(vec![
            StageDefinition::new("rejected", "Not a fit", PhaseGroup::Rejected),
            StageDefinition::new("new", "New", PhaseGroup::Applied),
            StageDefinition::new("call", "Intro Call", PhaseGroup::Screening),
            StageDefinition::new("panel", "Panel", PhaseGroup::Interview),
            StageDefinition::new("hired", "Hired", PhaseGroup::Hired),
        ])
        .unwrap()
    }

    #[test]
    fn test_missing_or_empty_stages_use_defaults() {
        for raw in [None, Some(""), Some("   "), Some("null"), Some("[]")] {
            let registry = StageRegistry::from_json(raw).unwrap();
            assert_eq!(registry.stages(), default_stages().as_slice());
        }
    }

    #[test]
    fn test_parses_persisted_camel_case_json() {
        let raw = r#"[
            {"id": "sourced", "name": "Sourced", "phaseGroup": "applied"},
            {"id": "tech", "name": "Technical", "phaseGroup": "interview"},
            {"id": "no", "name": "Declined", "phaseGroup": "rejected"}
        ]"#;
        let registry = StageRegistry::from_json(Some(raw)).unwrap();
        assert_eq!(registry.len(), 3);

        let tech = registry.resolve("tech").unwrap();
        assert_eq!(tech.position, 1);
        assert_eq!(tech.phase_group(), PhaseGroup::Interview);
        assert!(!tech.is_terminal);

        let json = registry.to_json().unwrap();
        assert!(json.contains(r#""phaseGroup":"interview""#));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let err = StageRegistry::from_json(Some("{not json")).unwrap_err();
        assert!(matches!(err, StageRegistryError::Malformed(_)));

        let err = StageRegistry::from_json(Some(r#"[{"id":"x","name":"X","phaseGroup":"limbo"}]"#))
            .unwrap_err();
        assert!(matches!(err, StageRegistryError::Malformed(_)));
    }

    #[test]
    fn test_validation_rejects_bad_stage_lists() {
        let dup = StageRegistry::new(vec![
            StageDefinition::new("a", "A", PhaseGroup::Applied),
            StageDefinition::new("a", "Again", PhaseGroup::Screening),
        ]);
        assert!(matches!(dup, Err(StageRegistryError::DuplicateId(id)) if id == "a"));

        let blank = StageRegistry::new(vec![StageDefinition::new(" ", "A", PhaseGroup::Applied)]);
        assert!(matches!(blank, Err(StageRegistryError::BlankId)));

        let unnamed = StageRegistry::new(vec![StageDefinition::new("a", "", PhaseGroup::Applied)]);
        assert!(matches!(unnamed, Err(StageRegistryError::BlankName(_))));

        let closed = StageRegistry::new(vec![
            StageDefinition::new("hired", "Hired", PhaseGroup::Hired),
            StageDefinition::new("rejected", "Rejected", PhaseGroup::Rejected),
        ]);
        assert!(matches!(closed, Err(StageRegistryError::NoOpenStage)));
    }

    #[test]
    fn test_initial_stage_skips_leading_terminal_stages() {
        let registry = custom();
        let initial = registry.initial_stage();
        assert_eq!(initial.id(), "new");
        assert!(initial.is_initial);

        assert_eq!(registry.resolve_or_initial(None).id(), "new");
        assert_eq!(registry.resolve_or_initial(Some("gone")).id(), "new");
        assert_eq!(registry.resolve_or_initial(Some("panel")).id(), "panel");
    }

    #[test]
    fn test_next_and_previous_walk_open_stages() {
        let registry = StageRegistry::default();
        assert_eq!(registry.next_stage("applied").unwrap().id(), "screening");
        assert_eq!(registry.next_stage("final_interview").unwrap().id(), "offer");
        assert!(registry.next_stage("offer").is_none());
        assert!(registry.next_stage("hired").is_none());
        assert!(registry.next_stage("unknown").is_none());

        assert_eq!(registry.previous_stage("offer").unwrap().id(), "final_interview");
        assert_eq!(registry.previous_stage("rejected").unwrap().id(), "offer");
        assert!(registry.previous_stage("applied").is_none());
    }

    #[test]
    fn test_resolved_stages_follow_pipeline_order() {
        let resolved = custom().resolved_stages();
        let ids: Vec<&str> = resolved.iter().map(|stage| stage.id()).collect();
        assert_eq!(ids, ["rejected", "new", "call", "panel", "hired"]);
        assert!(resolved[0].is_first && !resolved[0].is_initial);
        assert!(resolved[1].is_initial && !resolved[1].is_first);
        assert!(resolved[4].is_last && resolved[4].is_terminal);
    }

    #[test]
    fn test_group_lookups() {
        let registry = StageRegistry::default();
        assert_eq!(registry.stages_in_group(PhaseGroup::Interview).len(), 2);
        assert_eq!(registry.hired_stage().unwrap().id(), "hired");
        assert_eq!(registry.rejected_stage().unwrap().id(), "rejected");
        assert!(registry.rejected_stage().unwrap().is_last);

        let registry = StageRegistry::new(vec![StageDefinition::new("only", "Only", PhaseGroup::Applied)])
            .unwrap();
        assert!(registry.hired_stage().is_none());
    }

    #[test]
    fn test_phase_progress_counts_every_group() {
        let registry = StageRegistry::default();
        let ids = [
            Some("applied"),
            None,
            Some("interview"),
            Some("final_interview"),
            Some("hired"),
            Some("rejected"),
            Some("archived-stage"),
        ];
        let progress = registry.phase_progress(ids);

        assert_eq!(progress.total, 7);
        assert_eq!(progress.unresolved, 1);
        assert_eq!(progress.count(PhaseGroup::Applied), 3);
        assert_eq!(progress.count(PhaseGroup::Screening), 0);
        assert_eq!(progress.count(PhaseGroup::Interview), 2);
        assert_eq!(progress.count(PhaseGroup::Hired), 1);
        assert_eq!(progress.active(), 5);
        assert_eq!(progress.by_group.len(), PhaseGroup::ALL.len());
        assert_eq!(progress.by_stage[0].count, 3);
        assert_eq!(progress.by_group.values().sum::<usize>(), progress.total);
    }
}
