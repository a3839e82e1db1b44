//! Detection of candidates already known to an organization.

use std::time::Duration;

use db::models::candidate::{Candidate, CandidateKeys, CreateCandidate};
use moka::future::Cache;
use serde::Serialize;
use sqlx::SqlitePool;
use strum_macros::Display;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

const GMAIL_DOMAINS: [&str; 2] = ["gmail.com", "googlemail.com"];

/// Normalise an email for duplicate comparison.
///
/// Gmail ignores dots and `+tag` suffixes in the local part, so those are
/// stripped for gmail.com and googlemail.com addresses.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return None;
    }

    if GMAIL_DOMAINS.contains(&domain) {
        let local = local.split('+').next().unwrap_or(local).replace('.', "");
        if local.is_empty() {
            return None;
        }
        return Some(format!("{local}@gmail.com"));
    }

    Some(format!("{local}@{domain}"))
}

/// Extract the lowercase `/in/<handle>` slug from a LinkedIn profile URL.
pub fn linkedin_slug(raw: &str) -> Option<String> {
    let url = raw.trim().to_lowercase();
    let (_, rest) = url.split_once("linkedin.com/in/")?;
    let handle = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    (!handle.is_empty()).then(|| handle.to_string())
}

pub fn candidate_keys(email: Option<&str>, linkedin_url: Option<&str>) -> CandidateKeys {
    CandidateKeys {
        email_normalized: email.and_then(normalize_email),
        linkedin_slug: linkedin_url.and_then(linkedin_slug),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchKind {
    Email,
    Linkedin,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct DuplicateMatch {
    pub candidate: Candidate,
    pub matched_on: MatchKind,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct CandidateCreated {
    pub candidate: Candidate,
    pub possible_duplicate: Option<DuplicateMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    organization_id: Uuid,
    kind: MatchKind,
    value: String,
}

/// Cached lookup of existing candidates by normalised email or LinkedIn handle
#[derive(Clone)]
pub struct DuplicateDetector {
    pool: SqlitePool,
    cache: Cache<CacheKey, Option<Candidate>>,
}

impl DuplicateDetector {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Oldest matching candidate, checking email before LinkedIn.
    pub async fn find_duplicate(
        &self,
        organization_id: Uuid,
        email: Option<&str>,
        linkedin_url: Option<&str>,
    ) -> Result<Option<DuplicateMatch>, sqlx::Error> {
        let keys = candidate_keys(email, linkedin_url);

        let lookups = [
            (MatchKind::Email, keys.email_normalized),
            (MatchKind::Linkedin, keys.linkedin_slug),
        ];
        for (kind, value) in lookups {
            let Some(value) = value else { continue };
            if let Some(candidate) = self.lookup(organization_id, kind, value).await? {
                return Ok(Some(DuplicateMatch {
                    candidate,
                    matched_on: kind,
                }));
            }
        }

        Ok(None)
    }

    async fn lookup(
        &self,
        organization_id: Uuid,
        kind: MatchKind,
        value: String,
    ) -> Result<Option<Candidate>, sqlx::Error> {
        let key = CacheKey {
            organization_id,
            kind,
            value,
        };
        if let Some(hit) = self.cache.get(&key).await {
            debug!(kind = %kind, "Duplicate lookup served from cache");
            return Ok(hit);
        }

        let found = match kind {
            MatchKind::Email => {
                Candidate::find_by_normalized_email(&self.pool, organization_id, &key.value).await?
            }
            MatchKind::Linkedin => {
                Candidate::find_by_linkedin_slug(&self.pool, organization_id, &key.value).await?
            }
        };
        self.cache.insert(key, found.clone()).await;
        Ok(found)
    }

    /// Forget cached lookups touching these contact details.
    pub async fn invalidate(
        &self,
        organization_id: Uuid,
        email: Option<&str>,
        linkedin_url: Option<&str>,
    ) {
        let keys = candidate_keys(email, linkedin_url);
        let stale = [
            (MatchKind::Email, keys.email_normalized),
            (MatchKind::Linkedin, keys.linkedin_slug),
        ];
        for (kind, value) in stale {
            if let Some(value) = value {
                self.cache
                    .invalidate(&CacheKey {
                        organization_id,
                        kind,
                        value,
                    })
                    .await;
            }
        }
    }

    /// Create a candidate, reporting any earlier candidate with the same contact details.
    pub async fn create_candidate(
        &self,
        data: &CreateCandidate,
    ) -> Result<CandidateCreated, sqlx::Error> {
        let possible_duplicate = self
            .find_duplicate(
                data.organization_id,
                data.email.as_deref(),
                data.linkedin_url.as_deref(),
            )
            .await?;

        let keys = candidate_keys(data.email.as_deref(), data.linkedin_url.as_deref());
        let candidate = Candidate::create(&self.pool, data, &keys).await?;
        self.invalidate(
            data.organization_id,
            data.email.as_deref(),
            data.linkedin_url.as_deref(),
        )
        .await;

        if let Some(duplicate) = &possible_duplicate {
            info!(
                candidate_id = %candidate.id,
                duplicate_of = %duplicate.candidate.id,
                matched_on = %duplicate.matched_on,
                "Created candidate matching an existing record"
            );
        }

        Ok(CandidateCreated {
            candidate,
            possible_duplicate,
        })
    }
}
