// src/models/matching.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entities::{CompanyData, CompanyId, ContactData, ContactId};

/// Name of a signal that fired for a pair. Serialized as the human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchReason {
    #[serde(rename = "Exact email match")]
    ExactEmail,
    #[serde(rename = "Phone number match")]
    PhoneNumber,
    #[serde(rename = "Similar name")]
    SimilarName,
    #[serde(rename = "Same last name")]
    SameLastName,
    #[serde(rename = "Same email domain")]
    SameEmailDomain,
    #[serde(rename = "Exact domain match")]
    ExactDomain,
    #[serde(rename = "Same company name")]
    SameCompanyName,
    #[serde(rename = "Similar company name")]
    SimilarCompanyName,
    #[serde(rename = "Same website")]
    SameWebsite,
    #[serde(rename = "Same phone number")]
    SamePhone,
}

impl MatchReason {
    pub fn label(&self) -> &'static str {
        match self {
            MatchReason::ExactEmail => "Exact email match",
            MatchReason::PhoneNumber => "Phone number match",
            MatchReason::SimilarName => "Similar name",
            MatchReason::SameLastName => "Same last name",
            MatchReason::SameEmailDomain => "Same email domain",
            MatchReason::ExactDomain => "Exact domain match",
            MatchReason::SameCompanyName => "Same company name",
            MatchReason::SimilarCompanyName => "Similar company name",
            MatchReason::SameWebsite => "Same website",
            MatchReason::SamePhone => "Same phone number",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of comparing one pair of entities.
///
/// `confidence` is the arithmetic mean of the weights of the signals that fired,
/// so a weak signal next to a strong one pulls the score down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub reasons: Vec<MatchReason>,
    pub confidence: f64,
}

impl MatchResult {
    pub fn from_hits(hits: Vec<(MatchReason, f64)>) -> Self {
        if hits.is_empty() {
            return Self::default();
        }
        let total: f64 = hits.iter().map(|(_, weight)| weight).sum();
        let confidence = total / hits.len() as f64;
        Self {
            reasons: hits.into_iter().map(|(reason, _)| reason).collect(),
            confidence,
        }
    }

    /// True when at least one signal fired and the average clears `min_confidence`.
    pub fn clears(&self, min_confidence: f64) -> bool {
        !self.reasons.is_empty() && self.confidence >= min_confidence
    }
}

/// One candidate proposed as a duplicate of some source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch<T> {
    pub entity: T,
    pub match_reasons: Vec<MatchReason>,
    pub confidence: f64,
    /// Live count of contacts referencing a company candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_count: Option<usize>,
}

impl<T> DuplicateMatch<T> {
    pub fn new(entity: T, result: MatchResult) -> Self {
        Self {
            entity,
            match_reasons: result.reasons,
            confidence: result.confidence,
            contact_count: None,
        }
    }
}

/// A primary entity and the entities clustered under it in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup<T> {
    pub primary: T,
    pub duplicates: Vec<DuplicateMatch<T>>,
}

/// Caller-curated merge: which record survives and what its fields become.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest<I, D> {
    pub primary_id: I,
    pub duplicate_ids: Vec<I>,
    pub merged_data: D,
}

pub type ContactMergeRequest = MergeRequest<ContactId, ContactData>;
pub type CompanyMergeRequest = MergeRequest<CompanyId, CompanyData>;

/// Sorts by confidence, highest first. Ties keep their input order.
pub fn sort_by_confidence_desc<T>(matches: &mut [DuplicateMatch<T>]) {
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
