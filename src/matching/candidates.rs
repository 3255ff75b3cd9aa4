// src/matching/candidates.rs - single-target candidate search

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::errors::{DedupeError, DedupeResult, ScaleWarning};
use crate::matching::signals::{evaluate, MatchProfile, Matchable};
use crate::models::{sort_by_confidence_desc, Company, Contact, DuplicateMatch, EntityKind};
use crate::store::{RecordStore, StoredEntity};
use crate::utils::dedupe_config::DedupeConfig;
use crate::utils::progress_bars::logging::{DedupeLogger, DedupeOperation};

/// Explicit contact field values for a search. Set fields override the fetched source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactProbe {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Explicit company field values for a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProbe {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn take_explicit(explicit: &Option<String>, fetched: Option<String>) -> Option<String> {
    if has_value(explicit) {
        explicit.clone()
    } else {
        fetched
    }
}

/// An entity kind that can be searched from a mix of a stored record and raw values.
pub trait ProbeSource: StoredEntity {
    type Probe: Default;

    fn probe_is_empty(probe: &Self::Probe) -> bool;

    /// Builds the comparison source. `fetched` is the stored entity, if one was named.
    fn from_probe(probe: &Self::Probe, fetched: Option<Self>) -> Self;
}

impl ProbeSource for Contact {
    type Probe = ContactProbe;

    fn probe_is_empty(probe: &ContactProbe) -> bool {
        !(has_value(&probe.first_name)
            || has_value(&probe.last_name)
            || has_value(&probe.email)
            || has_value(&probe.phone))
    }

    fn from_probe(probe: &ContactProbe, fetched: Option<Self>) -> Self {
        let mut source = fetched.unwrap_or_else(|| Contact::new("", ""));
        source.first_name = take_explicit(&probe.first_name, source.first_name.take());
        if let Some(last_name) = probe.last_name.as_ref().filter(|v| !v.trim().is_empty()) {
            source.last_name = last_name.clone();
        }
        source.email = take_explicit(&probe.email, source.email.take());
        source.phone = take_explicit(&probe.phone, source.phone.take());
        source
    }
}

impl ProbeSource for Company {
    type Probe = CompanyProbe;

    fn probe_is_empty(probe: &CompanyProbe) -> bool {
        !(has_value(&probe.name)
            || has_value(&probe.domain)
            || has_value(&probe.website)
            || has_value(&probe.phone))
    }

    fn from_probe(probe: &CompanyProbe, fetched: Option<Self>) -> Self {
        let mut source = fetched.unwrap_or_else(|| Company::new("", ""));
        if let Some(name) = probe.name.as_ref().filter(|v| !v.trim().is_empty()) {
            source.name = name.clone();
        }
        source.domain = take_explicit(&probe.domain, source.domain.take());
        source.website = take_explicit(&probe.website, source.website.take());
        source.phone = take_explicit(&probe.phone, source.phone.take());
        source
    }
}

/// A candidate search. Unset `limit` / `min_confidence` fall back to the configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindDuplicatesRequest<I, P> {
    #[serde(default)]
    pub source_id: Option<I>,
    #[serde(default)]
    pub fields: P,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

impl<I, P: Default> Default for FindDuplicatesRequest<I, P> {
    fn default() -> Self {
        Self {
            source_id: None,
            fields: P::default(),
            limit: None,
            min_confidence: None,
        }
    }
}

impl<I, P: Default> FindDuplicatesRequest<I, P> {
    pub fn for_source(source_id: impl Into<I>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            ..Self::default()
        }
    }

    pub fn for_fields(fields: P) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }
}

pub type ContactSearch = FindDuplicatesRequest<crate::models::ContactId, ContactProbe>;
pub type CompanySearch = FindDuplicatesRequest<crate::models::CompanyId, CompanyProbe>;

/// Checks the knobs shared by every finder.
pub fn validate_search_bounds(limit: usize, min_confidence: f64) -> DedupeResult<()> {
    if limit == 0 {
        return Err(DedupeError::validation("limit", "must be at least 1"));
    }
    if !(0.0..=1.0).contains(&min_confidence) {
        return Err(DedupeError::validation(
            "minConfidence",
            format!("{} is outside [0, 1]", min_confidence),
        ));
    }
    Ok(())
}

/// Returns a warning when a full scan covers more records than `threshold`.
pub fn check_scan_size(
    kind: EntityKind,
    scanned: usize,
    threshold: usize,
    comparisons: u64,
) -> Option<ScaleWarning> {
    (scanned > threshold).then_some(ScaleWarning {
        kind,
        scanned,
        threshold,
        comparisons,
    })
}

/// Scores `source` against every entity in `collection` on the single-target profile.
///
/// The entity whose id equals `exclude` is skipped. Results clear `min_confidence`
/// with at least one reason, are sorted by confidence (stable on collection order)
/// and truncated to `limit`.
pub fn rank_candidates<T: Matchable>(
    source: &T,
    exclude: Option<&T::Id>,
    collection: &[T],
    limit: usize,
    min_confidence: f64,
) -> Vec<DuplicateMatch<T>> {
    let mut matches: Vec<DuplicateMatch<T>> = collection
        .iter()
        .filter(|candidate| Some(candidate.id()) != exclude)
        .filter_map(|candidate| {
            let result = evaluate(source, candidate, MatchProfile::SingleTarget);
            result
                .clears(min_confidence)
                .then(|| DuplicateMatch::new(candidate.clone(), result))
        })
        .collect();
    sort_by_confidence_desc(&mut matches);
    matches.truncate(limit);
    matches
}

/// Generic candidate search over a store.
pub async fn find_duplicates<T, S>(
    store: &S,
    request: &FindDuplicatesRequest<T::Id, T::Probe>,
    config: &DedupeConfig,
) -> DedupeResult<Vec<DuplicateMatch<T>>>
where
    T: ProbeSource,
    S: RecordStore,
{
    let logger = DedupeLogger::new(DedupeOperation::CandidateSearch, T::KIND);
    let limit = request.limit.unwrap_or(config.candidate_limit);
    let min_confidence = request.min_confidence.unwrap_or(config.candidate_min_confidence);
    validate_search_bounds(limit, min_confidence)?;

    let fetched = match &request.source_id {
        Some(id) => Some(
            T::load(store, id)
                .await?
                .ok_or_else(|| DedupeError::not_found(T::KIND, id))?,
        ),
        None if T::probe_is_empty(&request.fields) => {
            return Err(DedupeError::validation(
                "sourceId",
                "a source id or at least one field value is required",
            ));
        }
        None => None,
    };
    logger.log_start(&format!(
        "source={}, limit={}, min_confidence={:.2}",
        request
            .source_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<fields>".to_string()),
        limit,
        min_confidence
    ));

    let source = T::from_probe(&request.fields, fetched);
    let collection = T::load_all(store).await?;
    logger.log_data_loaded(collection.len());
    if let Some(warning) = check_scan_size(
        T::KIND,
        collection.len(),
        config.scan_warn_threshold,
        collection.len() as u64,
    ) {
        logger.log_scale_warning(&warning);
    }

    let matches = rank_candidates(
        &source,
        request.source_id.as_ref(),
        &collection,
        limit,
        min_confidence,
    );
    logger.log_matches(
        matches.len(),
        collection.len(),
        matches.first().map(|m| m.confidence),
    );
    Ok(matches)
}

pub async fn find_contact_duplicates<S: RecordStore>(
    store: &S,
    request: &ContactSearch,
    config: &DedupeConfig,
) -> DedupeResult<Vec<DuplicateMatch<Contact>>> {
    find_duplicates(store, request, config).await
}

/// Company search; each result carries the live count of contacts pointing at it.
pub async fn find_company_duplicates<S: RecordStore>(
    store: &S,
    request: &CompanySearch,
    config: &DedupeConfig,
) -> DedupeResult<Vec<DuplicateMatch<Company>>> {
    let mut matches: Vec<DuplicateMatch<Company>> = find_duplicates(store, request, config).await?;
    let counts = try_join_all(
        matches
            .iter()
            .map(|m| store.count_contacts_for_company(&m.entity.id)),
    )
    .await?;
    for (m, count) in matches.iter_mut().zip(counts) {
        m.contact_count = Some(count);
    }
    Ok(matches)
}
