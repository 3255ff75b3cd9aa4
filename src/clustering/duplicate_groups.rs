// src/clustering/duplicate_groups.rs - greedy all-pairs duplicate grouping

use indicatif::{MultiProgress, ProgressBar};
use log::debug;
use std::collections::HashSet;

use crate::errors::DedupeResult;
use crate::matching::candidates::{check_scan_size, validate_search_bounds};
use crate::matching::signals::{evaluate, MatchProfile, Matchable};
use crate::models::{sort_by_confidence_desc, Company, Contact, DuplicateGroup, DuplicateMatch};
use crate::store::{RecordStore, StoredEntity};
use crate::utils::dedupe_config::DedupeConfig;
use crate::utils::progress_bars::logging::{DedupeLogger, DedupeOperation};
use crate::utils::progress_bars::progress_config::cluster_progress_bar;

/// Optional overrides for a cluster pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterRequest {
    pub limit: Option<usize>,
    pub min_confidence: Option<f64>,
}

/// Partitions `collection` into duplicate groups with one forward greedy pass.
///
/// Each unprocessed entity in collection order becomes a primary and claims every
/// later unprocessed entity whose all-pairs match clears `min_confidence`. Claimed
/// entities never start or join another group, so the result depends on collection
/// order and is not transitive: if A~B and B~C but not A~C, C may stay ungrouped.
/// Earlier entities need no re-check since they already failed against this primary.
///
/// The pass stops once `limit` groups exist; later groups never change earlier ones.
pub fn group_duplicates<T: Matchable>(
    collection: &[T],
    limit: usize,
    min_confidence: f64,
    progress: Option<&ProgressBar>,
) -> Vec<DuplicateGroup<T>> {
    let mut processed: HashSet<&T::Id> = HashSet::new();
    let mut groups = Vec::new();

    for (i, primary) in collection.iter().enumerate() {
        if let Some(pb) = progress {
            pb.inc(1);
        }
        if groups.len() >= limit {
            break;
        }
        if processed.contains(primary.id()) {
            continue;
        }

        let mut duplicates: Vec<DuplicateMatch<T>> = Vec::new();
        for candidate in &collection[i + 1..] {
            if processed.contains(candidate.id()) {
                continue;
            }
            let result = evaluate(primary, candidate, MatchProfile::AllPairs);
            if result.clears(min_confidence) {
                processed.insert(candidate.id());
                duplicates.push(DuplicateMatch::new(candidate.clone(), result));
            }
        }

        if !duplicates.is_empty() {
            processed.insert(primary.id());
            sort_by_confidence_desc(&mut duplicates);
            debug!(
                "Group #{} primary {} with {} duplicate(s)",
                groups.len() + 1,
                primary.id(),
                duplicates.len()
            );
            groups.push(DuplicateGroup {
                primary: primary.clone(),
                duplicates,
            });
        }
    }
    groups
}

/// Loads the kind's collection and runs one cluster pass over it.
pub async fn find_all_duplicates<T, S>(
    store: &S,
    request: ClusterRequest,
    config: &DedupeConfig,
    multi_progress: Option<MultiProgress>,
) -> DedupeResult<Vec<DuplicateGroup<T>>>
where
    T: StoredEntity,
    S: RecordStore,
{
    let logger = DedupeLogger::new(DedupeOperation::Cluster, T::KIND);
    let limit = request.limit.unwrap_or(config.cluster_limit);
    let min_confidence = request.min_confidence.unwrap_or(config.cluster_min_confidence);
    validate_search_bounds(limit, min_confidence)?;
    logger.log_start(&format!("limit={}, min_confidence={:.2}", limit, min_confidence));

    let collection = T::load_all(store).await?;
    logger.log_data_loaded(collection.len());
    let n = collection.len() as u64;
    if let Some(warning) = check_scan_size(
        T::KIND,
        collection.len(),
        config.scan_warn_threshold,
        n * n.saturating_sub(1) / 2,
    ) {
        logger.log_scale_warning(&warning);
    }

    logger.log_phase("Grouping", Some(format!("{} records", collection.len()).as_str()));
    let pb = multi_progress
        .as_ref()
        .map(|mp| cluster_progress_bar(mp, collection.len(), T::KIND.as_str()));
    let groups = group_duplicates(&collection, limit, min_confidence, pb.as_ref());
    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{} groups", groups.len()));
    }

    let grouped: usize = groups.iter().map(|g| g.duplicates.len() + 1).sum();
    logger.log_groups(groups.len(), grouped);
    Ok(groups)
}

pub async fn find_all_contact_duplicates<S: RecordStore>(
    store: &S,
    request: ClusterRequest,
    config: &DedupeConfig,
    multi_progress: Option<MultiProgress>,
) -> DedupeResult<Vec<DuplicateGroup<Contact>>> {
    find_all_duplicates(store, request, config, multi_progress).await
}

pub async fn find_all_company_duplicates<S: RecordStore>(
    store: &S,
    request: ClusterRequest,
    config: &DedupeConfig,
    multi_progress: Option<MultiProgress>,
) -> DedupeResult<Vec<DuplicateGroup<Company>>> {
    find_all_duplicates(store, request, config, multi_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DedupeError;
    use crate::models::MatchReason;
    use crate::store::MemoryStore;

    fn ids<T: Matchable>(group: &DuplicateGroup<T>) -> Vec<String> {
        std::iter::once(group.primary.id().to_string())
            .chain(group.duplicates.iter().map(|d| d.entity.id().to_string()))
            .collect()
    }

    #[test]
    fn test_groups_are_disjoint() {
        let contacts = vec![
            Contact::new("a", "Lee").with_email("ann@x.io"),
            Contact::new("b", "Lee").with_email("ANN@x.io"),
            Contact::new("c", "Park").with_phone("555-010-2222"),
            Contact::new("d", "Kim").with_email("ann@x.io").with_phone("5550102222"),
            Contact::new("e", "Moreau").with_phone("(555) 010 2222"),
        ];
        let groups = group_duplicates(&contacts, 50, 0.7, None);
        let mut seen = HashSet::new();
        for group in &groups {
            for id in ids(group) {
                assert!(seen.insert(id.clone()), "{} appears twice", id);
            }
        }
        // d has only the exact email (1.0), b adds a weaker last-name hit (0.75)
        assert_eq!(ids(&groups[0]), vec!["a", "d", "b"]);
        assert_eq!(ids(&groups[1]), vec!["c", "e"]);
    }

    #[test]
    fn test_chain_is_not_transitive() {
        // a~b by email, b~c by phone, a and c share nothing
        let contacts = vec![
            Contact::new("a", "Alpha").with_email("x@corp.io"),
            Contact::new("b", "Beta").with_email("x@corp.io").with_phone("555 777 8888"),
            Contact::new("c", "Gamma").with_phone("5557778888"),
        ];
        let groups = group_duplicates(&contacts, 50, 0.7, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["a", "b"]);
    }

    #[test]
    fn test_result_depends_on_order() {
        let a = Contact::new("a", "Alpha").with_email("x@corp.io");
        let b = Contact::new("b", "Beta").with_email("x@corp.io").with_phone("555 777 8888");
        let c = Contact::new("c", "Gamma").with_phone("5557778888");

        let groups = group_duplicates(&[b.clone(), a.clone(), c.clone()], 50, 0.7, None);
        assert_eq!(ids(&groups[0]), vec!["b", "a", "c"]);

        let groups = group_duplicates(&[c, a, b], 50, 0.7, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["c", "b"]);
    }

    #[test]
    fn test_duplicates_sorted_by_confidence() {
        let contacts = vec![
            Contact::new("p", "Stone").with_first_name("Ava").with_email("ava@stone.io"),
            Contact::new("q", "Stone").with_first_name("Ava"),
            Contact::new("r", "Rivera").with_email("AVA@stone.io"),
        ];
        let groups = group_duplicates(&contacts, 50, 0.7, None);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.duplicates[0].entity.id.as_str(), "r");
        assert_eq!(group.duplicates[0].match_reasons, vec![MatchReason::ExactEmail]);
        assert_eq!(group.duplicates[1].entity.id.as_str(), "q");
        assert!(group.duplicates[0].confidence >= group.duplicates[1].confidence);
    }

    #[test]
    fn test_limit_caps_group_count() {
        let companies: Vec<Company> = (0..6)
            .map(|i| Company::new(format!("co{}", i), format!("Firm {}", i / 2)))
            .collect();
        assert_eq!(group_duplicates(&companies, 50, 0.7, None).len(), 3);
        let capped = group_duplicates(&companies, 2, 0.7, None);
        assert_eq!(capped.len(), 2);
        assert_eq!(ids(&capped[1]), vec!["co2", "co3"]);
    }

    #[tokio::test]
    async fn test_find_all_uses_store_and_config() {
        let store = MemoryStore::new();
        store.insert_company(Company::new("1", "Acme Inc").with_domain("acme.com")).await;
        store.insert_company(Company::new("2", "Initech")).await;
        store.insert_company(Company::new("3", "The Acme Co")).await;

        let groups: Vec<DuplicateGroup<Company>> = find_all_company_duplicates(
            &store,
            ClusterRequest::default(),
            &DedupeConfig::default(),
            Some(MultiProgress::new()),
        )
        .await
        .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["1", "3"]);

        let err = find_all_contact_duplicates(
            &store,
            ClusterRequest {
                limit: None,
                min_confidence: Some(-0.1),
            },
            &DedupeConfig::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DedupeError::Validation { field: "minConfidence", .. }));
    }
}
