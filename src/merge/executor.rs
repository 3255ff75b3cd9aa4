// src/merge/executor.rs - transactional, relationship-preserving merge

use crate::matching::signals::Matchable;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::errors::{DedupeError, DedupeResult, StoreError};
use crate::models::{
    AuditLogEntry, Company, CompanyData, CompanyId, CompanyMergeRequest, Contact, ContactData,
    ContactId, ContactMergeRequest, MergeRequest, RelatedType,
};
use crate::store::{RecordStore, StoreResult, StoreTransaction, StoredEntity};
use crate::utils::progress_bars::logging::{DedupeLogger, DedupeOperation};

pub const MERGE_ACTION: &str = "merge";

/// Per-kind hooks the generic merge drives inside one transaction.
#[allow(async_fn_in_trait)]
pub trait MergeTarget: StoredEntity {
    type Data: Serialize;

    /// Rejects merged field sets missing a required value.
    fn validate_data(data: &Self::Data) -> DedupeResult<()>;

    /// Reads and locks the record for the rest of the transaction.
    async fn lock<Tx: StoreTransaction>(tx: &mut Tx, id: &Self::Id) -> StoreResult<Option<Self>>;

    /// Verifies foreign keys carried by the merged data.
    async fn check_references<Tx: StoreTransaction>(
        _tx: &mut Tx,
        _data: &Self::Data,
    ) -> DedupeResult<()> {
        Ok(())
    }

    fn apply(&mut self, data: &Self::Data, now: NaiveDateTime);

    async fn save<Tx: StoreTransaction>(&self, tx: &mut Tx) -> StoreResult<()>;

    /// Points every dependent of `duplicate` at `primary`. Returns how many records changed.
    async fn transfer_dependents<Tx: StoreTransaction>(
        tx: &mut Tx,
        duplicate: &Self::Id,
        primary: &Self::Id,
    ) -> StoreResult<u64>;

    async fn remove<Tx: StoreTransaction>(tx: &mut Tx, id: &Self::Id) -> StoreResult<()>;
}

fn require_non_empty(field: &'static str, value: &str) -> DedupeResult<()> {
    if value.trim().is_empty() {
        Err(DedupeError::validation(field, "is required"))
    } else {
        Ok(())
    }
}

impl MergeTarget for Contact {
    type Data = ContactData;

    fn validate_data(data: &ContactData) -> DedupeResult<()> {
        require_non_empty("lastName", &data.last_name)
    }

    async fn lock<Tx: StoreTransaction>(tx: &mut Tx, id: &ContactId) -> StoreResult<Option<Self>> {
        tx.contact(id).await
    }

    async fn check_references<Tx: StoreTransaction>(
        tx: &mut Tx,
        data: &ContactData,
    ) -> DedupeResult<()> {
        if let Some(company_id) = &data.company_id {
            if tx.company(company_id).await?.is_none() {
                return Err(DedupeError::validation(
                    "companyId",
                    format!("company {} does not exist", company_id),
                ));
            }
        }
        Ok(())
    }

    fn apply(&mut self, data: &ContactData, now: NaiveDateTime) {
        Contact::apply(self, data, now)
    }

    async fn save<Tx: StoreTransaction>(&self, tx: &mut Tx) -> StoreResult<()> {
        tx.update_contact(self).await
    }

    async fn transfer_dependents<Tx: StoreTransaction>(
        tx: &mut Tx,
        duplicate: &ContactId,
        primary: &ContactId,
    ) -> StoreResult<u64> {
        let activities = tx
            .relink_activities(RelatedType::from(Self::KIND), duplicate.as_str(), primary.as_str())
            .await?;
        let conversations = tx.relink_conversations(duplicate, primary).await?;
        let deals = tx.replace_deal_contact(duplicate, primary).await?;
        Ok(activities + conversations + deals)
    }

    async fn remove<Tx: StoreTransaction>(tx: &mut Tx, id: &ContactId) -> StoreResult<()> {
        tx.delete_contact(id).await
    }
}

impl MergeTarget for Company {
    type Data = CompanyData;

    fn validate_data(data: &CompanyData) -> DedupeResult<()> {
        require_non_empty("name", &data.name)
    }

    async fn lock<Tx: StoreTransaction>(tx: &mut Tx, id: &CompanyId) -> StoreResult<Option<Self>> {
        tx.company(id).await
    }

    fn apply(&mut self, data: &CompanyData, now: NaiveDateTime) {
        Company::apply(self, data, now)
    }

    async fn save<Tx: StoreTransaction>(&self, tx: &mut Tx) -> StoreResult<()> {
        tx.update_company(self).await
    }

    async fn transfer_dependents<Tx: StoreTransaction>(
        tx: &mut Tx,
        duplicate: &CompanyId,
        primary: &CompanyId,
    ) -> StoreResult<u64> {
        let contacts = tx.reassign_company_contacts(duplicate, primary).await?;
        let deals = tx.reassign_company_deals(duplicate, primary).await?;
        let activities = tx
            .relink_activities(RelatedType::from(Self::KIND), duplicate.as_str(), primary.as_str())
            .await?;
        Ok(contacts + deals + activities)
    }

    async fn remove<Tx: StoreTransaction>(tx: &mut Tx, id: &CompanyId) -> StoreResult<()> {
        tx.delete_company(id).await
    }
}

/// Checks the id lists before anything touches the store.
pub fn validate_merge_ids<I>(primary_id: &I, duplicate_ids: &[I]) -> DedupeResult<()>
where
    I: Eq + std::hash::Hash + std::fmt::Display,
{
    if duplicate_ids.is_empty() {
        return Err(DedupeError::validation(
            "duplicateIds",
            "at least one duplicate is required",
        ));
    }
    let mut seen = HashSet::new();
    for id in duplicate_ids {
        if id == primary_id {
            return Err(DedupeError::validation(
                "duplicateIds",
                format!("{} is also the primary", id),
            ));
        }
        if !seen.insert(id) {
            return Err(DedupeError::validation(
                "duplicateIds",
                format!("{} is listed more than once", id),
            ));
        }
    }
    Ok(())
}

/// Merges `duplicate_ids` into `primary_id` atomically and returns the primary's id.
///
/// The primary takes `merged_data` verbatim. Every dependent that referenced a
/// duplicate is re-pointed at the primary, the duplicates are deleted and one audit
/// entry is written. Any failure rolls the whole transaction back.
pub async fn merge<E, S>(store: &S, request: &MergeRequest<E::Id, E::Data>) -> DedupeResult<E::Id>
where
    E: MergeTarget,
    S: RecordStore,
{
    let logger = DedupeLogger::new(DedupeOperation::Merge, E::KIND);
    E::validate_data(&request.merged_data)?;
    validate_merge_ids(&request.primary_id, &request.duplicate_ids)?;
    logger.log_start(&format!(
        "primary={}, duplicates={}",
        request.primary_id,
        request.duplicate_ids.len()
    ));

    let mut tx = store.begin().await?;
    let outcome = apply_merge::<E, S::Tx>(&mut tx, request, &logger).await;
    match outcome {
        Ok(reassigned) => {
            tx.commit().await?;
            logger.log_merge_committed(
                &request.primary_id.to_string(),
                request.duplicate_ids.len(),
                reassigned,
            );
            Ok(request.primary_id.clone())
        }
        Err(e) => {
            logger.log_rolled_back(&e.to_string());
            if let Err(rollback_err) = tx.rollback().await {
                logger.log_debug(&format!("Rollback failed: {}", rollback_err));
            }
            Err(e)
        }
    }
}

async fn apply_merge<E, Tx>(
    tx: &mut Tx,
    request: &MergeRequest<E::Id, E::Data>,
    logger: &DedupeLogger,
) -> DedupeResult<u64>
where
    E: MergeTarget,
    Tx: StoreTransaction,
{
    // Lock in a fixed order so overlapping merges cannot deadlock.
    let mut lock_order: Vec<&E::Id> = std::iter::once(&request.primary_id)
        .chain(request.duplicate_ids.iter())
        .collect();
    lock_order.sort_by_key(|id| id.to_string());
    let mut locked: HashMap<&E::Id, E> = HashMap::new();
    for id in lock_order {
        if let Some(entity) = E::lock(tx, id).await? {
            locked.insert(id, entity);
        }
    }

    let mut primary = locked
        .remove(&request.primary_id)
        .ok_or_else(|| DedupeError::not_found(E::KIND, &request.primary_id))?;
    if let Some(missing) = request
        .duplicate_ids
        .iter()
        .find(|id| !locked.contains_key(id))
    {
        return Err(DedupeError::not_found(E::KIND, missing));
    }
    E::check_references(tx, &request.merged_data).await?;
    logger.log_phase("Locked", Some(format!("{} records", request.duplicate_ids.len() + 1).as_str()));

    let now = Utc::now().naive_utc();
    primary.apply(&request.merged_data, now);
    primary.save(tx).await?;

    let mut reassigned = 0;
    for duplicate_id in &request.duplicate_ids {
        let moved = E::transfer_dependents(tx, duplicate_id, &request.primary_id).await?;
        logger.log_debug(&format!("{} -> {}: {} references", duplicate_id, request.primary_id, moved));
        reassigned += moved;
        E::remove(tx, duplicate_id).await?;
    }

    let merged_ids: Vec<String> = request.duplicate_ids.iter().map(|id| id.to_string()).collect();
    let merged_data = serde_json::to_value(&request.merged_data).map_err(StoreError::from)?;
    let entry = AuditLogEntry {
        id: Uuid::new_v4(),
        action: MERGE_ACTION.to_string(),
        entity_type: E::KIND,
        entity_id: request.primary_id.to_string(),
        metadata: json!({
            "mergedIds": merged_ids,
            "mergedData": merged_data,
        }),
        timestamp: now,
        system: true,
    };
    tx.insert_audit_entry(&entry).await?;
    Ok(reassigned)
}

pub async fn merge_contacts<S: RecordStore>(
    store: &S,
    request: &ContactMergeRequest,
) -> DedupeResult<ContactId> {
    merge::<Contact, S>(store, request).await
}

pub async fn merge_companies<S: RecordStore>(
    store: &S,
    request: &CompanyMergeRequest,
) -> DedupeResult<CompanyId> {
    merge::<Company, S>(store, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Activity, ActivityId, Conversation, ConversationId, Deal, DealId, EntityKind,
    };
    use crate::store::MemoryStore;

    fn contact_request(primary: &str, duplicates: &[&str], last_name: &str) -> ContactMergeRequest {
        MergeRequest {
            primary_id: ContactId::from(primary),
            duplicate_ids: duplicates.iter().map(|id| ContactId::from(*id)).collect(),
            merged_data: ContactData {
                first_name: Some("Pat".to_string()),
                last_name: last_name.to_string(),
                email: Some("pat@acme.io".to_string()),
                ..ContactData::default()
            },
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_contact(Contact::new("P", "Doe")).await;
        store.insert_contact(Contact::new("D", "Doe")).await;
        store.insert_contact(Contact::new("E", "Doe")).await;
        store
            .insert_activity(Activity {
                id: ActivityId::from("a1"),
                related_type: RelatedType::Contact,
                related_id: "D".to_string(),
                subject: "Call".to_string(),
            })
            .await;
        store
            .insert_conversation(Conversation {
                id: ConversationId::from("v1"),
                contact_id: ContactId::from("D"),
                subject: "Re: pricing".to_string(),
            })
            .await;
        store
            .insert_deal(Deal {
                id: DealId::from("deal1"),
                title: "Renewal".to_string(),
                company_id: None,
                contact_ids: vec![ContactId::from("D")],
            })
            .await;
        store
            .insert_deal(Deal {
                id: DealId::from("deal2"),
                title: "Upsell".to_string(),
                company_id: None,
                contact_ids: vec![ContactId::from("P"), ContactId::from("D"), ContactId::from("E")],
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_deal_contacts_rewritten_to_primary() {
        let store = seeded().await;
        let id = merge_contacts(&store, &contact_request("P", &["D"], "Doe"))
            .await
            .unwrap();
        assert_eq!(id, ContactId::from("P"));

        let deals = store.deals().await;
        assert_eq!(deals[0].contact_ids, vec![ContactId::from("P")]);
        assert_eq!(
            deals[1].contact_ids,
            vec![ContactId::from("P"), ContactId::from("E")]
        );
        assert!(store.contact(&ContactId::from("D")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_reference_to_duplicates_survives() {
        let store = seeded().await;
        merge_contacts(&store, &contact_request("P", &["D", "E"], "Doe-Smith"))
            .await
            .unwrap();

        let gone = ["D", "E"];
        assert!(store
            .activities()
            .await
            .iter()
            .all(|a| !gone.contains(&a.related_id.as_str())));
        assert!(store
            .conversations()
            .await
            .iter()
            .all(|c| c.contact_id == ContactId::from("P")));
        for deal in store.deals().await {
            assert!(deal.contact_ids.iter().all(|id| !gone.contains(&id.as_str())));
            let primaries = deal.contact_ids.iter().filter(|id| id.as_str() == "P").count();
            assert_eq!(primaries, 1);
        }

        let primary = store.contact(&ContactId::from("P")).await.unwrap().unwrap();
        assert_eq!(primary.last_name, "Doe-Smith");
        assert_eq!(primary.email.as_deref(), Some("pat@acme.io"));
        assert!(primary.updated_at >= primary.created_at);

        let audit = store.audit_log().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "merge");
        assert_eq!(audit[0].entity_type, EntityKind::Contact);
        assert_eq!(audit[0].entity_id, "P");
        assert!(audit[0].system);
        assert_eq!(audit[0].metadata["mergedIds"], json!(["D", "E"]));
        assert_eq!(audit[0].metadata["mergedData"]["lastName"], json!("Doe-Smith"));
    }

    #[tokio::test]
    async fn test_missing_duplicate_changes_nothing() {
        let store = seeded().await;
        let err = merge_contacts(&store, &contact_request("P", &["D", "ghost"], "Doe"))
            .await
            .unwrap_err();
        assert!(matches!(err, DedupeError::NotFound { ref id, .. } if id == "ghost"));

        let primary = store.contact(&ContactId::from("P")).await.unwrap().unwrap();
        assert_eq!(primary.first_name, None);
        assert!(store.contact(&ContactId::from("D")).await.unwrap().is_some());
        assert_eq!(store.activities().await[0].related_id, "D");
        assert!(store.audit_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_primary_reported_first() {
        let store = seeded().await;
        let err = merge_contacts(&store, &contact_request("nobody", &["ghost"], "Doe"))
            .await
            .unwrap_err();
        assert!(matches!(err, DedupeError::NotFound { ref id, .. } if id == "nobody"));
    }

    #[tokio::test]
    async fn test_write_fault_rolls_back() {
        let store = seeded().await;
        store.reject_writes_to("deal2").await;
        let err = merge_contacts(&store, &contact_request("P", &["D"], "Doe"))
            .await
            .unwrap_err();
        assert!(matches!(err, DedupeError::Store(StoreError::WriteRejected(_))));

        assert!(store.contact(&ContactId::from("D")).await.unwrap().is_some());
        assert_eq!(store.activities().await[0].related_id, "D");
        assert_eq!(store.conversations().await[0].contact_id, ContactId::from("D"));
        assert_eq!(store.deals().await[0].contact_ids, vec![ContactId::from("D")]);
        assert!(store.audit_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_runs_before_store_access() {
        let store = seeded().await;
        let cases = [
            (contact_request("P", &["D"], "  "), "lastName"),
            (contact_request("P", &[], "Doe"), "duplicateIds"),
            (contact_request("P", &["D", "P"], "Doe"), "duplicateIds"),
            (contact_request("P", &["D", "D"], "Doe"), "duplicateIds"),
        ];
        for (request, expected) in cases {
            let err = merge_contacts(&store, &request).await.unwrap_err();
            assert!(
                matches!(err, DedupeError::Validation { field, .. } if field == expected),
                "{:?}",
                err
            );
        }
        assert_eq!(store.contacts().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_merged_company_reference_must_exist() {
        let store = seeded().await;
        let mut request = contact_request("P", &["D"], "Doe");
        request.merged_data.company_id = Some(CompanyId::from("co-missing"));
        let err = merge_contacts(&store, &request).await.unwrap_err();
        assert!(matches!(err, DedupeError::Validation { field: "companyId", .. }));
        assert!(store.contact(&ContactId::from("D")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_merges_sharing_a_duplicate() {
        let store = seeded().await;
        let first = contact_request("P", &["D"], "Doe");
        let second = contact_request("E", &["D"], "Doe");
        let (a, b) = tokio::join!(
            merge_contacts(&store, &first),
            merge_contacts(&store, &second)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(DedupeError::NotFound { ref id, .. }) if id == "D"));
        assert_eq!(store.audit_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_company_merge_moves_contacts_deals_and_activities() {
        let store = MemoryStore::new();
        store.insert_company(Company::new("co1", "Acme")).await;
        store.insert_company(Company::new("co2", "Acme Inc")).await;
        store.insert_contact(Contact::new("p1", "Doe").with_company("co2")).await;
        store
            .insert_deal(Deal {
                id: DealId::from("deal1"),
                title: "Pilot".to_string(),
                company_id: Some(CompanyId::from("co2")),
                contact_ids: vec![],
            })
            .await;
        store
            .insert_activity(Activity {
                id: ActivityId::from("a1"),
                related_type: RelatedType::Company,
                related_id: "co2".to_string(),
                subject: "Kickoff".to_string(),
            })
            .await;

        let request = CompanyMergeRequest {
            primary_id: CompanyId::from("co1"),
            duplicate_ids: vec![CompanyId::from("co2")],
            merged_data: CompanyData {
                name: "Acme Inc".to_string(),
                domain: Some("acme.com".to_string()),
                ..CompanyData::default()
            },
        };
        merge_companies(&store, &request).await.unwrap();

        let contact = store.contact(&ContactId::from("p1")).await.unwrap().unwrap();
        assert_eq!(contact.company_id, Some(CompanyId::from("co1")));
        assert_eq!(store.deals().await[0].company_id, Some(CompanyId::from("co1")));
        assert_eq!(store.activities().await[0].related_id, "co1");
        assert!(store.company(&CompanyId::from("co2")).await.unwrap().is_none());
        let primary = store.company(&CompanyId::from("co1")).await.unwrap().unwrap();
        assert_eq!(primary.domain.as_deref(), Some("acme.com"));
        assert_eq!(store.audit_log().await[0].entity_type, EntityKind::Company);
    }

    async fn seeded_companies() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_company(Company::new("co1", "Acme")).await;
        store.insert_company(Company::new("co2", "Acme Inc")).await;
        store.insert_contact(Contact::new("p1", "Doe").with_company("co2")).await;
        store
            .insert_deal(Deal {
                id: DealId::from("deal1"),
                title: "Pilot".to_string(),
                company_id: Some(CompanyId::from("co2")),
                contact_ids: vec![],
            })
            .await;
        store
    }

    fn company_request(primary: &str, duplicates: &[&str]) -> CompanyMergeRequest {
        CompanyMergeRequest {
            primary_id: CompanyId::from(primary),
            duplicate_ids: duplicates.iter().map(|id| CompanyId::from(*id)).collect(),
            merged_data: CompanyData {
                name: "Acme Holdings".to_string(),
                ..CompanyData::default()
            },
        }
    }

    #[tokio::test]
    async fn test_company_write_fault_rolls_back() {
        let store = seeded_companies().await;
        store.reject_writes_to("deal1").await;
        let err = merge_companies(&store, &company_request("co1", &["co2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DedupeError::Store(StoreError::WriteRejected(ref id)) if id == "deal1"));

        let primary = store.company(&CompanyId::from("co1")).await.unwrap().unwrap();
        assert_eq!(primary.name, "Acme");
        assert!(store.company(&CompanyId::from("co2")).await.unwrap().is_some());
        let contact = store.contact(&ContactId::from("p1")).await.unwrap().unwrap();
        assert_eq!(contact.company_id, Some(CompanyId::from("co2")));
        assert_eq!(store.deals().await[0].company_id, Some(CompanyId::from("co2")));
        assert!(store.audit_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_company_duplicate_changes_nothing() {
        let store = seeded_companies().await;
        let err = merge_companies(&store, &company_request("co1", &["co2", "co-ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DedupeError::NotFound { kind: EntityKind::Company, ref id } if id == "co-ghost"
        ));
        assert_eq!(store.companies().await.unwrap().len(), 2);
        let contact = store.contact(&ContactId::from("p1")).await.unwrap().unwrap();
        assert_eq!(contact.company_id, Some(CompanyId::from("co2")));
        assert!(store.audit_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_company_name_is_required() {
        let store = MemoryStore::new();
        let request = CompanyMergeRequest {
            primary_id: CompanyId::from("co1"),
            duplicate_ids: vec![CompanyId::from("co2")],
            merged_data: CompanyData::default(),
        };
        let err = merge_companies(&store, &request).await.unwrap_err();
        assert!(matches!(err, DedupeError::Validation { field: "name", .. }));
    }
}
