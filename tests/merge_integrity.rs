// tests/merge_integrity.rs - search, cluster and merge against the in-memory store

use dedupe_lib::clustering::{find_all_contact_duplicates, ClusterRequest};
use dedupe_lib::matching::candidates::ContactSearch;
use dedupe_lib::matching::find_contact_duplicates;
use dedupe_lib::merge::merge_contacts;
use dedupe_lib::models::{
    Activity, ActivityId, Contact, ContactData, ContactId, ContactMergeRequest, Conversation,
    ConversationId, Deal, DealId, MatchReason, RelatedType,
};
use dedupe_lib::utils::dedupe_config::DedupeConfig;
use dedupe_lib::{DedupeError, MemoryStore, RecordStore};

async fn crm() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_contact(
            Contact::new("c-100", "Rivera")
                .with_first_name("Sofia")
                .with_email("sofia.rivera@northwind.io")
                .with_phone("+1 (415) 555-0100"),
        )
        .await;
    store
        .insert_contact(
            Contact::new("c-200", "Rivera")
                .with_first_name("SOFIA")
                .with_email("SOFIA.RIVERA@northwind.io"),
        )
        .await;
    store
        .insert_contact(Contact::new("c-300", "Chen").with_phone("415.555.0100"))
        .await;
    store
        .insert_contact(Contact::new("c-400", "Okoro").with_email("ada@contoso.com"))
        .await;

    store
        .insert_activity(Activity {
            id: ActivityId::from("act-1"),
            related_type: RelatedType::Contact,
            related_id: "c-200".to_string(),
            subject: "Intro call".to_string(),
        })
        .await;
    store
        .insert_activity(Activity {
            id: ActivityId::from("act-2"),
            related_type: RelatedType::Deal,
            related_id: "c-200".to_string(),
            subject: "Same id, different kind".to_string(),
        })
        .await;
    store
        .insert_conversation(Conversation {
            id: ConversationId::from("conv-1"),
            contact_id: ContactId::from("c-300"),
            subject: "Support ticket".to_string(),
        })
        .await;
    store
        .insert_deal(Deal {
            id: DealId::from("deal-1"),
            title: "Northwind expansion".to_string(),
            company_id: None,
            contact_ids: vec![ContactId::from("c-200"), ContactId::from("c-300")],
        })
        .await;
    store
}

#[tokio::test]
async fn search_then_merge_leaves_no_dangling_references() {
    let store = crm().await;
    let config = DedupeConfig::default();

    let candidates = find_contact_duplicates(&store, &ContactSearch::for_source("c-100"), &config)
        .await
        .unwrap();
    let ids: Vec<&str> = candidates.iter().map(|m| m.entity.id.as_str()).collect();
    // phone alone (0.9) outranks exact email averaged with a name hit (0.85)
    assert_eq!(ids, vec!["c-300", "c-200"]);
    assert_eq!(candidates[0].match_reasons, vec![MatchReason::PhoneNumber]);
    assert_eq!(
        candidates[1].match_reasons,
        vec![MatchReason::ExactEmail, MatchReason::SimilarName]
    );

    let request = ContactMergeRequest {
        primary_id: ContactId::from("c-100"),
        duplicate_ids: candidates.iter().map(|m| m.entity.id.clone()).collect(),
        merged_data: ContactData {
            first_name: Some("Sofia".to_string()),
            last_name: "Rivera".to_string(),
            email: Some("sofia.rivera@northwind.io".to_string()),
            phone: Some("+1 (415) 555-0100".to_string()),
            company_id: None,
        },
    };
    merge_contacts(&store, &request).await.unwrap();

    let remaining: Vec<String> = store
        .contacts()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(remaining, vec!["c-100", "c-400"]);

    let activities = store.activities().await;
    assert_eq!(activities[0].related_id, "c-100");
    // only contact-typed activities follow the merge
    assert_eq!(activities[1].related_type, RelatedType::Deal);
    assert_eq!(activities[1].related_id, "c-200");

    assert_eq!(
        store.conversations().await[0].contact_id,
        ContactId::from("c-100")
    );
    assert_eq!(
        store.deals().await[0].contact_ids,
        vec![ContactId::from("c-100")]
    );
    assert_eq!(store.audit_log().await.len(), 1);
}

#[tokio::test]
async fn cluster_pass_after_merge_finds_nothing_left() {
    let store = crm().await;
    let config = DedupeConfig::default();

    let groups = find_all_contact_duplicates(&store, ClusterRequest::default(), &config, None)
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].primary.id, ContactId::from("c-100"));
    assert_eq!(groups[0].duplicates.len(), 2);

    let request = ContactMergeRequest {
        primary_id: groups[0].primary.id.clone(),
        duplicate_ids: groups[0]
            .duplicates
            .iter()
            .map(|d| d.entity.id.clone())
            .collect(),
        merged_data: ContactData {
            last_name: "Rivera".to_string(),
            ..ContactData::default()
        },
    };
    merge_contacts(&store, &request).await.unwrap();

    let again = find_all_contact_duplicates(&store, ClusterRequest::default(), &config, None)
        .await
        .unwrap();
    assert!(again.is_empty());

    // replaying the same merge fails cleanly: the duplicates are gone
    let err = merge_contacts(&store, &request).await.unwrap_err();
    assert!(matches!(err, DedupeError::NotFound { .. }));
    assert_eq!(store.audit_log().await.len(), 1);
}
