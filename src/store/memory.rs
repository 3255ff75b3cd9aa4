// src/store/memory.rs - in-process record store

use log::debug;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RecordStore, StoreResult, StoreTransaction};
use crate::errors::StoreError;
use crate::models::{
    Activity, AuditLogEntry, Company, CompanyId, Contact, ContactId, Conversation, Deal,
    RelatedType,
};

#[derive(Debug, Clone, Default)]
struct StoreState {
    contacts: Vec<Contact>,
    companies: Vec<Company>,
    activities: Vec<Activity>,
    conversations: Vec<Conversation>,
    deals: Vec<Deal>,
    audit_log: Vec<AuditLogEntry>,
    /// Record ids whose writes fail, for exercising rollback paths.
    rejected_writes: HashSet<String>,
}

impl StoreState {
    fn check_writable(&self, id: &str) -> StoreResult<()> {
        if self.rejected_writes.contains(id) {
            Err(StoreError::WriteRejected(id.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Vec-backed store guarded by a single async mutex.
///
/// A transaction holds the mutex for its whole lifetime and edits a private copy of
/// the state, so commits are all-or-nothing and concurrent merges serialize.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_contact(&self, contact: Contact) {
        self.state.lock().await.contacts.push(contact);
    }

    pub async fn insert_company(&self, company: Company) {
        self.state.lock().await.companies.push(company);
    }

    pub async fn insert_activity(&self, activity: Activity) {
        self.state.lock().await.activities.push(activity);
    }

    pub async fn insert_conversation(&self, conversation: Conversation) {
        self.state.lock().await.conversations.push(conversation);
    }

    pub async fn insert_deal(&self, deal: Deal) {
        self.state.lock().await.deals.push(deal);
    }

    pub async fn activities(&self) -> Vec<Activity> {
        self.state.lock().await.activities.clone()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn deals(&self) -> Vec<Deal> {
        self.state.lock().await.deals.clone()
    }

    pub async fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.state.lock().await.audit_log.clone()
    }

    /// Makes every later write to the record with this id fail.
    pub async fn reject_writes_to(&self, id: &str) {
        self.state.lock().await.rejected_writes.insert(id.to_string());
    }
}

impl RecordStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn contacts(&self) -> StoreResult<Vec<Contact>> {
        Ok(self.state.lock().await.contacts.clone())
    }

    async fn companies(&self) -> StoreResult<Vec<Company>> {
        Ok(self.state.lock().await.companies.clone())
    }

    async fn contact(&self, id: &ContactId) -> StoreResult<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(state.contacts.iter().find(|c| &c.id == id).cloned())
    }

    async fn company(&self, id: &CompanyId) -> StoreResult<Option<Company>> {
        let state = self.state.lock().await;
        Ok(state.companies.iter().find(|c| &c.id == id).cloned())
    }

    async fn count_contacts_for_company(&self, id: &CompanyId) -> StoreResult<usize> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.company_id.as_ref() == Some(id))
            .count())
    }

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        debug!("MemoryStore: transaction opened");
        Ok(MemoryTransaction { guard, working })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
}

impl StoreTransaction for MemoryTransaction {
    async fn contact(&mut self, id: &ContactId) -> StoreResult<Option<Contact>> {
        Ok(self.working.contacts.iter().find(|c| &c.id == id).cloned())
    }

    async fn company(&mut self, id: &CompanyId) -> StoreResult<Option<Company>> {
        Ok(self.working.companies.iter().find(|c| &c.id == id).cloned())
    }

    async fn update_contact(&mut self, contact: &Contact) -> StoreResult<()> {
        self.working.check_writable(contact.id.as_str())?;
        if let Some(existing) = self.working.contacts.iter_mut().find(|c| c.id == contact.id) {
            *existing = contact.clone();
        }
        Ok(())
    }

    async fn update_company(&mut self, company: &Company) -> StoreResult<()> {
        self.working.check_writable(company.id.as_str())?;
        if let Some(existing) = self.working.companies.iter_mut().find(|c| c.id == company.id) {
            *existing = company.clone();
        }
        Ok(())
    }

    async fn delete_contact(&mut self, id: &ContactId) -> StoreResult<()> {
        self.working.check_writable(id.as_str())?;
        self.working.contacts.retain(|c| &c.id != id);
        Ok(())
    }

    async fn delete_company(&mut self, id: &CompanyId) -> StoreResult<()> {
        self.working.check_writable(id.as_str())?;
        self.working.companies.retain(|c| &c.id != id);
        Ok(())
    }

    async fn relink_activities(
        &mut self,
        related_type: RelatedType,
        from: &str,
        to: &str,
    ) -> StoreResult<u64> {
        let state = &mut self.working;
        let mut changed = 0;
        for activity in state
            .activities
            .iter_mut()
            .filter(|a| a.related_type == related_type && a.related_id == from)
        {
            if state.rejected_writes.contains(activity.id.as_str()) {
                return Err(StoreError::WriteRejected(activity.id.to_string()));
            }
            activity.related_id = to.to_string();
            changed += 1;
        }
        Ok(changed)
    }

    async fn relink_conversations(
        &mut self,
        from: &ContactId,
        to: &ContactId,
    ) -> StoreResult<u64> {
        let state = &mut self.working;
        let mut changed = 0;
        for conversation in state.conversations.iter_mut().filter(|c| &c.contact_id == from) {
            if state.rejected_writes.contains(conversation.id.as_str()) {
                return Err(StoreError::WriteRejected(conversation.id.to_string()));
            }
            conversation.contact_id = to.clone();
            changed += 1;
        }
        Ok(changed)
    }

    async fn replace_deal_contact(
        &mut self,
        from: &ContactId,
        to: &ContactId,
    ) -> StoreResult<u64> {
        let state = &mut self.working;
        let mut changed = 0;
        for deal in state.deals.iter_mut().filter(|d| d.contact_ids.contains(from)) {
            if state.rejected_writes.contains(deal.id.as_str()) {
                return Err(StoreError::WriteRejected(deal.id.to_string()));
            }
            let replaced: Vec<ContactId> = {
                let mut seen = HashSet::new();
                deal.contact_ids
                    .iter()
                    .map(|id| if id == from { to } else { id })
                    .filter(|id| seen.insert(*id))
                    .cloned()
                    .collect()
            };
            deal.contact_ids = replaced;
            changed += 1;
        }
        Ok(changed)
    }

    async fn reassign_company_deals(
        &mut self,
        from: &CompanyId,
        to: &CompanyId,
    ) -> StoreResult<u64> {
        let state = &mut self.working;
        let mut changed = 0;
        for deal in state
            .deals
            .iter_mut()
            .filter(|d| d.company_id.as_ref() == Some(from))
        {
            if state.rejected_writes.contains(deal.id.as_str()) {
                return Err(StoreError::WriteRejected(deal.id.to_string()));
            }
            deal.company_id = Some(to.clone());
            changed += 1;
        }
        Ok(changed)
    }

    async fn reassign_company_contacts(
        &mut self,
        from: &CompanyId,
        to: &CompanyId,
    ) -> StoreResult<u64> {
        let state = &mut self.working;
        let mut changed = 0;
        for contact in state
            .contacts
            .iter_mut()
            .filter(|c| c.company_id.as_ref() == Some(from))
        {
            if state.rejected_writes.contains(contact.id.as_str()) {
                return Err(StoreError::WriteRejected(contact.id.to_string()));
            }
            contact.company_id = Some(to.clone());
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> StoreResult<()> {
        self.working.audit_log.push(entry.clone());
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        debug!("MemoryStore: transaction committed");
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        debug!("MemoryStore: transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DealId;

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = MemoryStore::new();
        store.insert_contact(Contact::new("c1", "Doe")).await;

        let mut tx = store.begin().await.unwrap();
        tx.delete_contact(&ContactId::from("c1")).await.unwrap();
        assert!(tx.contact(&ContactId::from("c1")).await.unwrap().is_none());
        tx.rollback().await.unwrap();

        assert!(store.contact(&ContactId::from("c1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryStore::new();
        store
            .insert_contact(Contact::new("c1", "Doe").with_company("co2"))
            .await;
        store.insert_company(Company::new("co1", "Acme")).await;
        store.insert_company(Company::new("co2", "Acme Inc")).await;

        let mut tx = store.begin().await.unwrap();
        let moved = tx
            .reassign_company_contacts(&CompanyId::from("co2"), &CompanyId::from("co1"))
            .await
            .unwrap();
        assert_eq!(moved, 1);
        tx.commit().await.unwrap();

        let count = store
            .count_contacts_for_company(&CompanyId::from("co1"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_rejected_write_errors() {
        let store = MemoryStore::new();
        store.insert_contact(Contact::new("c1", "Doe")).await;
        store.reject_writes_to("c1").await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.delete_contact(&ContactId::from("c1")).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(id) if id == "c1"));
    }

    #[tokio::test]
    async fn test_deal_contact_replacement_keeps_order_and_dedupes() {
        let store = MemoryStore::new();
        store
            .insert_deal(Deal {
                id: DealId::from("d1"),
                title: "Renewal".to_string(),
                company_id: None,
                contact_ids: vec![
                    ContactId::from("c3"),
                    ContactId::from("c2"),
                    ContactId::from("c1"),
                ],
            })
            .await;

        let mut tx = store.begin().await.unwrap();
        let changed = tx
            .replace_deal_contact(&ContactId::from("c2"), &ContactId::from("c1"))
            .await
            .unwrap();
        assert_eq!(changed, 1);
        tx.commit().await.unwrap();

        let ids = store.deals().await[0].contact_ids.clone();
        assert_eq!(ids, vec![ContactId::from("c3"), ContactId::from("c1")]);
    }
}
