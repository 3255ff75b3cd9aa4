//! Record store seam.
//!
//! The engine never owns storage. Finders read snapshots through [`RecordStore`];
//! the merge executor writes through a [`StoreTransaction`] that either commits every
//! change or none of them.

pub mod memory;
pub mod postgres;

use crate::errors::StoreError;
use crate::matching::signals::Matchable;
use crate::models::{AuditLogEntry, Company, CompanyId, Contact, ContactId, RelatedType};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to collection snapshots plus a way to open a write transaction.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    type Tx: StoreTransaction;

    /// Every contact, in collection order.
    async fn contacts(&self) -> StoreResult<Vec<Contact>>;

    /// Every company, in collection order.
    async fn companies(&self) -> StoreResult<Vec<Company>>;

    async fn contact(&self, id: &ContactId) -> StoreResult<Option<Contact>>;

    async fn company(&self, id: &CompanyId) -> StoreResult<Option<Company>>;

    async fn count_contacts_for_company(&self, id: &CompanyId) -> StoreResult<usize>;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// An open read-then-write critical section. Reads through the transaction lock what
/// they return until `commit` or `rollback`.
#[allow(async_fn_in_trait)]
pub trait StoreTransaction {
    async fn contact(&mut self, id: &ContactId) -> StoreResult<Option<Contact>>;

    async fn company(&mut self, id: &CompanyId) -> StoreResult<Option<Company>>;

    async fn update_contact(&mut self, contact: &Contact) -> StoreResult<()>;

    async fn update_company(&mut self, company: &Company) -> StoreResult<()>;

    async fn delete_contact(&mut self, id: &ContactId) -> StoreResult<()>;

    async fn delete_company(&mut self, id: &CompanyId) -> StoreResult<()>;

    /// Re-points every activity of `related_type` attached to `from` at `to`.
    async fn relink_activities(
        &mut self,
        related_type: RelatedType,
        from: &str,
        to: &str,
    ) -> StoreResult<u64>;

    async fn relink_conversations(&mut self, from: &ContactId, to: &ContactId)
        -> StoreResult<u64>;

    /// Replaces `from` with `to` in every deal's contact list, keeping `to` at most once
    /// and the remaining ids in their original order.
    async fn replace_deal_contact(&mut self, from: &ContactId, to: &ContactId)
        -> StoreResult<u64>;

    async fn reassign_company_deals(&mut self, from: &CompanyId, to: &CompanyId)
        -> StoreResult<u64>;

    async fn reassign_company_contacts(
        &mut self,
        from: &CompanyId,
        to: &CompanyId,
    ) -> StoreResult<u64>;

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Ties a matchable kind to the store calls that load it.
#[allow(async_fn_in_trait)]
pub trait StoredEntity: Matchable {
    async fn load_all<S: RecordStore>(store: &S) -> StoreResult<Vec<Self>>;

    async fn load<S: RecordStore>(store: &S, id: &Self::Id) -> StoreResult<Option<Self>>;
}

impl StoredEntity for Contact {
    async fn load_all<S: RecordStore>(store: &S) -> StoreResult<Vec<Self>> {
        store.contacts().await
    }

    async fn load<S: RecordStore>(store: &S, id: &ContactId) -> StoreResult<Option<Self>> {
        store.contact(id).await
    }
}

impl StoredEntity for Company {
    async fn load_all<S: RecordStore>(store: &S) -> StoreResult<Vec<Self>> {
        store.companies().await
    }

    async fn load<S: RecordStore>(store: &S, id: &CompanyId) -> StoreResult<Option<Self>> {
        store.company(id).await
    }
}
