// src/store/postgres.rs - record store over a bb8 pool of tokio-postgres connections
//
// Expected tables (public schema):
//   contacts      (id TEXT PK, first_name TEXT, last_name TEXT NOT NULL, email TEXT, phone TEXT,
//                  company_id TEXT, created_at TIMESTAMP, updated_at TIMESTAMP)
//   companies     (id TEXT PK, name TEXT NOT NULL, domain TEXT, website TEXT, phone TEXT,
//                  created_at TIMESTAMP, updated_at TIMESTAMP)
//   activities    (id TEXT PK, related_type TEXT, related_id TEXT, subject TEXT)
//   conversations (id TEXT PK, contact_id TEXT, subject TEXT)
//   deals         (id TEXT PK, title TEXT, company_id TEXT, contact_ids TEXT[])
//   audit_log     (id UUID PK, action TEXT, entity_type TEXT, entity_id TEXT, metadata JSONB,
//                  timestamp TIMESTAMP, system BOOLEAN)

use bb8::PooledConnection;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, warn};
use postgres_types::ToSql;
use tokio_postgres::{NoTls, Row};

use super::{RecordStore, StoreResult, StoreTransaction};
use crate::errors::StoreError;
use crate::models::{AuditLogEntry, Company, CompanyId, Contact, ContactId, RelatedType};
use crate::utils::db_connect::PgPool;

type PgConnection = PooledConnection<'static, PostgresConnectionManager<NoTls>>;

const CONTACT_COLUMNS: &str =
    "id, first_name, last_name, email, phone, company_id, created_at, updated_at";
const COMPANY_COLUMNS: &str = "id, name, domain, website, phone, created_at, updated_at";

fn contact_from_row(row: &Row) -> StoreResult<Contact> {
    Ok(Contact {
        id: ContactId(row.try_get("id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company_id: row.try_get::<_, Option<String>>("company_id")?.map(CompanyId),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn company_from_row(row: &Row) -> StoreResult<Company> {
    Ok(Company {
        id: CompanyId(row.try_get("id")?),
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        website: row.try_get("website")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Postgres-backed [`RecordStore`]. Collection order is primary-key order.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> StoreResult<PgConnection> {
        self.pool
            .get_owned()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

impl RecordStore for PgStore {
    type Tx = PgTransaction;

    async fn contacts(&self) -> StoreResult<Vec<Contact>> {
        let conn = self.connection().await?;
        let sql = format!("SELECT {} FROM public.contacts ORDER BY id", CONTACT_COLUMNS);
        let rows = conn.query(sql.as_str(), &[]).await?;
        rows.iter().map(contact_from_row).collect()
    }

    async fn companies(&self) -> StoreResult<Vec<Company>> {
        let conn = self.connection().await?;
        let sql = format!("SELECT {} FROM public.companies ORDER BY id", COMPANY_COLUMNS);
        let rows = conn.query(sql.as_str(), &[]).await?;
        rows.iter().map(company_from_row).collect()
    }

    async fn contact(&self, id: &ContactId) -> StoreResult<Option<Contact>> {
        let conn = self.connection().await?;
        let sql = format!("SELECT {} FROM public.contacts WHERE id = $1", CONTACT_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&id.as_str()]).await?;
        row.as_ref().map(contact_from_row).transpose()
    }

    async fn company(&self, id: &CompanyId) -> StoreResult<Option<Company>> {
        let conn = self.connection().await?;
        let sql = format!("SELECT {} FROM public.companies WHERE id = $1", COMPANY_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&id.as_str()]).await?;
        row.as_ref().map(company_from_row).transpose()
    }

    async fn count_contacts_for_company(&self, id: &CompanyId) -> StoreResult<usize> {
        let conn = self.connection().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS n FROM public.contacts WHERE company_id = $1",
                &[&id.as_str()],
            )
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count.max(0) as usize)
    }

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let conn = self.connection().await?;
        conn.batch_execute("BEGIN").await?;
        debug!("PgStore: transaction opened");
        Ok(PgTransaction { conn: Some(conn) })
    }
}

/// Explicit `BEGIN`/`COMMIT` on an owned pooled connection. Entity reads take
/// `FOR UPDATE` row locks so conflicting merges wait for each other; dependents are
/// rewritten with one set-based `UPDATE` per table.
pub struct PgTransaction {
    conn: Option<PgConnection>,
}

impl PgTransaction {
    fn client(&self) -> StoreResult<&PgConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::Pool("transaction already finished".to_string()))
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<u64> {
        Ok(self.client()?.execute(sql, params).await?)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Vec<Row>> {
        Ok(self.client()?.query(sql, params).await?)
    }

    async fn finish(mut self, statement: &str) -> StoreResult<()> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::Pool("transaction already finished".to_string()))?;
        conn.batch_execute(statement).await?;
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("PgStore: transaction dropped without commit; rolling back");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = conn.batch_execute("ROLLBACK").await {
                        warn!("PgStore: rollback of abandoned transaction failed: {}", e);
                    }
                });
            }
        }
    }
}

impl StoreTransaction for PgTransaction {
    async fn contact(&mut self, id: &ContactId) -> StoreResult<Option<Contact>> {
        let sql = format!(
            "SELECT {} FROM public.contacts WHERE id = $1 FOR UPDATE",
            CONTACT_COLUMNS
        );
        let rows = self.query(&sql, &[&id.as_str()]).await?;
        rows.first().map(contact_from_row).transpose()
    }

    async fn company(&mut self, id: &CompanyId) -> StoreResult<Option<Company>> {
        let sql = format!(
            "SELECT {} FROM public.companies WHERE id = $1 FOR UPDATE",
            COMPANY_COLUMNS
        );
        let rows = self.query(&sql, &[&id.as_str()]).await?;
        rows.first().map(company_from_row).transpose()
    }

    async fn update_contact(&mut self, contact: &Contact) -> StoreResult<()> {
        let company_id = contact.company_id.as_ref().map(|c| c.as_str());
        self.execute(
            "UPDATE public.contacts
             SET first_name = $2, last_name = $3, email = $4, phone = $5, company_id = $6,
                 updated_at = $7
             WHERE id = $1",
            &[
                &contact.id.as_str(),
                &contact.first_name,
                &contact.last_name,
                &contact.email,
                &contact.phone,
                &company_id,
                &contact.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_company(&mut self, company: &Company) -> StoreResult<()> {
        self.execute(
            "UPDATE public.companies
             SET name = $2, domain = $3, website = $4, phone = $5, updated_at = $6
             WHERE id = $1",
            &[
                &company.id.as_str(),
                &company.name,
                &company.domain,
                &company.website,
                &company.phone,
                &company.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_contact(&mut self, id: &ContactId) -> StoreResult<()> {
        self.execute("DELETE FROM public.contacts WHERE id = $1", &[&id.as_str()])
            .await?;
        Ok(())
    }

    async fn delete_company(&mut self, id: &CompanyId) -> StoreResult<()> {
        self.execute("DELETE FROM public.companies WHERE id = $1", &[&id.as_str()])
            .await?;
        Ok(())
    }

    async fn relink_activities(
        &mut self,
        related_type: RelatedType,
        from: &str,
        to: &str,
    ) -> StoreResult<u64> {
        self.execute(
            "UPDATE public.activities SET related_id = $3
             WHERE related_type = $1 AND related_id = $2",
            &[&related_type.as_str(), &from, &to],
        )
        .await
    }

    async fn relink_conversations(
        &mut self,
        from: &ContactId,
        to: &ContactId,
    ) -> StoreResult<u64> {
        self.execute(
            "UPDATE public.conversations SET contact_id = $2 WHERE contact_id = $1",
            &[&from.as_str(), &to.as_str()],
        )
        .await
    }

    async fn replace_deal_contact(
        &mut self,
        from: &ContactId,
        to: &ContactId,
    ) -> StoreResult<u64> {
        // First occurrence wins once `from` has become `to`.
        self.execute(
            "UPDATE public.deals d
             SET contact_ids = ARRAY(
                 SELECT x.contact_id
                 FROM unnest(array_replace(d.contact_ids, $1, $2))
                      WITH ORDINALITY AS x(contact_id, pos)
                 GROUP BY x.contact_id
                 ORDER BY MIN(x.pos)
             )
             WHERE $1 = ANY(d.contact_ids)",
            &[&from.as_str(), &to.as_str()],
        )
        .await
    }

    async fn reassign_company_deals(
        &mut self,
        from: &CompanyId,
        to: &CompanyId,
    ) -> StoreResult<u64> {
        self.execute(
            "UPDATE public.deals SET company_id = $2 WHERE company_id = $1",
            &[&from.as_str(), &to.as_str()],
        )
        .await
    }

    async fn reassign_company_contacts(
        &mut self,
        from: &CompanyId,
        to: &CompanyId,
    ) -> StoreResult<u64> {
        self.execute(
            "UPDATE public.contacts SET company_id = $2 WHERE company_id = $1",
            &[&from.as_str(), &to.as_str()],
        )
        .await
    }

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> StoreResult<()> {
        self.execute(
            "INSERT INTO public.audit_log
             (id, action, entity_type, entity_id, metadata, timestamp, system)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &entry.id,
                &entry.action,
                &entry.entity_type.as_str(),
                &entry.entity_id,
                &entry.metadata,
                &entry.timestamp,
                &entry.system,
            ],
        )
        .await?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.finish("COMMIT").await?;
        debug!("PgStore: transaction committed");
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.finish("ROLLBACK").await?;
        debug!("PgStore: transaction rolled back");
        Ok(())
    }
}
