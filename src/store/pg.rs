//! Postgres adapter. `with_document` takes a `SELECT ... FOR UPDATE` on the
//! document row, which serializes concurrent signer responses to the same
//! document; documents never contend with each other.

use diesel::prelude::*;

use crate::error::{StoreError, WorkflowError};
use crate::models::{AuditLog, Document, Signature, Signer};
use crate::schema;
use crate::schema::DocumentStatus;
use crate::store::{DocumentStore, DocumentTxn};

pub type PgPool = r2d2::Pool<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>, StoreError>
    {
        Ok(self.pool.get()?)
    }
}

impl DocumentStore for PgStore {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut c = self.conn()?;
        diesel::insert_into(schema::documents::dsl::documents)
            .values(document)
            .execute(&mut *c)?;
        Ok(())
    }

    fn document(&self, id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        let mut c = self.conn()?;
        Ok(schema::documents::dsl::documents
            .find(id)
            .first::<Document>(&mut *c)
            .optional()?)
    }

    fn documents_by_owner(&self, owner_id: uuid::Uuid) -> Result<Vec<Document>, StoreError> {
        let mut c = self.conn()?;
        Ok(schema::documents::dsl::documents
            .filter(schema::documents::dsl::owner_id.eq(owner_id))
            .order_by(schema::documents::dsl::created_at.desc())
            .load::<Document>(&mut *c)?)
    }

    fn signers_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<Signer>, StoreError> {
        let mut c = self.conn()?;
        Ok(schema::signers::dsl::signers
            .filter(schema::signers::dsl::document_id.eq(document_id))
            .order_by(schema::signers::dsl::created_at.asc())
            .load::<Signer>(&mut *c)?)
    }

    fn find_signer_by_token(&self, token: &str) -> Result<Option<Signer>, StoreError> {
        let mut c = self.conn()?;
        Ok(schema::signers::dsl::signers
            .filter(schema::signers::dsl::token.eq(token))
            .first::<Signer>(&mut *c)
            .optional()?)
    }

    fn set_signed_url(&self, document_id: uuid::Uuid, url: &str) -> Result<(), StoreError> {
        let mut c = self.conn()?;
        diesel::update(schema::documents::dsl::documents.find(document_id))
            .set((
                schema::documents::dsl::signed_url.eq(url),
                schema::documents::dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut *c)?;
        Ok(())
    }

    fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError> {
        let mut c = self.conn()?;
        diesel::insert_into(schema::audit_log::dsl::audit_log)
            .values(entry)
            .execute(&mut *c)?;
        Ok(())
    }

    fn audit_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<AuditLog>, StoreError> {
        let mut c = self.conn()?;
        Ok(schema::audit_log::dsl::audit_log
            .filter(schema::audit_log::dsl::document_id.eq(document_id))
            .order_by(schema::audit_log::dsl::created_at.asc())
            .load::<AuditLog>(&mut *c)?)
    }

    fn with_document<T, F>(&self, document_id: uuid::Uuid, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut dyn DocumentTxn) -> Result<T, WorkflowError>,
    {
        let mut c = self.conn()?;
        c.transaction::<T, WorkflowError, _>(|conn| {
            let exists = schema::documents::dsl::documents
                .find(document_id)
                .for_update()
                .first::<Document>(conn)
                .optional()
                .map_err(StoreError::Diesel)?;
            if exists.is_none() {
                return Err(WorkflowError::DocumentNotFound);
            }

            let mut txn = PgTxn { conn, document_id };
            f(&mut txn)
        })
    }
}

struct PgTxn<'a> {
    conn: &'a mut diesel::PgConnection,
    document_id: uuid::Uuid,
}

impl DocumentTxn for PgTxn<'_> {
    fn document(&mut self) -> Result<Document, StoreError> {
        Ok(schema::documents::dsl::documents
            .find(self.document_id)
            .first::<Document>(self.conn)?)
    }

    fn signers(&mut self) -> Result<Vec<Signer>, StoreError> {
        Ok(schema::signers::dsl::signers
            .filter(schema::signers::dsl::document_id.eq(self.document_id))
            .order_by(schema::signers::dsl::created_at.asc())
            .load::<Signer>(self.conn)?)
    }

    fn signer(&mut self, signer_id: uuid::Uuid) -> Result<Option<Signer>, StoreError> {
        Ok(schema::signers::dsl::signers
            .find(signer_id)
            .first::<Signer>(self.conn)
            .optional()?)
    }

    fn insert_signers(&mut self, signers: &[Signer]) -> Result<(), StoreError> {
        diesel::insert_into(schema::signers::dsl::signers)
            .values(signers)
            .execute(self.conn)?;
        Ok(())
    }

    fn insert_signature(&mut self, signature: &Signature) -> Result<(), StoreError> {
        diesel::insert_into(schema::signatures::dsl::signatures)
            .values(signature)
            .execute(self.conn)?;
        Ok(())
    }

    fn mark_signed(
        &mut self,
        signer_id: uuid::Uuid,
        at: chrono::NaiveDateTime,
    ) -> Result<(), StoreError> {
        diesel::update(schema::signers::dsl::signers.find(signer_id))
            .set((
                schema::signers::dsl::status.eq(crate::schema::SignerStatus::Signed),
                schema::signers::dsl::signed_at.eq(at),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn mark_rejected(&mut self, signer_id: uuid::Uuid, reason: &str) -> Result<(), StoreError> {
        diesel::update(schema::signers::dsl::signers.find(signer_id))
            .set((
                schema::signers::dsl::status.eq(crate::schema::SignerStatus::Rejected),
                schema::signers::dsl::rejection_reason.eq(reason),
            ))
            .execute(self.conn)?;
        Ok(())
    }

    fn set_status(&mut self, status: DocumentStatus) -> Result<(), StoreError> {
        diesel::update(schema::documents::dsl::documents.find(self.document_id))
            .set((
                schema::documents::dsl::status.eq(status),
                schema::documents::dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(self.conn)?;
        Ok(())
    }
}
