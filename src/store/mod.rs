//! Persistence behind a trait: the workflow is written against
//! [`DocumentStore`] and never touches a connection directly, so the signing
//! rules run identically over Postgres and over the in-memory double.

pub mod memory;
pub mod pg;

use crate::error::{StoreError, WorkflowError};
use crate::models::{AuditLog, Document, Signature, Signer};
use crate::schema::DocumentStatus;

/// Reads and writes scoped to one document, applied atomically.
///
/// Everything a signer mutation needs happens through this handle inside
/// [`DocumentStore::with_document`]: the terminal-status and PENDING checks,
/// the signer write, and the status recomputation all commit (or roll back)
/// as one unit. Reads observe writes staged earlier in the same transaction,
/// which is what makes the post-write recomputation read safe.
pub trait DocumentTxn {
    fn document(&mut self) -> Result<Document, StoreError>;
    fn signers(&mut self) -> Result<Vec<Signer>, StoreError>;
    fn signer(&mut self, signer_id: uuid::Uuid) -> Result<Option<Signer>, StoreError>;
    fn insert_signers(&mut self, signers: &[Signer]) -> Result<(), StoreError>;
    fn insert_signature(&mut self, signature: &Signature) -> Result<(), StoreError>;
    fn mark_signed(
        &mut self,
        signer_id: uuid::Uuid,
        at: chrono::NaiveDateTime,
    ) -> Result<(), StoreError>;
    fn mark_rejected(&mut self, signer_id: uuid::Uuid, reason: &str) -> Result<(), StoreError>;
    fn set_status(&mut self, status: DocumentStatus) -> Result<(), StoreError>;
}

pub trait DocumentStore: Send + Sync + 'static {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError>;
    fn document(&self, id: uuid::Uuid) -> Result<Option<Document>, StoreError>;
    fn documents_by_owner(&self, owner_id: uuid::Uuid) -> Result<Vec<Document>, StoreError>;
    fn signers_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<Signer>, StoreError>;
    fn find_signer_by_token(&self, token: &str) -> Result<Option<Signer>, StoreError>;
    fn set_signed_url(&self, document_id: uuid::Uuid, url: &str) -> Result<(), StoreError>;
    fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError>;
    fn audit_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<AuditLog>, StoreError>;

    /// Runs `f` against the named document under a document-granularity lock,
    /// committing its writes only when it returns `Ok`. Fails with
    /// [`WorkflowError::DocumentNotFound`] before invoking `f` if the
    /// document does not exist.
    fn with_document<T, F>(&self, document_id: uuid::Uuid, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut dyn DocumentTxn) -> Result<T, WorkflowError>;
}
