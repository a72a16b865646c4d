//! In-memory store double. Transactions stage their writes on a copy of the
//! state and swap it in on commit, so an aborted closure leaves nothing
//! behind, mirroring the rollback behaviour of the Postgres adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{StoreError, WorkflowError};
use crate::models::{AuditLog, Document, Signature, Signer};
use crate::schema::DocumentStatus;
use crate::store::{DocumentStore, DocumentTxn};

#[derive(Default, Clone)]
struct Inner {
    documents: HashMap<uuid::Uuid, Document>,
    signers: HashMap<uuid::Uuid, Signer>,
    signatures: HashMap<uuid::Uuid, Signature>,
    audit: Vec<AuditLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn signatures_for_signer(&self, signer_id: uuid::Uuid) -> Vec<Signature> {
        let inner = self.inner.lock().unwrap();
        let mut sigs: Vec<_> = inner
            .signatures
            .values()
            .filter(|s| s.signer_id == signer_id)
            .cloned()
            .collect();
        sigs.sort_by_key(|s| s.created_at);
        sigs
    }
}

fn check_signer_constraints(inner: &Inner, signer: &Signer) -> Result<(), StoreError> {
    for existing in inner.signers.values() {
        if existing.id == signer.id {
            continue;
        }
        if existing.token == signer.token {
            return Err(StoreError::Constraint(format!(
                "duplicate token for signer {}",
                signer.email
            )));
        }
        if existing.document_id == signer.document_id
            && existing.email.eq_ignore_ascii_case(&signer.email)
        {
            return Err(StoreError::Constraint(format!(
                "duplicate signer {} on document {}",
                signer.email, signer.document_id
            )));
        }
    }
    Ok(())
}

impl DocumentStore for MemoryStore {
    fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.documents.insert(document.id, document.clone());
        Ok(())
    }

    fn document(&self, id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.lock().unwrap().documents.get(&id).cloned())
    }

    fn documents_by_owner(&self, owner_id: uuid::Uuid) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut docs: Vec<_> = inner
            .documents
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    fn signers_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<Signer>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut signers: Vec<_> = inner
            .signers
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        signers.sort_by_key(|s| s.created_at);
        Ok(signers)
    }

    fn find_signer_by_token(&self, token: &str) -> Result<Option<Signer>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.signers.values().find(|s| s.token == token).cloned())
    }

    fn set_signed_url(&self, document_id: uuid::Uuid, url: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(doc) = inner.documents.get_mut(&document_id) {
            doc.signed_url = Some(url.to_string());
            doc.updated_at = chrono::Utc::now().naive_utc();
        }
        Ok(())
    }

    fn append_audit(&self, entry: &AuditLog) -> Result<(), StoreError> {
        self.inner.lock().unwrap().audit.push(entry.clone());
        Ok(())
    }

    fn audit_for_document(&self, document_id: uuid::Uuid) -> Result<Vec<AuditLog>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect())
    }

    fn with_document<T, F>(&self, document_id: uuid::Uuid, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut dyn DocumentTxn) -> Result<T, WorkflowError>,
    {
        let mut inner = self.inner.lock().unwrap();
        if !inner.documents.contains_key(&document_id) {
            return Err(WorkflowError::DocumentNotFound);
        }

        let mut staged = inner.clone();
        let mut txn = MemTxn {
            inner: &mut staged,
            document_id,
        };
        let out = f(&mut txn)?;
        *inner = staged;
        Ok(out)
    }
}

struct MemTxn<'a> {
    inner: &'a mut Inner,
    document_id: uuid::Uuid,
}

impl DocumentTxn for MemTxn<'_> {
    fn document(&mut self) -> Result<Document, StoreError> {
        Ok(self.inner.documents[&self.document_id].clone())
    }

    fn signers(&mut self) -> Result<Vec<Signer>, StoreError> {
        let mut signers: Vec<_> = self
            .inner
            .signers
            .values()
            .filter(|s| s.document_id == self.document_id)
            .cloned()
            .collect();
        signers.sort_by_key(|s| s.created_at);
        Ok(signers)
    }

    fn signer(&mut self, signer_id: uuid::Uuid) -> Result<Option<Signer>, StoreError> {
        Ok(self.inner.signers.get(&signer_id).cloned())
    }

    fn insert_signers(&mut self, signers: &[Signer]) -> Result<(), StoreError> {
        for signer in signers {
            check_signer_constraints(self.inner, signer)?;
            self.inner.signers.insert(signer.id, signer.clone());
        }
        Ok(())
    }

    fn insert_signature(&mut self, signature: &Signature) -> Result<(), StoreError> {
        self.inner
            .signatures
            .insert(signature.id, signature.clone());
        Ok(())
    }

    fn mark_signed(
        &mut self,
        signer_id: uuid::Uuid,
        at: chrono::NaiveDateTime,
    ) -> Result<(), StoreError> {
        if let Some(signer) = self.inner.signers.get_mut(&signer_id) {
            signer.status = crate::schema::SignerStatus::Signed;
            signer.signed_at = Some(at);
        }
        Ok(())
    }

    fn mark_rejected(&mut self, signer_id: uuid::Uuid, reason: &str) -> Result<(), StoreError> {
        if let Some(signer) = self.inner.signers.get_mut(&signer_id) {
            signer.status = crate::schema::SignerStatus::Rejected;
            signer.rejection_reason = Some(reason.to_string());
        }
        Ok(())
    }

    fn set_status(&mut self, status: DocumentStatus) -> Result<(), StoreError> {
        if let Some(doc) = self.inner.documents.get_mut(&self.document_id) {
            doc.status = status;
            doc.updated_at = chrono::Utc::now().naive_utc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SignerStatus;

    fn document() -> Document {
        Document::new(uuid::Uuid::new_v4(), "/files/base.pdf".to_string())
    }

    #[test]
    fn duplicate_email_on_one_document_is_rejected() {
        let store = MemoryStore::default();
        let doc = document();
        store.insert_document(&doc).unwrap();

        let res = store.with_document(doc.id, |txn| {
            txn.insert_signers(&[
                Signer::new(doc.id, "a@x.com".into(), crate::token::issue()),
                Signer::new(doc.id, "A@X.com".into(), crate::token::issue()),
            ])?;
            Ok(())
        });
        assert!(matches!(
            res,
            Err(WorkflowError::Store(StoreError::Constraint(_)))
        ));
        assert!(store.signers_for_document(doc.id).unwrap().is_empty());
    }

    #[test]
    fn aborted_transaction_leaves_no_writes() {
        let store = MemoryStore::default();
        let doc = document();
        store.insert_document(&doc).unwrap();

        let res: Result<(), _> = store.with_document(doc.id, |txn| {
            txn.insert_signers(&[Signer::new(
                doc.id,
                "a@x.com".into(),
                crate::token::issue(),
            )])?;
            txn.set_status(DocumentStatus::Signed)?;
            Err(WorkflowError::PermissionDenied)
        });
        assert!(matches!(res, Err(WorkflowError::PermissionDenied)));
        assert!(store.signers_for_document(doc.id).unwrap().is_empty());
        assert_eq!(
            store.document(doc.id).unwrap().unwrap().status,
            DocumentStatus::Pending
        );
    }

    #[test]
    fn token_lookup_is_exact() {
        let store = MemoryStore::default();
        let doc = document();
        store.insert_document(&doc).unwrap();
        let token = crate::token::issue();
        store
            .with_document(doc.id, |txn| {
                txn.insert_signers(&[Signer::new(doc.id, "a@x.com".into(), token.clone())])?;
                Ok(())
            })
            .unwrap();

        assert!(store.find_signer_by_token(&token).unwrap().is_some());
        let truncated = &token[..token.len() - 1];
        assert!(store.find_signer_by_token(truncated).unwrap().is_none());
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = MemoryStore::default();
        let doc = document();
        store.insert_document(&doc).unwrap();
        let signer = Signer::new(doc.id, "a@x.com".into(), crate::token::issue());
        let signer_id = signer.id;

        store
            .with_document(doc.id, |txn| {
                txn.insert_signers(&[signer.clone()])?;
                txn.mark_signed(signer_id, chrono::Utc::now().naive_utc())?;
                txn.set_status(DocumentStatus::Signed)?;
                Ok(())
            })
            .unwrap();

        let signers = store.signers_for_document(doc.id).unwrap();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].status, SignerStatus::Signed);
        assert!(signers[0].signed_at.is_some());
        assert_eq!(
            store.document(doc.id).unwrap().unwrap().status,
            DocumentStatus::Signed
        );
    }
}
