//! The signing workflow itself: uploads, signer invitations, and the
//! accept/reject paths reachable either through a signing token or through
//! the owner's session.
//!
//! All state transitions run inside [`DocumentStore::with_document`], and the
//! document status is recomputed from the post-write signer set in the same
//! transaction. Mail and PDF stamping happen after commit and never fail the
//! request.

use std::sync::Arc;

use itertools::Itertools;

use crate::audit::AuditRecorder;
use crate::error::WorkflowError;
use crate::mail::Mailer;
use crate::models::{AuditLog, Document, Signature, Signer};
use crate::schema::{SignatureType, SignerStatus};
use crate::status;
use crate::storage::ObjectStorage;
use crate::store::DocumentStore;
use crate::token;
use crate::views::ClientMeta;

const MIN_REJECT_REASON: usize = 3;
const DEFAULT_REJECT_REASON: &str = "No reason provided";

/// How the caller is acting on a signer record: anonymously through the
/// signer's token, or as the document owner picking the signer by id.
pub enum SignerRef<'a> {
    Token(&'a str),
    Owner {
        requester: uuid::Uuid,
        document_id: uuid::Uuid,
        signer_id: uuid::Uuid,
    },
}

#[derive(Clone, Debug)]
pub struct SignaturePayload {
    pub sig_type: SignatureType,
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub page: i32,
}

/// The updated records handed back to the view layer after an accept or
/// reject commits.
pub struct SignerOutcome {
    pub document: Document,
    pub signer: Signer,
}

pub struct SigningService<S> {
    store: Arc<S>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<Mailer>,
    audit: AuditRecorder<S>,
    final_embed: bool,
}

impl<S: DocumentStore> SigningService<S> {
    pub fn new(
        store: Arc<S>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<Mailer>,
        final_embed: bool,
    ) -> Self {
        Self {
            audit: AuditRecorder::new(store.clone()),
            store,
            storage,
            mailer,
            final_embed,
        }
    }

    pub async fn upload_document(
        &self,
        owner_id: uuid::Uuid,
        bytes: Vec<u8>,
        client: &ClientMeta,
    ) -> Result<Document, WorkflowError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(WorkflowError::InvalidPayload(
                "request body is not a PDF document".to_string(),
            ));
        }

        let mut document = Document::new(owner_id, String::new());
        document.original_url = self
            .storage
            .store(&format!("{}.pdf", document.id), bytes)
            .await?;
        self.store.insert_document(&document)?;

        info!("Document {} uploaded by {}", document.id, owner_id);
        self.audit
            .record(document.id, "DOCUMENT_UPLOADED".to_string(), client);
        Ok(document)
    }

    pub fn documents_for_owner(
        &self,
        owner_id: uuid::Uuid,
    ) -> Result<Vec<Document>, WorkflowError> {
        Ok(self.store.documents_by_owner(owner_id)?)
    }

    pub fn document_for_owner(
        &self,
        owner_id: uuid::Uuid,
        document_id: uuid::Uuid,
    ) -> Result<(Document, Vec<Signer>), WorkflowError> {
        let document = self.owned_document(owner_id, document_id)?;
        let signers = self.store.signers_for_document(document_id)?;
        Ok((document, signers))
    }

    pub fn audit_trail(
        &self,
        owner_id: uuid::Uuid,
        document_id: uuid::Uuid,
    ) -> Result<Vec<AuditLog>, WorkflowError> {
        self.owned_document(owner_id, document_id)?;
        Ok(self.store.audit_for_document(document_id)?)
    }

    pub fn add_signers(
        &self,
        owner_id: uuid::Uuid,
        document_id: uuid::Uuid,
        emails: &[String],
        client: &ClientMeta,
    ) -> Result<Vec<Signer>, WorkflowError> {
        if emails.is_empty() {
            return Err(WorkflowError::InvalidPayload(
                "at least one signer email is required".to_string(),
            ));
        }

        let normalized = emails
            .iter()
            .map(|e| e.trim().to_lowercase())
            .collect::<Vec<_>>();

        // Every bad address in the batch is reported, not just the first.
        let invalid = normalized
            .iter()
            .filter(|e| e.parse::<lettre::Address>().is_err())
            .cloned()
            .collect::<Vec<_>>();
        if !invalid.is_empty() {
            return Err(WorkflowError::InvalidEmails(invalid));
        }

        let mut duplicates = normalized
            .iter()
            .duplicates()
            .cloned()
            .collect::<Vec<_>>();

        let new_signers = self.store.with_document(document_id, |txn| {
            let document = txn.document()?;
            if document.owner_id != owner_id {
                return Err(WorkflowError::PermissionDenied);
            }
            if status::is_terminal(document.status) {
                return Err(WorkflowError::DocumentClosed {
                    status: document.status,
                });
            }

            let existing = txn
                .signers()?
                .into_iter()
                .map(|s| s.email)
                .collect::<std::collections::HashSet<_>>();
            duplicates.extend(
                normalized
                    .iter()
                    .filter(|e| existing.contains(e.as_str()))
                    .cloned(),
            );
            if !duplicates.is_empty() {
                duplicates.sort();
                duplicates.dedup();
                return Err(WorkflowError::DuplicateSigners(std::mem::take(
                    &mut duplicates,
                )));
            }

            let new_signers = normalized
                .iter()
                .unique()
                .map(|email| Signer::new(document_id, email.clone(), token::issue()))
                .collect::<Vec<_>>();
            txn.insert_signers(&new_signers)?;

            let statuses = txn.signers()?.iter().map(|s| s.status).collect::<Vec<_>>();
            txn.set_status(status::recompute_document_status(&statuses))?;

            Ok(new_signers)
        })?;

        self.audit.record(
            document_id,
            format!("SIGNERS_ADDED ({})", new_signers.len()),
            client,
        );
        for signer in &new_signers {
            let mailer = self.mailer.clone();
            let email = signer.email.clone();
            let token = signer.token.clone();
            tokio::spawn(async move {
                mailer.send_signature_request(&email, &token).await;
            });
        }

        Ok(new_signers)
    }

    pub fn verify_token(&self, raw_token: &str) -> Result<(Document, Signer), WorkflowError> {
        let signer = token::resolve(self.store.as_ref(), raw_token)?;
        let document = self
            .store
            .document(signer.document_id)?
            .ok_or(WorkflowError::DocumentNotFound)?;
        Ok((document, signer))
    }

    pub async fn accept_signing(
        &self,
        who: SignerRef<'_>,
        payload: SignaturePayload,
        client: &ClientMeta,
    ) -> Result<SignerOutcome, WorkflowError> {
        validate_payload(&payload)?;
        let (document_id, signer_id, requester) = self.resolve_ref(who)?;

        let now = chrono::Utc::now().naive_utc();
        let signature = Signature {
            id: uuid::Uuid::new_v4(),
            document_id,
            signer_id,
            sig_type: payload.sig_type,
            value: payload.value.clone(),
            x: payload.x,
            y: payload.y,
            page: payload.page,
            created_at: now,
        };

        let (mut document, mut signer) = self.store.with_document(document_id, |txn| {
            let document = txn.document()?;
            let signer = guard_response(txn, &document, signer_id, requester)?;

            txn.insert_signature(&signature)?;
            txn.mark_signed(signer.id, now)?;

            let statuses = txn.signers()?.iter().map(|s| s.status).collect::<Vec<_>>();
            txn.set_status(status::recompute_document_status(&statuses))?;
            Ok((document, signer))
        })?;
        signer.status = SignerStatus::Signed;
        signer.signed_at = Some(now);
        document.status = status::recompute_document_status(
            &self
                .store
                .signers_for_document(document_id)?
                .iter()
                .map(|s| s.status)
                .collect::<Vec<_>>(),
        );

        info!("Signer {} signed document {}", signer.email, document_id);
        self.audit.record(
            document_id,
            format!("SIGNER_SIGNED ({})", signer.email),
            client,
        );

        if self.final_embed {
            if let Err(err) = self.embed_stamp(&mut document, &payload).await {
                warn!(
                    "Failed to stamp signature onto document {}: {}",
                    document_id, err
                );
            }
        }

        if document.status == crate::schema::DocumentStatus::Signed {
            for recipient in self.store.signers_for_document(document_id)? {
                let mailer = self.mailer.clone();
                tokio::spawn(async move {
                    mailer
                        .send_document_signed(&recipient.email, &recipient.token)
                        .await;
                });
            }
        }

        Ok(SignerOutcome { document, signer })
    }

    pub async fn reject_signing(
        &self,
        who: SignerRef<'_>,
        reason: Option<&str>,
        client: &ClientMeta,
    ) -> Result<SignerOutcome, WorkflowError> {
        // Owners must say why they are rejecting, and at some length. Token
        // signers may say anything or nothing; an absent reason gets a
        // placeholder so the record is never empty.
        let owner_path = matches!(who, SignerRef::Owner { .. });
        let reason = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) if owner_path && r.len() < MIN_REJECT_REASON => {
                return Err(WorkflowError::ReasonTooShort {
                    min: MIN_REJECT_REASON,
                })
            }
            Some(r) => r.to_string(),
            None if owner_path => {
                return Err(WorkflowError::ReasonTooShort {
                    min: MIN_REJECT_REASON,
                })
            }
            None => DEFAULT_REJECT_REASON.to_string(),
        };

        let (document_id, signer_id, requester) = self.resolve_ref(who)?;

        let (mut document, mut signer) = self.store.with_document(document_id, |txn| {
            let document = txn.document()?;
            let signer = guard_response(txn, &document, signer_id, requester)?;

            txn.mark_rejected(signer.id, &reason)?;
            txn.set_status(crate::schema::DocumentStatus::Rejected)?;
            Ok((document, signer))
        })?;
        signer.status = SignerStatus::Rejected;
        signer.rejection_reason = Some(reason);
        document.status = crate::schema::DocumentStatus::Rejected;

        info!("Signer {} rejected document {}", signer.email, document_id);
        self.audit.record(
            document_id,
            format!("SIGNER_REJECTED ({})", signer.email),
            client,
        );

        Ok(SignerOutcome { document, signer })
    }

    fn owned_document(
        &self,
        owner_id: uuid::Uuid,
        document_id: uuid::Uuid,
    ) -> Result<Document, WorkflowError> {
        let document = self
            .store
            .document(document_id)?
            .ok_or(WorkflowError::DocumentNotFound)?;
        if document.owner_id != owner_id {
            return Err(WorkflowError::PermissionDenied);
        }
        Ok(document)
    }

    fn resolve_ref(
        &self,
        who: SignerRef<'_>,
    ) -> Result<(uuid::Uuid, uuid::Uuid, Option<uuid::Uuid>), WorkflowError> {
        match who {
            SignerRef::Token(raw) => {
                let signer = token::resolve(self.store.as_ref(), raw)?;
                Ok((signer.document_id, signer.id, None))
            }
            SignerRef::Owner {
                requester,
                document_id,
                signer_id,
            } => Ok((document_id, signer_id, Some(requester))),
        }
    }

    /// Stamps the freshly recorded signature onto the document and publishes
    /// the result as `{id}-signed.pdf`. Later signatures stamp onto the
    /// already-stamped file so earlier marks are kept.
    async fn embed_stamp(
        &self,
        document: &mut Document,
        payload: &SignaturePayload,
    ) -> Result<(), WorkflowError> {
        let source_url = document
            .signed_url
            .as_deref()
            .unwrap_or(&document.original_url);
        let base = self.storage.fetch(source_url).await?;

        let content = match payload.sig_type {
            SignatureType::Typed => crate::pdf::StampContent::Text(payload.value.clone()),
            SignatureType::Drawn | SignatureType::Image => crate::pdf::StampContent::Png(
                crate::pdf::decode_image_payload(&payload.value)
                    .map_err(|e| WorkflowError::InvalidPayload(e.to_string()))?,
            ),
        };
        let stamped = crate::pdf::embed_signature(
            &base,
            &crate::pdf::Stamp {
                content,
                x: payload.x,
                y: payload.y,
                page: payload.page as u32,
            },
        )
        .map_err(|e| WorkflowError::InvalidPayload(e.to_string()))?;

        let url = self
            .storage
            .store(&format!("{}-signed.pdf", document.id), stamped)
            .await?;
        self.store.set_signed_url(document.id, &url)?;
        document.signed_url = Some(url);
        Ok(())
    }
}

fn validate_payload(payload: &SignaturePayload) -> Result<(), WorkflowError> {
    if payload.value.trim().is_empty() {
        return Err(WorkflowError::InvalidPayload(
            "signature value must not be empty".to_string(),
        ));
    }
    if payload.page < 1 {
        return Err(WorkflowError::InvalidPayload(
            "page numbers start at 1".to_string(),
        ));
    }
    if !payload.x.is_finite() || !payload.y.is_finite() {
        return Err(WorkflowError::InvalidPayload(
            "signature position must be finite".to_string(),
        ));
    }
    if matches!(
        payload.sig_type,
        SignatureType::Drawn | SignatureType::Image
    ) && crate::pdf::decode_image_payload(&payload.value).is_err()
    {
        return Err(WorkflowError::InvalidPayload(
            "signature image must be base64-encoded".to_string(),
        ));
    }
    Ok(())
}

/// Shared guards for accept and reject: ownership (owner path only), signer
/// membership, terminal document, and one response per signer.
fn guard_response(
    txn: &mut dyn crate::store::DocumentTxn,
    document: &Document,
    signer_id: uuid::Uuid,
    requester: Option<uuid::Uuid>,
) -> Result<Signer, WorkflowError> {
    if let Some(requester) = requester {
        if document.owner_id != requester {
            return Err(WorkflowError::PermissionDenied);
        }
    }

    let signer = txn.signer(signer_id)?.ok_or(WorkflowError::SignerNotFound)?;
    if signer.document_id != document.id {
        return Err(WorkflowError::SignerMismatch);
    }

    if status::is_terminal(document.status) {
        return Err(WorkflowError::DocumentClosed {
            status: document.status,
        });
    }
    if signer.status != SignerStatus::Pending {
        return Err(WorkflowError::AlreadyResponded {
            status: signer.status,
        });
    }

    Ok(signer)
}
