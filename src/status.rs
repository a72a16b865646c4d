//! The document status aggregation rules.
//!
//! A document's status is a pure function of its signers' statuses. Every
//! signer mutation recomputes it inside the same transaction, from the
//! post-write signer set, so two concurrent responses can never both derive
//! the aggregate from a stale list.

use crate::schema::{DocumentStatus, SignerStatus};

/// Derives the document status from the full signer set, order insensitive.
///
/// Precedence: a single rejection closes the whole document; a non-empty,
/// fully signed set completes it; any progress short of that is partial;
/// everything else (including an empty set) stays pending.
pub fn recompute_document_status(signers: &[SignerStatus]) -> DocumentStatus {
    if signers.iter().any(|s| *s == SignerStatus::Rejected) {
        return DocumentStatus::Rejected;
    }

    let signed = signers.iter().filter(|s| **s == SignerStatus::Signed).count();
    if !signers.is_empty() && signed == signers.len() {
        DocumentStatus::Signed
    } else if signed > 0 {
        DocumentStatus::PartiallySigned
    } else {
        DocumentStatus::Pending
    }
}

/// Whether a document in this status accepts further signer mutations.
/// There is no un-rejecting a document.
pub fn is_terminal(status: DocumentStatus) -> bool {
    status == DocumentStatus::Rejected
}
