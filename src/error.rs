use crate::schema::{DocumentStatus, SignerStatus};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("constraint violated: {0}")]
    Constraint(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no object stored at {0}")]
    NotFound(String),
}

/// The caller-visible error taxonomy of the signing workflow. Every variant
/// maps onto one HTTP status in the view layer; state conflicts carry the
/// current status so the caller learns why the action is non-retriable.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid email address(es): {}", .0.join(", "))]
    InvalidEmails(Vec<String>),
    #[error("already signer(s) on this document: {}", .0.join(", "))]
    DuplicateSigners(Vec<String>),
    #[error("rejection reason is required (min {min} characters)")]
    ReasonTooShort { min: usize },
    #[error("access denied")]
    PermissionDenied,
    #[error("document not found")]
    DocumentNotFound,
    #[error("signer not found")]
    SignerNotFound,
    #[error("signer does not belong to this document")]
    SignerMismatch,
    #[error("invalid or expired token")]
    TokenInvalid,
    #[error("signer has already responded, status is {status}")]
    AlreadyResponded { status: SignerStatus },
    #[error("document is closed, status is {status}")]
    DocumentClosed { status: DocumentStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("object storage failure: {0}")]
    Storage(#[from] StorageError),
}

// Lets diesel transactions carry WorkflowError out of the closure.
impl From<diesel::result::Error> for WorkflowError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Store(StoreError::Diesel(err))
    }
}
