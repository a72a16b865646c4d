#[derive(DbEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    PartiallySigned,
    Signed,
    Rejected,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::PartiallySigned => "PARTIALLY_SIGNED",
            Self::Signed => "SIGNED",
            Self::Rejected => "REJECTED",
        })
    }
}

#[derive(DbEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignerStatus {
    Pending,
    Signed,
    Rejected,
}

impl std::fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Signed => "SIGNED",
            Self::Rejected => "REJECTED",
        })
    }
}

#[derive(DbEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureType {
    Typed,
    Drawn,
    Image,
}

table! {
    documents (id) {
        id -> Uuid,
        owner_id -> Uuid,
        original_url -> Varchar,
        signed_url -> Nullable<Varchar>,
        status -> crate::schema::DocumentStatusMapping,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    signers (id) {
        id -> Uuid,
        document_id -> Uuid,
        email -> Varchar,
        token -> Varchar,
        status -> crate::schema::SignerStatusMapping,
        signed_at -> Nullable<Timestamp>,
        rejection_reason -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

table! {
    signatures (id) {
        id -> Uuid,
        document_id -> Uuid,
        signer_id -> Uuid,
        sig_type -> crate::schema::SignatureTypeMapping,
        value -> Text,
        x -> Float8,
        y -> Float8,
        page -> Int4,
        created_at -> Timestamp,
    }
}

table! {
    audit_log (id) {
        id -> Uuid,
        document_id -> Uuid,
        action -> Varchar,
        ip_address -> Varchar,
        user_agent -> Varchar,
        created_at -> Timestamp,
    }
}

joinable!(signers -> documents (document_id));
joinable!(signatures -> documents (document_id));
joinable!(signatures -> signers (signer_id));
joinable!(audit_log -> documents (document_id));

allow_tables_to_appear_in_same_query!(
    documents,
    signers,
    signatures,
    audit_log,
);
