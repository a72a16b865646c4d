use crate::schema::*;

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = documents)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: uuid::Uuid,
    pub owner_id: uuid::Uuid,
    pub original_url: String,
    pub signed_url: Option<String>,
    pub status: DocumentStatus,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl Document {
    pub fn new(owner_id: uuid::Uuid, original_url: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id,
            original_url,
            signed_url: None,
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = signers)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub email: String,
    pub token: String,
    pub status: SignerStatus,
    pub signed_at: Option<chrono::NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

impl Signer {
    pub fn new(document_id: uuid::Uuid, email: String, token: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            document_id,
            email,
            token,
            status: SignerStatus::Pending,
            signed_at: None,
            rejection_reason: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = signatures)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub signer_id: uuid::Uuid,
    pub sig_type: SignatureType,
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub page: i32,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = audit_log)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub action: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: chrono::NaiveDateTime,
}
