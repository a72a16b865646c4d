//! Best-effort audit trail. Recording must never break the main flow: any
//! store failure is logged and swallowed.

use std::sync::Arc;

use crate::models::AuditLog;
use crate::store::DocumentStore;
use crate::views::ClientMeta;

pub struct AuditRecorder<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> AuditRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn record(&self, document_id: uuid::Uuid, action: String, client: &ClientMeta) {
        let entry = AuditLog {
            id: uuid::Uuid::new_v4(),
            document_id,
            action,
            ip_address: client.ip.to_string(),
            user_agent: client.user_agent.clone(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        if let Err(err) = self.store.append_audit(&entry) {
            warn!("Failed to write audit entry for {}: {}", document_id, err);
        }
    }
}
