//! Signing tokens: the sole credential of an anonymous signer.
//!
//! A token is minted once when the signer is created and never rotated; the
//! PENDING-status check inside the signing transaction is what prevents
//! replay, not token invalidation.

use rand::Rng;

use crate::error::WorkflowError;
use crate::models::Signer;
use crate::store::DocumentStore;

/// Mints an opaque, URL-safe signing token: 64 random bytes (512 bits),
/// unpadded base64.
pub fn issue() -> String {
    base64::encode_config(
        rand::thread_rng()
            .sample_iter(rand::distributions::Standard)
            .take(64)
            .collect::<Vec<u8>>(),
        base64::URL_SAFE_NO_PAD,
    )
}

/// Exact-match lookup of the signer a token belongs to. The resolved signer
/// is the only record the token holder may act on.
pub fn resolve<S: DocumentStore>(store: &S, token: &str) -> Result<Signer, WorkflowError> {
    store
        .find_signer_by_token(token)?
        .ok_or(WorkflowError::TokenInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn tokens_are_long_and_url_safe() {
        let token = issue();
        let raw = base64::decode_config(&token, base64::URL_SAFE_NO_PAD).unwrap();
        assert_eq!(raw.len(), 64);
        assert!(!token.contains(['+', '/', '=']));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(issue()));
        }
    }

    #[test]
    fn unknown_token_is_invalid() {
        let store = MemoryStore::default();
        match resolve(&store, "no-such-token") {
            Err(WorkflowError::TokenInvalid) => {}
            other => panic!("expected TokenInvalid, got {:?}", other),
        }
    }
}
