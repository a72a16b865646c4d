//! Bearer session tokens for document owners. The token carries the owner's
//! UUID, an expiry timestamp, and an HMAC over both, in the same shape as
//! the signed file keys.

use hmac::Mac;

type HmacSha512 = hmac::Hmac<sha2::Sha512>;

pub fn issue_session(user_id: uuid::Uuid, key: &[u8]) -> String {
    let expiry = (chrono::Utc::now() + chrono::Duration::hours(24))
        .timestamp()
        .to_string();

    let mut mac = HmacSha512::new_from_slice(key).unwrap();
    mac.update(format!("{};{}", user_id, expiry).as_bytes());
    let code_bytes = base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD);

    format!("{};{};{}", user_id, expiry, code_bytes)
}

pub fn verify_session(token: &str, key: &[u8]) -> Option<uuid::Uuid> {
    let mut parts = token.split(';').collect::<Vec<_>>();
    if parts.len() != 3 {
        return None;
    }

    let code = parts.pop().unwrap();
    let expiry_str = parts.pop().unwrap();
    let user_str = parts.pop().unwrap();

    let user_id = uuid::Uuid::parse_str(user_str).ok()?;
    let expiry = expiry_str.parse::<i64>().ok()?;
    let code_bytes = base64::decode_config(code, base64::URL_SAFE_NO_PAD).ok()?;

    let mut mac = HmacSha512::new_from_slice(key).unwrap();
    mac.update(format!("{};{}", user_str, expiry_str).as_bytes());
    mac.verify_slice(&code_bytes).ok()?;

    if expiry < chrono::Utc::now().timestamp() {
        return None;
    }

    Some(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"fedcba9876543210fedcba9876543210";

    #[test]
    fn sessions_round_trip() {
        let user = uuid::Uuid::new_v4();
        let token = issue_session(user, KEY);
        assert_eq!(verify_session(&token, KEY), Some(user));
    }

    #[test]
    fn wrong_key_rejected() {
        let token = issue_session(uuid::Uuid::new_v4(), KEY);
        assert_eq!(verify_session(&token, b"another key entirely..........."), None);
    }

    #[test]
    fn tampered_user_rejected() {
        let token = issue_session(uuid::Uuid::new_v4(), KEY);
        let mut parts = token.splitn(2, ';');
        let _user = parts.next().unwrap();
        let rest = parts.next().unwrap();
        let forged = format!("{};{}", uuid::Uuid::new_v4(), rest);
        assert_eq!(verify_session(&forged, KEY), None);
    }

    #[test]
    fn expired_session_rejected() {
        let user = uuid::Uuid::new_v4();
        let expiry = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp();
        let mut mac = HmacSha512::new_from_slice(KEY).unwrap();
        mac.update(format!("{};{}", user, expiry).as_bytes());
        let code = base64::encode_config(mac.finalize().into_bytes(), base64::URL_SAFE_NO_PAD);
        let token = format!("{};{};{}", user, expiry, code);
        assert_eq!(verify_session(&token, KEY), None);
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(verify_session("not a token", KEY), None);
        assert_eq!(verify_session("a;b;c", KEY), None);
    }
}
