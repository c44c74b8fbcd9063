//! Credential and bearer-token primitives: salted SHA-256 password digests
//! and HMAC-SHA256 signed tokens of the form `user_id.expiry.signature`.
//! Tokens are stateless; there is no session store to invalidate.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::user::UserId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordRecord {
    pub salt: String,
    pub digest: String,
}

pub fn hash_password(password: &str) -> PasswordRecord {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = encode_hex(&salt_bytes);
    let digest = password_digest(&salt, password);
    PasswordRecord { salt, digest }
}

pub fn verify_password(password: &str, salt: &str, digest: &str) -> bool {
    password_digest(salt, password) == digest
}

fn password_digest(salt: &str, password: &str) -> String {
    sha256_hex(format!("{salt}:{password}").as_bytes())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_token(
    secret: &[u8],
    user_id: &UserId,
    ttl: Duration,
    now: DateTime<Utc>,
) -> String {
    let expires_at = (now + ttl).timestamp();
    let material = format!("{}.{expires_at}", user_id.0.simple());
    let signature = hmac_hex(secret, material.as_bytes());
    format!("{material}.{signature}")
}

pub fn verify_token(
    secret: &[u8],
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, AuthError> {
    let mut parts = token.split('.');
    let (user_part, expiry_part, signature) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(expiry), Some(signature), None) => (user, expiry, signature),
            _ => return Err(AuthError::Malformed),
        };

    let user_id = Uuid::parse_str(user_part).map_err(|_| AuthError::Malformed)?;
    let expiry_unix: i64 = expiry_part.parse().map_err(|_| AuthError::Malformed)?;
    let expires_at =
        Utc.timestamp_opt(expiry_unix, 0).single().ok_or(AuthError::Malformed)?;

    let material = format!("{user_part}.{expiry_part}");
    if hmac_hex(secret, material.as_bytes()) != signature {
        return Err(AuthError::BadSignature);
    }

    if expires_at <= now {
        return Err(AuthError::Expired(expires_at));
    }

    Ok(TokenClaims { user_id: UserId(user_id), expires_at })
}

pub fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(payload),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

pub fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    encode_hex(digest.as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use crate::domain::user::UserId;

    use super::{hash_password, issue_token, verify_password, verify_token, AuthError};

    const SECRET: &[u8] = b"test-signing-secret";

    #[test]
    fn password_verifies_against_its_own_record() {
        let record = hash_password("correct horse battery staple");

        assert!(verify_password("correct horse battery staple", &record.salt, &record.digest));
        assert!(!verify_password("wrong password", &record.salt, &record.digest));
    }

    #[test]
    fn identical_passwords_produce_distinct_records() {
        let first = hash_password("same-password");
        let second = hash_password("same-password");

        assert_ne!(first.salt, second.salt);
        assert_ne!(first.digest, second.digest);
    }

    #[test]
    fn issued_token_round_trips() {
        let now = Utc::now();
        let user_id = UserId(Uuid::new_v4());
        let token = issue_token(SECRET, &user_id, Duration::hours(8), now);

        let claims = verify_token(SECRET, &token, now).expect("fresh token must verify");

        assert_eq!(claims.user_id, user_id);
        assert!(claims.expires_at > now);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued_at = Utc::now() - Duration::hours(9);
        let user_id = UserId(Uuid::new_v4());
        let token = issue_token(SECRET, &user_id, Duration::hours(8), issued_at);

        let error = verify_token(SECRET, &token, Utc::now()).expect_err("token must be expired");

        assert!(matches!(error, AuthError::Expired(_)));
    }

    #[test]
    fn tampered_token_fails_signature_check() {
        let now = Utc::now();
        let token = issue_token(SECRET, &UserId(Uuid::new_v4()), Duration::hours(8), now);
        let other = issue_token(SECRET, &UserId(Uuid::new_v4()), Duration::hours(8), now);

        let (body, _) = token.rsplit_once('.').expect("token has a signature part");
        let (_, foreign_signature) = other.rsplit_once('.').expect("token has a signature part");
        let forged = format!("{body}.{foreign_signature}");

        assert_eq!(verify_token(SECRET, &forged, now), Err(AuthError::BadSignature));
    }

    #[test]
    fn wrong_secret_fails_signature_check() {
        let now = Utc::now();
        let token = issue_token(SECRET, &UserId(Uuid::new_v4()), Duration::hours(8), now);

        assert_eq!(
            verify_token(b"another-secret", &token, now),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn garbage_tokens_are_malformed() {
        let now = Utc::now();
        assert_eq!(verify_token(SECRET, "", now), Err(AuthError::Malformed));
        assert_eq!(verify_token(SECRET, "a.b", now), Err(AuthError::Malformed));
        assert_eq!(
            verify_token(SECRET, "not-a-uuid.12345.deadbeef", now),
            Err(AuthError::Malformed)
        );
    }
}
