//! Tokens and credentials
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets.
//! Password reset tokens are random hex strings; only their SHA-256 digest is
//! stored.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::entity::admin::{self, AdminRole};
use crate::error::AppError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token encoding failed: {0}")]
    Encode(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(msg) => AppError::Internal(format!("token signing failed: {}", msg)),
            _ => AppError::Unauthorized("Invalid or expired token".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Admin id
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signing keys and lifetimes for both token kinds
pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            access_ttl: Duration::seconds(config.access_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_ttl_secs),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issue(&self, kind: TokenKind, admin: &admin::Model) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: admin.id,
            username: admin.username.clone(),
            email: admin.email.clone(),
            role: admin.role,
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
        };
        self.sign(kind, &claims)
    }

    /// Re-sign existing claims with a fresh lifetime.
    pub fn reissue(&self, kind: TokenKind, claims: &Claims) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            iat: now.timestamp(),
            exp: (now + self.ttl(kind)).timestamp(),
            ..claims.clone()
        };
        self.sign(kind, &claims)
    }

    fn sign(&self, kind: TokenKind, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Malformed hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Fresh reset token (64 hex chars) and the digest to store for it.
pub fn new_reset_token() -> (String, String) {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    let token = hex::encode(bytes);
    let digest = hash_reset_token(&token);
    (token, digest)
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SPECIAL: &[u8] = b"!@#$%^&*";

/// Random 12-character password satisfying the password policy.
pub fn temporary_password() -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();

    let mut chars: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL]
        .iter()
        .map(|set| set[rng.gen_range(0..set.len())])
        .collect();
    while chars.len() < 12 {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check_password_policy;

    fn admin() -> admin::Model {
        let now = Utc::now();
        admin::Model {
            id: Uuid::new_v4(),
            username: "clerk".to_string(),
            email: "clerk@uni.edu".to_string(),
            password: String::new(),
            role: AdminRole::SubAdmin,
            reset_token: None,
            reset_token_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_token_round_trip() {
        let keys = TokenKeys::new(&AuthConfig::default());
        let admin = admin();
        let token = keys.issue(TokenKind::Access, &admin).unwrap();
        let claims = keys.verify(TokenKind::Access, &token).unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.role, AdminRole::SubAdmin);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn kinds_use_separate_secrets() {
        let keys = TokenKeys::new(&AuthConfig::default());
        let token = keys.issue(TokenKind::Refresh, &admin()).unwrap();
        assert!(matches!(keys.verify(TokenKind::Access, &token), Err(TokenError::Invalid(_))));
        assert!(keys.verify(TokenKind::Refresh, &token).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AuthConfig {
            access_ttl_secs: -3600,
            ..AuthConfig::default()
        };
        let keys = TokenKeys::new(&config);
        let token = keys.issue(TokenKind::Access, &admin()).unwrap();
        assert_eq!(keys.verify(TokenKind::Access, &token), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let keys = TokenKeys::new(&AuthConfig::default());
        assert!(matches!(keys.verify(TokenKind::Access, "abc.def.ghi"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("Secret#123", 4).unwrap();
        assert!(verify_password("Secret#123", &hash));
        assert!(!verify_password("secret#123", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn reset_token_digest_matches() {
        let (token, digest) = new_reset_token();
        assert_eq!(token.len(), 64);
        assert_eq!(digest, hash_reset_token(&token));
        assert_ne!(digest, token);
    }

    #[test]
    fn temporary_passwords_pass_policy() {
        for _ in 0..50 {
            let password = temporary_password();
            assert_eq!(password.len(), 12);
            assert!(check_password_policy(&password).is_ok(), "{}", password);
        }
    }
}
