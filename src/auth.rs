//! Session tokens and credential lookup.
//!
//! The game core only ever sees the username recovered from a token; how the
//! user proved who they are stays in this module.
//!
//! Token format: `base64url(json claims).base64url(hmac_sha256(json claims))`.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: [u8; 32],
    max_age: Duration,
}

impl TokenSigner {
    pub fn new(key: [u8; 32], max_age: Duration) -> Self { Self { key, max_age } }

    pub fn issue(&self, username: &str) -> String {
        self.issue_at(username, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, username: &str, at: OffsetDateTime) -> String {
        let claims = Claims { sub: username.to_string(), iat: at.unix_timestamp() };
        // Serializing two plain fields cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let part1 = URL_SAFE_NO_PAD.encode(&payload);
        let part2 = URL_SAFE_NO_PAD.encode(self.mac(&payload).finalize().into_bytes());
        format!("{}.{}", part1, part2)
    }

    /// Returns the username the token was issued for.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (p1, p2) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.decode(p1).map_err(|_| AuthError::Malformed)?;
        let sig = URL_SAFE_NO_PAD.decode(p2).map_err(|_| AuthError::Malformed)?;
        self.mac(&payload).verify_slice(&sig).map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;
        let age = OffsetDateTime::now_utc().unix_timestamp() - claims.iat;
        if age < 0 || age as u64 > self.max_age.as_secs() {
            return Err(AuthError::Expired);
        }
        Ok(claims.sub)
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("hmac accepts keys of any length");
        mac.update(data);
        mac
    }
}

/// Username -> password table for the login endpoint.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    /// Parses `name:pass,name:pass`. Entries without a colon are skipped.
    pub fn parse(list: &str) -> Self {
        let users = list
            .split(',')
            .filter_map(|entry| entry.trim().split_once(':'))
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, pass)| (name.to_string(), pass.to_string()))
            .collect();
        Self { users }
    }

    pub fn dev_defaults() -> Self { Self::parse("player1:pass123,player2:pass456") }

    pub fn check(&self, username: &str, password: &str) -> bool {
        self.users.get(username).map(|p| p == password).unwrap_or(false)
    }

    pub fn len(&self) -> usize { self.users.len() }

    pub fn is_empty(&self) -> bool { self.users.is_empty() }
}
