//! Signed, expiring reply tokens.
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! The chosen outcome is part of the signed claims, so each of the three links
//! in a check-in email is its own token and one cannot be replayed as another.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::checkins::{CheckInValue, FIRST_RESPONSE_DAY, LAST_RESPONSE_DAY};

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_TTL_DAYS: i64 = 21;

/// What a token authorizes. Note tokens are minted by the landing page and
/// only accepted by the note endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Reply,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub assessment_id: Uuid,
    pub day: i32,
    pub value: Option<CheckInValue>,
    pub purpose: TokenPurpose,
}

impl TokenPayload {
    pub fn reply(assessment_id: Uuid, day: i32, value: CheckInValue) -> Self {
        Self {
            assessment_id,
            day,
            value: Some(value),
            purpose: TokenPurpose::Reply,
        }
    }

    /// Narrower token for the follow-up note form, bound to the same day and outcome.
    pub fn note_for(&self) -> Self {
        Self {
            purpose: TokenPurpose::Note,
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "a")]
    assessment_id: Uuid,
    #[serde(rename = "d")]
    day: i32,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    value: Option<CheckInValue>,
    #[serde(rename = "p")]
    purpose: TokenPurpose,
    #[serde(rename = "x")]
    expires_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token secret must be at least {MIN_SECRET_LEN} bytes")]
    SecretTooShort,
    #[error("token ttl must be positive")]
    InvalidTtl,
}

#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::SecretTooShort);
        }
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::SecretTooShort)?;
        Ok(Self { mac, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, payload: &TokenPayload) -> String {
        self.sign_at(payload, Utc::now())
    }

    pub fn sign_at(&self, payload: &TokenPayload, now: DateTime<Utc>) -> String {
        let claims = Claims {
            assessment_id: payload.assessment_id,
            day: payload.day,
            value: payload.value,
            purpose: payload.purpose,
            expires_at: (now + self.ttl).timestamp(),
        };
        // Serializing a flat struct of plain fields cannot fail; an empty body
        // would simply never verify.
        let body = serde_json::to_vec(&claims).unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(&body);
        let signature = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    pub fn verify(&self, token: &str) -> Option<TokenPayload> {
        self.verify_at(token, Utc::now())
    }

    /// Returns the payload only when the signature matches and the token has
    /// not expired. Every failure collapses to `None`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<TokenPayload> {
        let (body_b64, signature_b64) = token.trim().split_once('.')?;
        let body = URL_SAFE_NO_PAD.decode(body_b64).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&body);
        mac.verify_slice(&signature).ok()?;

        let claims: Claims = serde_json::from_slice(&body).ok()?;
        if now.timestamp() >= claims.expires_at {
            return None;
        }
        if !(FIRST_RESPONSE_DAY..=LAST_RESPONSE_DAY).contains(&claims.day) {
            return None;
        }

        Some(TokenPayload {
            assessment_id: claims.assessment_id,
            day: claims.day,
            value: claims.value,
            purpose: claims.purpose,
        })
    }

    /// Verify and additionally require a purpose and a bound outcome.
    pub fn verify_for(&self, token: &str, purpose: TokenPurpose) -> Option<TokenPayload> {
        self.verify_for_at(token, purpose, Utc::now())
    }

    pub fn verify_for_at(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Option<TokenPayload> {
        self.verify_at(token, now)
            .filter(|payload| payload.purpose == purpose && payload.value.is_some())
    }
}
