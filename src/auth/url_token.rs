/// Tokens embedded in emailed links (account verification, password reset).
/// They share the signing key with bearer tokens but carry a `purpose`, so
/// neither kind decodes as the other. Each one has its own jti; callers that
/// must honour a link only once record it in the revocation cache.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::TokenCodec;
use crate::error::{AppError, AuthError, ConfigError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrlTokenPurpose {
    EmailVerification,
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize)]
struct UrlTokenClaims {
    email: String,
    purpose: UrlTokenPurpose,
    jti: String,
    exp: i64,
}

/// A link token that passed signature, purpose and expiry checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUrlToken {
    pub email: String,
    pub jti: String,
    pub exp: i64,
}

impl VerifiedUrlToken {
    /// Seconds until expiry at `now`, zero once expired
    pub fn remaining_lifetime(&self, now: i64) -> u64 {
        u64::try_from(self.exp - now).unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct UrlTokens {
    codec: TokenCodec,
    ttl: Duration,
}

impl UrlTokens {
    /// # Errors
    /// `ConfigError::InvalidValue` for a non-positive lifetime
    pub fn new(codec: TokenCodec, ttl_seconds: i64) -> Result<Self, AppError> {
        if ttl_seconds <= 0 {
            return Err(ConfigError::InvalidValue("url token expiry must be positive".to_string()).into());
        }

        Ok(Self {
            codec,
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    pub fn create(&self, email: &str, purpose: UrlTokenPurpose) -> Result<String, AppError> {
        self.codec.encode_claims(&UrlTokenClaims {
            email: email.to_string(),
            purpose,
            jti: Uuid::new_v4().to_string(),
            exp: Utc::now().timestamp() + self.ttl.num_seconds(),
        })
    }

    /// # Errors
    /// `InvalidToken` when tampered, expired, or minted for another purpose
    pub fn verify(&self, token: &str, purpose: UrlTokenPurpose) -> Result<VerifiedUrlToken, AppError> {
        let claims = self.codec.decode_claims::<UrlTokenClaims>(token)?;

        if claims.purpose != purpose || Utc::now().timestamp() >= claims.exp {
            return Err(AuthError::InvalidToken.into());
        }

        Ok(VerifiedUrlToken {
            email: claims.email,
            jti: claims.jti,
            exp: claims.exp,
        })
    }
}
