/// Token codec
///
/// Signs and parses bearer tokens with a shared HMAC secret. Expiry is
/// required structurally but not enforced here: the library's own `exp`
/// check is switched off so that `TokenVerifier` compares against the clock
/// explicitly.

use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::{TokenPayload, UserClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// # Errors
    /// Fails on an empty secret, a non-HMAC algorithm, or non-positive TTLs
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()).into());
        }

        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| ConfigError::InvalidValue(format!("jwt.algorithm '{}'", config.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.algorithm '{}' is not a symmetric algorithm",
                config.algorithm
            ))
            .into());
        }

        if config.access_token_expiry <= 0 || config.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue("token expiry must be positive".to_string()).into());
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: Duration::seconds(config.access_token_expiry),
            refresh_ttl: Duration::seconds(config.refresh_token_expiry),
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a token for `claims` valid for `ttl` from now, with a fresh jti
    pub fn issue(&self, claims: &UserClaims, is_refresh: bool, ttl: Duration) -> Result<String, AppError> {
        let payload = TokenPayload {
            user: claims.clone(),
            exp: Utc::now().timestamp() + ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
            refresh: is_refresh,
        };
        self.encode(&payload)
    }

    pub fn issue_access(&self, claims: &UserClaims) -> Result<String, AppError> {
        self.issue(claims, false, self.access_ttl)
    }

    pub fn issue_refresh(&self, claims: &UserClaims) -> Result<String, AppError> {
        self.issue(claims, true, self.refresh_ttl)
    }

    /// Sign an already-built payload as is
    pub fn encode(&self, payload: &TokenPayload) -> Result<String, AppError> {
        self.encode_claims(payload)
    }

    /// Verify signature and structure. Does not look at the clock.
    ///
    /// # Errors
    /// `InvalidToken` for a bad signature, wrong algorithm, or missing fields
    pub fn decode(&self, token: &str) -> Result<TokenPayload, AppError> {
        self.decode_claims::<TokenPayload>(token)
    }

    pub(crate) fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, AppError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    pub(crate) fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token decode failed");
                AppError::Auth(AuthError::InvalidToken)
            })
    }
}
