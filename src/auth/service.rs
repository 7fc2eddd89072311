/// Authentication service
///
/// Orchestrates the credential store, password hasher and token codec for
/// signup, login, refresh, logout, email verification and password reset.
/// Every collaborator is passed in explicitly at construction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::auth::access::AccessController;
use crate::auth::claims::{TokenPayload, UserClaims};
use crate::auth::jwt::TokenCodec;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::url_token::{UrlTokenPurpose, UrlTokens};
use crate::auth::verifier::TokenVerifier;
use crate::blocklist::RevocationCache;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ValidationError};
use crate::users::{NewUser, User, UserStore};
use crate::validators::{is_valid_email, is_valid_profile_field, validate_password_strength};

lazy_static! {
    // Compared against when the email is unknown so both login failures cost a bcrypt round
    static ref DUMMY_HASH: Option<String> = hash_password("timing-equalizer-password").ok();
}

#[derive(Deserialize)]
pub struct SignupData {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Access and refresh tokens issued together at login
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserClaims,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    blocklist: Arc<dyn RevocationCache>,
    codec: TokenCodec,
    access: AccessController,
    url_tokens: UrlTokens,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        blocklist: Arc<dyn RevocationCache>,
        jwt: &JwtSettings,
    ) -> Result<Self, AppError> {
        let codec = TokenCodec::new(jwt)?;
        Ok(Self {
            access: AccessController::new(users.clone(), blocklist.clone()),
            url_tokens: UrlTokens::new(codec.clone(), jwt.url_token_expiry)?,
            users,
            blocklist,
            codec,
        })
    }

    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier::new(self.codec.clone(), self.blocklist.clone())
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// # Errors
    /// - Validation errors for malformed fields or a weak password
    /// - `UserAlreadyExists` when the email is registered
    pub async fn signup(&self, data: SignupData) -> Result<User, AppError> {
        let email = is_valid_email(&data.email)?;
        let username = is_valid_profile_field("username", &data.username)?;
        let first_name = is_valid_profile_field("first_name", &data.first_name)?;
        let last_name = is_valid_profile_field("last_name", &data.last_name)?;
        validate_password_strength(&data.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists.into());
        }

        let password_hash = hash_blocking(data.password).await?;
        let user = User::from_new(NewUser {
            username,
            email,
            first_name,
            last_name,
            password_hash,
        });

        // A concurrent signup can still win the race; the store reports it
        self.users.insert(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// # Errors
    /// `InvalidCredentials` for an unknown email and for a wrong password alike
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let email = is_valid_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = self.users.find_by_email(&email).await?;

        let stored_hash = match &user {
            Some(user) => Some(user.password_hash.clone()),
            None => DUMMY_HASH.clone(),
        };
        let password_ok = match stored_hash {
            Some(hash) => verify_blocking(password.to_string(), hash).await?,
            None => false,
        };

        let user = match user {
            Some(user) if password_ok => user,
            _ => return Err(AuthError::InvalidCredentials.into()),
        };

        let claims = UserClaims::for_user(&user);
        let pair = TokenPair {
            access_token: self.codec.issue_access(&claims)?,
            refresh_token: self.codec.issue_refresh(&claims)?,
            user: claims,
        };

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Mint a new access token from an admitted refresh token. The refresh
    /// token itself stays valid until its own expiry.
    pub fn refresh(&self, payload: &TokenPayload) -> Result<String, AppError> {
        self.refresh_at(payload, Utc::now().timestamp())
    }

    pub fn refresh_at(&self, payload: &TokenPayload, now: i64) -> Result<String, AppError> {
        if !payload.refresh {
            return Err(AuthError::RefreshTokenRequired.into());
        }
        if payload.is_expired_at(now) {
            return Err(AuthError::InvalidToken.into());
        }

        let token = self.codec.issue_access(&payload.user)?;
        tracing::info!(user_id = %payload.user.user_id, "Access token refreshed");
        Ok(token)
    }

    pub async fn logout(&self, payload: &TokenPayload) -> Result<(), AppError> {
        self.access.revoke(payload).await
    }

    pub fn verification_token(&self, email: &str) -> Result<String, AppError> {
        self.url_tokens.create(email, UrlTokenPurpose::EmailVerification)
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AppError> {
        let email = self.url_tokens.verify(token, UrlTokenPurpose::EmailVerification)?.email;

        if !self.users.mark_verified(&email).await? {
            return Err(AuthError::UserNotFound.into());
        }

        tracing::info!("Account verified");
        Ok(())
    }

    /// Returns the account and a reset token, or `None` when nobody has
    /// this email. Callers must answer both cases identically.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<(User, String)>, AppError> {
        let email = match is_valid_email(email) {
            Ok(email) => email,
            Err(_) => return Ok(None),
        };

        match self.users.find_by_email(&email).await? {
            Some(user) => {
                let token = self.url_tokens.create(&user.email, UrlTokenPurpose::PasswordReset)?;
                Ok(Some((user, token)))
            }
            None => Ok(None),
        }
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: String,
        confirm_new_password: &str,
    ) -> Result<(), AppError> {
        let link = self.url_tokens.verify(token, UrlTokenPurpose::PasswordReset)?;
        if self.blocklist.is_revoked(&link.jti).await? {
            tracing::warn!(jti = %link.jti, "Rejected reused password reset link");
            return Err(AuthError::InvalidToken.into());
        }

        if new_password != confirm_new_password {
            return Err(ValidationError::Mismatch("passwords".to_string()).into());
        }
        validate_password_strength(&new_password)?;

        let user = self
            .users
            .find_by_email(&link.email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let password_hash = hash_blocking(new_password).await?;
        if !self.users.update_password(user.id, &password_hash).await? {
            return Err(AuthError::UserNotFound.into());
        }

        // Reset links work once
        let ttl = Duration::from_secs(link.remaining_lifetime(Utc::now().timestamp()).max(1));
        self.blocklist.revoke(&link.jti, ttl).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }
}

// bcrypt runs on the blocking pool
async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))
}
