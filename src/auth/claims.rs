/// Token payload types
///
/// Wire shape:
/// `{"user": {"email", "user_id", "role"?}, "exp", "jti", "refresh"}`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::users::{Role, User};

/// Which kind of bearer token an endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn is_refresh(self) -> bool {
        matches!(self, TokenKind::Refresh)
    }
}

/// User claim set embedded in every token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserClaims {
    pub email: String,
    pub user_id: String,
    /// Snapshot of the role at issuance; may go stale before `exp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl UserClaims {
    pub fn for_user(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            user_id: user.id.to_string(),
            role: Some(user.role),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPayload {
    pub user: UserClaims,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    pub jti: String,
    pub refresh: bool,
}

impl TokenPayload {
    pub fn kind(&self) -> TokenKind {
        if self.refresh {
            TokenKind::Refresh
        } else {
            TokenKind::Access
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// Seconds until expiry at `now`, zero once expired
    pub fn remaining_lifetime(&self, now: i64) -> u64 {
        u64::try_from(self.exp - now).unwrap_or(0)
    }

    /// A malformed id inside a correctly signed token is still an invalid token
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.user.user_id).map_err(|_| AppError::Auth(AuthError::InvalidToken))
    }
}
