/// Access control on top of an admitted token: principal lookup, role
/// gating, and revocation on logout.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::auth::claims::TokenPayload;
use crate::blocklist::RevocationCache;
use crate::error::{AppError, AuthError};
use crate::users::{Role, User, UserStore};

/// Roles allowed on routes any signed-in account may use
pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::User];

/// Membership test against a route's fixed allowed-role set
pub fn require_role(principal: &User, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %principal.id,
            role = %principal.role,
            "Role not permitted for this route"
        );
        Err(AuthError::InsufficientPermission)
    }
}

#[derive(Clone)]
pub struct AccessController {
    users: Arc<dyn UserStore>,
    blocklist: Arc<dyn RevocationCache>,
}

impl AccessController {
    pub fn new(users: Arc<dyn UserStore>, blocklist: Arc<dyn RevocationCache>) -> Self {
        Self { users, blocklist }
    }

    /// Load the principal behind an admitted token
    pub async fn current_principal(&self, payload: &TokenPayload) -> Result<User, AppError> {
        let user_id = payload.user_id()?;
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }

    /// Block the token's jti for whatever lifetime it has left
    pub async fn revoke(&self, payload: &TokenPayload) -> Result<(), AppError> {
        self.revoke_at(payload, Utc::now().timestamp()).await
    }

    pub async fn revoke_at(&self, payload: &TokenPayload, now: i64) -> Result<(), AppError> {
        let ttl = Duration::from_secs(payload.remaining_lifetime(now).max(1));
        self.blocklist.revoke(&payload.jti, ttl).await?;

        tracing::info!(
            jti = %payload.jti,
            user_id = %payload.user.user_id,
            ttl_secs = ttl.as_secs(),
            "Token revoked"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::UserClaims;
    use crate::blocklist::InMemoryBlocklist;
    use crate::users::{InMemoryUserStore, NewUser};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Remembers the TTL of every revocation
    #[derive(Default)]
    struct RecordingCache {
        revoked: Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl RevocationCache for RecordingCache {
        async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), AppError> {
            self.revoked.lock().unwrap().push((jti.to_string(), ttl));
            Ok(())
        }

        async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
            Ok(self.revoked.lock().unwrap().iter().any(|(j, _)| j == jti))
        }
    }

    async fn ttl_for(exp_offset: i64) -> Duration {
        let cache = Arc::new(RecordingCache::default());
        let access = AccessController::new(Arc::new(InMemoryUserStore::new()), cache.clone());
        let now = 1_700_000_000;

        access
            .revoke_at(&payload_for(uuid::Uuid::new_v4().to_string(), now + exp_offset), now)
            .await
            .unwrap();

        let revoked = cache.revoked.lock().unwrap();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].0, "abc123");
        revoked[0].1
    }

    fn user_with_role(role: Role) -> User {
        let mut user = User::from_new(NewUser {
            username: "reader".to_string(),
            email: "a@x.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password_hash: "hash".to_string(),
        });
        user.role = role;
        user
    }

    fn payload_for(user_id: String, exp: i64) -> TokenPayload {
        TokenPayload {
            user: UserClaims {
                email: "a@x.com".to_string(),
                user_id,
                role: None,
            },
            exp,
            jti: "abc123".to_string(),
            refresh: false,
        }
    }

    #[test]
    fn test_require_role() {
        let admin = user_with_role(Role::Admin);
        let user = user_with_role(Role::User);

        assert!(require_role(&admin, ANY_ROLE).is_ok());
        assert!(require_role(&user, ANY_ROLE).is_ok());
        assert!(require_role(&admin, &[Role::Admin]).is_ok());
        assert_eq!(require_role(&user, &[Role::Admin]), Err(AuthError::InsufficientPermission));
        assert_eq!(require_role(&admin, &[]), Err(AuthError::InsufficientPermission));
    }

    #[tokio::test]
    async fn test_current_principal() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = user_with_role(Role::User);
        store.insert(&user).await.unwrap();
        let access = AccessController::new(store, Arc::new(InMemoryBlocklist::new()));

        let found = access
            .current_principal(&payload_for(user.id.to_string(), i64::MAX))
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        let err = access
            .current_principal(&payload_for(uuid::Uuid::new_v4().to_string(), i64::MAX))
            .await
            .unwrap_err();
        assert_eq!(err.auth_kind(), Some(&AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_revoke_blocks_jti() {
        let blocklist = Arc::new(InMemoryBlocklist::new());
        let access = AccessController::new(Arc::new(InMemoryUserStore::new()), blocklist.clone());
        let now = Utc::now().timestamp();

        access
            .revoke_at(&payload_for(uuid::Uuid::new_v4().to_string(), now + 600), now)
            .await
            .unwrap();

        assert!(blocklist.is_revoked("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_revocation_ttl_is_remaining_lifetime() {
        assert_eq!(ttl_for(600).await, Duration::from_secs(600));
        assert_eq!(ttl_for(3600).await, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_revocation_ttl_has_one_second_floor() {
        assert_eq!(ttl_for(0).await, Duration::from_secs(1));
        assert_eq!(ttl_for(-30).await, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_revocation_lapses_with_the_token() {
        let blocklist = Arc::new(InMemoryBlocklist::new());
        let access = AccessController::new(Arc::new(InMemoryUserStore::new()), blocklist.clone());
        let now = Utc::now().timestamp();

        access
            .revoke_at(&payload_for(uuid::Uuid::new_v4().to_string(), now + 1), now)
            .await
            .unwrap();
        assert!(blocklist.is_revoked("abc123").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!blocklist.is_revoked("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoking_an_expired_token_still_records_it() {
        let blocklist = Arc::new(InMemoryBlocklist::new());
        let access = AccessController::new(Arc::new(InMemoryUserStore::new()), blocklist.clone());
        let now = Utc::now().timestamp();

        access
            .revoke_at(&payload_for(uuid::Uuid::new_v4().to_string(), now - 30), now)
            .await
            .unwrap();
        assert!(blocklist.is_revoked("abc123").await.unwrap());
    }
}
