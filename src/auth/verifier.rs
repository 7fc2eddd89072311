/// Bearer token verification
///
/// Runs on every protected request:
/// extract bearer -> decode (signature, structure) -> expiry -> revocation
/// -> token kind -> admitted. The first failing step rejects the request.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::claims::{TokenKind, TokenPayload};
use crate::auth::jwt::TokenCodec;
use crate::blocklist::RevocationCache;
use crate::error::{AppError, AuthError};

/// Pull the credential out of an `Authorization: Bearer <token>` header value
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[derive(Clone)]
pub struct TokenVerifier {
    codec: TokenCodec,
    blocklist: Arc<dyn RevocationCache>,
}

impl TokenVerifier {
    pub fn new(codec: TokenCodec, blocklist: Arc<dyn RevocationCache>) -> Self {
        Self { codec, blocklist }
    }

    /// Verify the raw `Authorization` header value against the clock
    pub async fn verify(
        &self,
        authorization: Option<&str>,
        required: TokenKind,
    ) -> Result<TokenPayload, AppError> {
        self.verify_at(authorization, required, Utc::now().timestamp()).await
    }

    pub async fn verify_at(
        &self,
        authorization: Option<&str>,
        required: TokenKind,
        now: i64,
    ) -> Result<TokenPayload, AppError> {
        let token = authorization
            .and_then(extract_bearer)
            .ok_or(AuthError::MissingToken)?;

        let payload = self.codec.decode(token)?;

        if payload.is_expired_at(now) {
            tracing::debug!(jti = %payload.jti, "Rejected expired token");
            return Err(AuthError::InvalidToken.into());
        }

        // Cache errors propagate: an unreachable blocklist must not admit
        if self.blocklist.is_revoked(&payload.jti).await? {
            tracing::warn!(jti = %payload.jti, user_id = %payload.user.user_id, "Rejected revoked token");
            return Err(AuthError::RevokedToken.into());
        }

        match (required, payload.kind()) {
            (TokenKind::Access, TokenKind::Refresh) => Err(AuthError::AccessTokenRequired.into()),
            (TokenKind::Refresh, TokenKind::Access) => Err(AuthError::RefreshTokenRequired.into()),
            _ => Ok(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::UserClaims;
    use crate::blocklist::InMemoryBlocklist;
    use crate::configuration::JwtSettings;
    use crate::error::CacheError;
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 172800,
            url_token_expiry: 86400,
        })
        .unwrap()
    }

    fn claims() -> UserClaims {
        UserClaims {
            email: "a@x.com".to_string(),
            user_id: uuid::Uuid::new_v4().to_string(),
            role: None,
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    async fn rejection(verifier: &TokenVerifier, header: Option<&str>, kind: TokenKind) -> AuthError {
        verifier
            .verify(header, kind)
            .await
            .expect_err("token should be rejected")
            .auth_kind()
            .cloned()
            .expect("rejection should be an auth error")
    }

    struct UnreachableCache;

    #[async_trait]
    impl RevocationCache for UnreachableCache {
        async fn revoke(&self, _jti: &str, _ttl: StdDuration) -> Result<(), AppError> {
            Err(CacheError::Unavailable("down".to_string()).into())
        }

        async fn is_revoked(&self, _jti: &str) -> Result<bool, AppError> {
            Err(CacheError::Unavailable("down".to_string()).into())
        }
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("bearer   abc "), Some("abc"));
        assert_eq!(extract_bearer("Bearer"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(extract_bearer("BearerToken"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[tokio::test]
    async fn test_admits_matching_kind() {
        let codec = codec();
        let verifier = TokenVerifier::new(codec.clone(), Arc::new(InMemoryBlocklist::new()));
        let claims = claims();

        let access = codec.issue_access(&claims).unwrap();
        let refresh = codec.issue_refresh(&claims).unwrap();

        let payload = verifier.verify(Some(bearer(&access).as_str()), TokenKind::Access).await.unwrap();
        assert!(!payload.refresh);
        assert_eq!(payload.user, claims);

        let payload = verifier.verify(Some(bearer(&refresh).as_str()), TokenKind::Refresh).await.unwrap();
        assert!(payload.refresh);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header() {
        let verifier = TokenVerifier::new(codec(), Arc::new(InMemoryBlocklist::new()));

        assert_eq!(rejection(&verifier, None, TokenKind::Access).await, AuthError::MissingToken);
        assert_eq!(
            rejection(&verifier, Some("Basic abc"), TokenKind::Access).await,
            AuthError::MissingToken
        );
        assert_eq!(
            rejection(&verifier, Some("Bearer not.a.token"), TokenKind::Access).await,
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_kind_mismatch_never_admits() {
        let codec = codec();
        let verifier = TokenVerifier::new(codec.clone(), Arc::new(InMemoryBlocklist::new()));
        let claims = claims();

        let access = bearer(&codec.issue_access(&claims).unwrap());
        let refresh = bearer(&codec.issue_refresh(&claims).unwrap());

        assert_eq!(
            rejection(&verifier, Some(refresh.as_str()), TokenKind::Access).await,
            AuthError::AccessTokenRequired
        );
        assert_eq!(
            rejection(&verifier, Some(access.as_str()), TokenKind::Refresh).await,
            AuthError::RefreshTokenRequired
        );
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let codec = codec();
        let verifier = TokenVerifier::new(codec.clone(), Arc::new(InMemoryBlocklist::new()));
        let expired = codec.issue(&claims(), false, chrono::Duration::seconds(-1)).unwrap();

        assert_eq!(
            rejection(&verifier, Some(bearer(&expired).as_str()), TokenKind::Access).await,
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_expiry_is_checked_against_given_clock() {
        let codec = codec();
        let verifier = TokenVerifier::new(codec.clone(), Arc::new(InMemoryBlocklist::new()));
        let payload = TokenPayload {
            user: claims(),
            exp: 1_000,
            jti: "fixed".to_string(),
            refresh: false,
        };
        let header = bearer(&codec.encode(&payload).unwrap());

        assert!(verifier.verify_at(Some(header.as_str()), TokenKind::Access, 999).await.is_ok());
        assert!(verifier.verify_at(Some(header.as_str()), TokenKind::Access, 1_000).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_jti_is_rejected_until_entry_expires() {
        let codec = codec();
        let blocklist = Arc::new(InMemoryBlocklist::new());
        let verifier = TokenVerifier::new(codec.clone(), blocklist.clone());
        let payload = TokenPayload {
            user: claims(),
            exp: Utc::now().timestamp() + 3600,
            jti: "abc123".to_string(),
            refresh: false,
        };
        let header = bearer(&codec.encode(&payload).unwrap());

        blocklist.revoke("abc123", StdDuration::from_millis(100)).await.unwrap();
        assert_eq!(
            rejection(&verifier, Some(header.as_str()), TokenKind::Access).await,
            AuthError::RevokedToken
        );

        tokio::time::sleep(StdDuration::from_millis(150)).await;
        assert!(verifier.verify(Some(header.as_str()), TokenKind::Access).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_is_checked_before_kind() {
        let codec = codec();
        let blocklist = Arc::new(InMemoryBlocklist::new());
        let verifier = TokenVerifier::new(codec.clone(), blocklist.clone());
        let refresh = codec.issue_refresh(&claims()).unwrap();
        let jti = codec.decode(&refresh).unwrap().jti;

        blocklist.revoke(&jti, StdDuration::from_secs(60)).await.unwrap();
        assert_eq!(
            rejection(&verifier, Some(bearer(&refresh).as_str()), TokenKind::Access).await,
            AuthError::RevokedToken
        );
    }

    #[tokio::test]
    async fn test_cache_failure_rejects_without_admitting() {
        let codec = codec();
        let verifier = TokenVerifier::new(codec.clone(), Arc::new(UnreachableCache));
        let access = codec.issue_access(&claims()).unwrap();

        let err = verifier.verify(Some(bearer(&access).as_str()), TokenKind::Access).await.unwrap_err();
        assert!(matches!(err, AppError::Cache(_)));
    }
}
