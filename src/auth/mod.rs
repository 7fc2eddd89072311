/// Authentication module
///
/// Token issuance and verification, password hashing, revocation on logout,
/// role gating, and the flows that tie them together.

mod access;
mod claims;
mod jwt;
mod password;
mod service;
mod url_token;
mod verifier;

pub use access::{require_role, AccessController, ANY_ROLE};
pub use claims::{TokenKind, TokenPayload, UserClaims};
pub use jwt::TokenCodec;
pub use password::{hash_password, verify_password, HASH_COST};
pub use service::{AuthService, SignupData, TokenPair};
pub use url_token::{UrlTokenPurpose, UrlTokens, VerifiedUrlToken};
pub use verifier::{extract_bearer, TokenVerifier};
