/// Middleware module
///
/// Bearer token admission for protected routes.

mod bearer_auth;

pub use bearer_auth::BearerAuth;
