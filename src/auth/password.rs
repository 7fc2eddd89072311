/// Password Hashing and Verification
///
/// bcrypt with a fixed work factor. Plaintext never leaves these functions
/// and is never logged.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::AppError;

/// Work factor for new hashes (bcrypt's default, 12)
pub const HASH_COST: u32 = DEFAULT_COST;

/// Hash a password using bcrypt
///
/// # Errors
/// Only if bcrypt itself fails, which it does not for valid UTF-8 input
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash. A malformed hash verifies as false.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}
