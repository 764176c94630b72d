use std::{fmt, sync::LazyLock};

use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};

use crate::error::StoreError;

/// PasswordHash
///
/// An Argon2id PHC string (`$argon2id$v=19$...`). The only way to obtain one is to hash a
/// plaintext through [`PasswordHash::new`], so a value of this type can never be plaintext.
/// The repository accepts credentials exclusively in this form.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hashes `plaintext` with a fresh random salt.
    pub fn new(plaintext: &str) -> Result<Self, StoreError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| Self(hash.to_string()))
            .map_err(|e| StoreError::Hash(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Never print the hash, even in debug logs.
impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(***)")
    }
}

/// Verifies `plaintext` against a stored PHC string. Comparison is constant-time inside
/// `argon2`; a malformed stored value simply fails verification.
pub fn verify_password(plaintext: &str, stored: &str) -> bool {
    match password_hash::PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

static DUMMY_HASH: LazyLock<Option<PasswordHash>> =
    LazyLock::new(|| PasswordHash::new("worklog-dummy-password").ok());

/// Burns the same amount of work as a real verification. Called on login when the username
/// does not exist so both failure paths take comparable time.
pub fn verify_dummy(plaintext: &str) {
    if let Some(hash) = DUMMY_HASH.as_ref() {
        let _ = verify_password(plaintext, hash.as_str());
    }
}
