//! Argon2id password hashing.
//!
//! Hashing is CPU-bound, so every call runs on the blocking pool.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::warn;

#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("algorithm", &"argon2id")
            .finish()
    }
}

impl PasswordHasher {
    /// Argon2id with the crate's recommended parameters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// # Errors
    /// Returns an error if the parameters are outside Argon2's accepted range.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails or the blocking task panics.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| anyhow!("failed to hash password: {e}"))
        })
        .await
        .context("password hashing task failed")?
    }

    /// Verify a password against a stored PHC string.
    ///
    /// An unparsable stored hash is treated as a mismatch.
    ///
    /// # Errors
    /// Returns an error only if the blocking task panics.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();
        tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
            Ok(parsed) => argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                warn!("Stored password hash is not a valid PHC string: {err}");
                false
            }
        })
        .await
        .context("password verification task failed")
    }

    /// Whether a stored hash was produced with other parameters than the
    /// current ones and should be replaced after a successful login.
    #[must_use]
    pub fn needs_rehash(&self, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        Params::try_from(&parsed).map_or(true, |stored| {
            let current = self.argon2.params();
            stored.m_cost() != current.m_cost()
                || stored.t_cost() != current.t_cost()
                || stored.p_cost() != current.p_cost()
        })
    }

    /// Spend the same work as a verification and discard the result.
    ///
    /// Used when the account does not exist so the response time does not
    /// reveal it.
    pub async fn equalize(&self, password: &str) {
        if let Err(err) = self.hash(password).await {
            warn!("Failed to run dummy password hash: {err:#}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::with_params(8, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("Abc123!@").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Abc123!@", &hash).await.unwrap());
        assert!(!hasher.verify("abc123!@", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let hasher = cheap();
        let first = hasher.hash("Abc123!@").await.unwrap();
        let second = hasher.hash("Abc123!@").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn garbage_hash_is_a_mismatch() {
        let hasher = cheap();
        assert!(!hasher.verify("Abc123!@", "not-a-phc-string").await.unwrap());
    }

    #[tokio::test]
    async fn rehash_follows_parameter_changes() {
        let old = cheap();
        let hash = old.hash("Abc123!@").await.unwrap();
        assert!(!old.needs_rehash(&hash));
        let stronger = PasswordHasher::with_params(16, 2, 1).unwrap();
        assert!(stronger.needs_rehash(&hash));
        assert!(stronger.needs_rehash("not-a-phc-string"));
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(PasswordHasher::with_params(0, 0, 0).is_err());
    }
}
