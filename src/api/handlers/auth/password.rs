//! Argon2id password hashing.
//!
//! Hashing and verification are CPU bound and run on the blocking pool.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// Verified against when the account does not exist, so an unknown email costs
// the same as a wrong password.
const DUMMY_PASSWORD: &str = "lexicard-dummy-password";

#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Passwords {
    /// # Errors
    /// Returns an error if the dummy hash cannot be computed.
    pub fn new(params: Params) -> Result<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, DUMMY_PASSWORD)?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Argon2id with the crate's default cost parameters.
    ///
    /// # Errors
    /// Returns an error if the dummy hash cannot be computed.
    pub fn with_defaults() -> Result<Self> {
        Self::new(Params::default())
    }

    /// Produce a PHC string for `password`.
    ///
    /// # Errors
    /// Returns an error if hashing fails or the blocking task panics.
    pub async fn hash(&self, password: String) -> Result<String> {
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || hash_with(&argon2, &password))
            .await
            .context("password hashing task failed")?
    }

    /// Check `password` against `hash`. With no hash, a dummy verification still runs
    /// and the result is always `false`.
    ///
    /// # Errors
    /// Returns an error if the blocking task panics.
    pub async fn verify(&self, password: String, hash: Option<String>) -> Result<bool> {
        let argon2 = self.argon2.clone();
        let (stored, known) = match hash {
            Some(hash) => (hash, true),
            None => (self.dummy_hash.clone(), false),
        };
        let matches = tokio::task::spawn_blocking(move || verify_with(&argon2, &password, &stored))
            .await
            .context("password verification task failed")?;
        Ok(known && matches)
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn verify_with(argon2: &Argon2<'_>, password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .is_ok_and(|parsed| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
pub(crate) fn fast() -> Passwords {
    // Minimum cost keeps the test suite quick.
    let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap();
    Passwords::new(params).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() -> Result<()> {
        let passwords = fast();
        let hash = passwords.hash("correct horse".to_string()).await?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify("correct horse".to_string(), Some(hash.clone())).await?);
        assert!(!passwords.verify("wrong horse".to_string(), Some(hash)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn hashes_are_salted() -> Result<()> {
        let passwords = fast();
        let first = passwords.hash("same".to_string()).await?;
        let second = passwords.hash("same".to_string()).await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn missing_hash_never_verifies() -> Result<()> {
        let passwords = fast();
        assert!(!passwords.verify(DUMMY_PASSWORD.to_string(), None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_is_a_mismatch() -> Result<()> {
        let passwords = fast();
        assert!(!passwords.verify("anything".to_string(), Some("not-a-phc".to_string())).await?);
        Ok(())
    }
}
