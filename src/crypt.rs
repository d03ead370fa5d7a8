//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings, so the salt and the parameters that produced them
//! travel with the hash. Hashing work runs on the blocking pool.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand_core::OsRng;

use crate::{config::AppConfig, errors::AppError};

const ARGON2ID_IDENT: &str = "argon2id";

/// CredentialVerifier
///
/// Hashes new passwords with the configured Argon2id parameters and verifies
/// submitted passwords against stored hashes. A successful verification reports
/// whether the stored hash should be replaced because it was produced with
/// outdated parameters.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    params: Params,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
        )
        .unwrap_or(Self {
            params: Params::DEFAULT,
        })
    }
}

impl CredentialVerifier {
    /// Builds a verifier from memory cost (KiB), iterations and lanes.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
        )
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produces a salted PHC hash of `password`.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let argon2 = self.hasher();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
        })
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
    }

    /// Verifies `password` against `stored`.
    ///
    /// Returns `(true, Some(new_hash))` when the password matches but `stored`
    /// should be upgraded, `(true, None)` when it matches as-is, and
    /// `(false, None)` on mismatch. A malformed stored hash counts as a mismatch.
    pub async fn verify_and_update(
        &self,
        password: &str,
        stored: &str,
    ) -> Result<(bool, Option<String>), AppError> {
        let password_owned = password.to_owned();
        let stored_owned = stored.to_owned();

        let verified = tokio::task::spawn_blocking(move || {
            let parsed = match PasswordHash::new(&stored_owned) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "stored password hash is malformed");
                    return false;
                }
            };
            // Parameters come from the parsed hash, not from this verifier.
            Argon2::default()
                .verify_password(password_owned.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {e}")))?;

        if !verified {
            return Ok((false, None));
        }

        if self.needs_rehash(stored) {
            tracing::debug!("upgrading password hash parameters");
            let updated = self.hash(password).await?;
            return Ok((true, Some(updated)));
        }

        Ok((true, None))
    }

    pub async fn verify(&self, password: &str, stored: &str) -> Result<bool, AppError> {
        let (verified, _) = self.verify_and_update(password, stored).await?;
        Ok(verified)
    }

    /// True when `stored` was not produced by Argon2id v19 with this verifier's parameters.
    pub fn needs_rehash(&self, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return true;
        };
        if parsed.algorithm.as_str() != ARGON2ID_IDENT {
            return true;
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(params) => {
                params.m_cost() != self.params.m_cost()
                    || params.t_cost() != self.params.t_cost()
                    || params.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
