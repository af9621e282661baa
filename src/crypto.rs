//! Password hashing for credentials stored at rest.

use argon2::password_hash::{PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password manager that uses Argon2id and PHC string format for hashing.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        );
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Hash `password` unless it is already a PHC hash string.
    pub fn hash_if_plain(&self, password: &str) -> Result<String> {
        if is_phc_hash(password) {
            Ok(password.to_owned())
        } else {
            self.hash_password(password)
        }
    }
}

#[cfg(test)]
impl PasswordManager {
    /// Low-cost parameters for tests.
    pub(crate) fn cheap() -> Self {
        Self {
            params: Params::new(1024, 1, 1, Some(32))
                .expect("valid argon2 params"),
        }
    }
}

/// Whether `value` parses as a PHC string carrying a hash.
pub fn is_phc_hash(value: &str) -> bool {
    PasswordHash::new(value).is_ok_and(|hash| hash.hash.is_some())
}
