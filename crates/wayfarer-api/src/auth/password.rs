/// Password hashing and verification using Argon2id
///
/// Hashes are stored as PHC strings, so the salt and cost parameters travel
/// with the hash and verification works across parameter changes.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use std::sync::OnceLock;
use thiserror::Error;
use validator::ValidationError;
use wayfarer_core::PasswordHashConfig;

/// Minimum accepted password length (characters)
pub const MIN_PASSWORD_LEN: usize = 8;
/// Maximum accepted password length (characters)
pub const MAX_PASSWORD_LEN: usize = 128;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

fn argon2_for(config: &PasswordHashConfig) -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(
        config.memory_cost_kib,
        config.time_cost,
        config.parallelism,
        Some(32),
    )
    .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a plaintext password with the given Argon2id parameters
///
/// # Returns
///
/// * `Ok(String)` - PHC string (algorithm, parameters, salt and hash)
/// * `Err(PasswordError)` - If the parameters are invalid
///
/// This is CPU and memory heavy; async callers should run it on a blocking
/// thread.
pub fn hash_password(password: &str, config: &PasswordHashConfig) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = argon2_for(config)?;

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// # Returns
///
/// * `Ok(true)` - Password matches
/// * `Ok(false)` - Password does not match
/// * `Err(PasswordError)` - If the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    // Parameters come from the PHC string
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Spend roughly the cost of a real verification when no user matched
///
/// Keeps "unknown email" and "wrong password" indistinguishable by timing.
pub fn dummy_verify(password: &str, config: &PasswordHashConfig) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let hash = DUMMY_HASH.get_or_init(|| hash_password("wayfarer-dummy-password", config).ok());
    if let Some(hash) = hash {
        let _ = verify_password(password, hash);
    }
}

/// Validate password length rules for request DTOs
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();

    if len < MIN_PASSWORD_LEN {
        let mut err = ValidationError::new("password_too_short");
        err.message = Some("A password must have at least 8 characters".into());
        return Err(err);
    }

    if len > MAX_PASSWORD_LEN {
        let mut err = ValidationError::new("password_too_long");
        err.message = Some("A password must have at most 128 characters".into());
        return Err(err);
    }

    if password.trim().is_empty() {
        let mut err = ValidationError::new("password_blank");
        err.message = Some("A password cannot be blank".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> PasswordHashConfig {
        PasswordHashConfig {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("Secret123", &light()).expect("Failed to hash password");

        assert!(verify_password("Secret123", &hash).expect("Verification failed"));
        assert!(!verify_password("WrongPassword", &hash).expect("Verification failed"));
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let hash1 = hash_password("SamePassword123", &light()).unwrap();
        let hash2 = hash_password("SamePassword123", &light()).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("SamePassword123", &hash1).unwrap());
        assert!(verify_password("SamePassword123", &hash2).unwrap());
    }

    #[test]
    fn test_hash_never_contains_plaintext() {
        let hash = hash_password("Secret123", &light()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("Secret123"));
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "invalid-hash-format");
        assert!(matches!(result, Err(PasswordError::InvalidHashFormat)));
    }

    #[test]
    fn test_custom_config_is_encoded_in_hash() {
        let config = PasswordHashConfig {
            memory_cost_kib: 2048,
            time_cost: 2,
            parallelism: 1,
        };

        let hash = hash_password("TestPassword123", &config).unwrap();

        assert!(verify_password("TestPassword123", &hash).unwrap());
        assert!(hash.contains("m=2048"));
        assert!(hash.contains("t=2"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_invalid_params_fail_to_hash() {
        let config = PasswordHashConfig {
            memory_cost_kib: 1,
            time_cost: 0,
            parallelism: 1,
        };
        assert!(matches!(
            hash_password("whatever1", &config),
            Err(PasswordError::HashingFailed(_))
        ));
    }

    #[test]
    fn test_password_strength_validation() {
        assert!(validate_password_strength("Secret123").is_ok());
        assert!(validate_password_strength("12345678").is_ok());

        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("        ").is_err());
        assert!(validate_password_strength(&"x".repeat(129)).is_err());
    }
}
