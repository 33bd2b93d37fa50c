use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordHashConfig;

/// Newtype for a plaintext password. `Debug` is redacted.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an argon2 PHC hash string
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hasher with deployment-tuned cost parameters.
///
/// Verification reads the parameters embedded in the stored hash, so hashes
/// produced under older settings keep verifying after the costs change.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: PasswordHashString,
}

impl PasswordHasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid password hash parameters: {}", e))?;

        let mut hasher = Self {
            params,
            dummy_hash: PasswordHashString::new(String::new()),
        };
        // Verified against when the email is unknown, so both paths cost the same.
        hasher.dummy_hash = hasher.hash(&Password::new(uuid::Uuid::new_v4().to_string()))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password. Salt is generated per call and embedded in the output.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Returns Ok(()) if the password matches.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<(), anyhow::Error> {
        let parsed_hash = PasswordHash::new(password_hash.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        self.argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .map_err(|_| anyhow::anyhow!("Password verification failed"))
    }

    /// Burn one verification against a throwaway hash. Result is always ignored.
    pub fn verify_dummy(&self, password: &Password) {
        let _ = self.verify(password, &self.dummy_hash);
    }

    /// Checks that a configured hash is a well-formed PHC string.
    pub fn check_format(hash: &str) -> Result<(), anyhow::Error> {
        PasswordHash::new(hash)
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .expect("valid params")
    }

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher().hash(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(hash.as_str().contains("m=1024,t=1,p=1"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hasher.hash(&password).expect("Failed to hash password");

        assert!(hasher.verify(&password, &hash).is_ok());
        assert!(hasher
            .verify(&Password::new("wrongPassword".to_string()), &hash)
            .is_err());
    }

    #[test]
    fn test_hash_from_other_params_still_verifies() {
        let password = Password::new("carried-over".to_string());
        let old = hasher().hash(&password).unwrap();

        let tuned = PasswordHasher::new(&PasswordHashConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(tuned.verify(&password, &old).is_ok());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hasher.hash(&password).unwrap();
        let hash2 = hasher.hash(&password).unwrap();

        assert_ne!(hash1.as_str(), hash2.as_str());
    }

    #[test]
    fn test_debug_redacts_password() {
        let password = Password::new("hunter2".to_string());
        assert!(!format!("{:?}", password).contains("hunter2"));
    }

    #[test]
    fn test_check_format() {
        assert!(PasswordHasher::check_format("not-a-hash").is_err());
        let hash = hasher().hash(&Password::new("x".to_string())).unwrap();
        assert!(PasswordHasher::check_format(hash.as_str()).is_ok());
    }
}
