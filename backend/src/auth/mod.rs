pub mod handshake;

use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::models::Role;

pub use handshake::AuthService;

/// Salted one-way hashing with constant-time verification. Used for both
/// passwords and one-time codes.
#[cfg_attr(test, mockall::automock)]
pub trait Hasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, Error>;

    /// `Ok(())` on a match, `Err` otherwise.
    fn verify(&self, hash: &str, plaintext: &str) -> Result<(), Error>;
}

#[derive(Default, Clone)]
pub struct Argon2Hasher {
    argon: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Hash(e.to_string()))
    }

    fn verify(&self, hash: &str, plaintext: &str) -> Result<(), Error> {
        let parsed = PasswordHash::new(hash).map_err(|e| Error::Hash(e.to_string()))?;
        self.argon
            .verify_password(plaintext.as_bytes(), &parsed)
            .map_err(|e| Error::Hash(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenSigner: Send + Sync {
    fn issue(&self, user_id: Uuid, role: Role) -> Result<String, Error>;
}

#[derive(Clone)]
pub struct JwtSigner {
    secret: String,
    ttl_secs: u64,
}

impl JwtSigner {
    pub fn new(secret: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: ttl_hours * 60 * 60,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Token(e.to_string()))?;
        Ok(token_data.claims)
    }
}

impl TokenSigner for JwtSigner {
    fn issue(&self, user_id: Uuid, role: Role) -> Result<String, Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Token(e.to_string()))?
            .as_secs();
        let claims = Claims {
            sub: user_id,
            role,
            exp: (now + self.ttl_secs) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Token(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn code_hash_verifies_only_the_same_code() {
        let hasher = Argon2Hasher::new();
        let mut rng = rand::thread_rng();
        for _ in 0..4 {
            let code: u32 = rng.gen_range(100_000..=999_999);
            let other = if code == 999_999 { 100_000 } else { code + 1 };
            let hash = hasher.hash(&code.to_string()).unwrap();

            assert!(hasher.verify(&hash, &code.to_string()).is_ok());
            assert!(hasher.verify(&hash, &other.to_string()).is_err());
        }
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = Argon2Hasher::new();
        let a = hasher.hash("secret").unwrap();
        let b = hasher.hash("secret").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("secret"));
    }

    #[test]
    fn garbage_hash_is_rejected() {
        assert!(matches!(
            Argon2Hasher::new().verify("not-a-phc-string", "x"),
            Err(Error::Hash(_))
        ));
    }

    #[test]
    fn issued_token_carries_user_and_role() {
        let signer = JwtSigner::new("test-secret", 24);
        let user_id = Uuid::new_v4();
        let token = signer.issue(user_id, Role::Moderator).unwrap();

        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Moderator);
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = JwtSigner::new("one", 1).issue(Uuid::new_v4(), Role::Client).unwrap();
        assert!(matches!(JwtSigner::new("two", 1).validate(&token), Err(Error::Token(_))));
    }
}
