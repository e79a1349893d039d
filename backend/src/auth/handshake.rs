//! Registration and the two-step login.
//!
//! `start` checks the password, then issues a fresh six digit code: its hash
//! replaces any earlier one for the user and the plaintext goes out through
//! the external sender only. `finish` checks a code against the stored hash,
//! consumes it and signs a session token. Concurrent `start`s for one user
//! race on the stored hash and the last write wins, which matches the last
//! code delivered.

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use super::{Hasher, TokenSigner};
use crate::error::{Error, Result};
use crate::models::{LoginAck, RegisterRequest, Role, User};
use crate::repo::UserRepo;
use crate::sender::Sender;
use crate::store::Deadline;

const CODE_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

const DUMMY_MAIL: &str = "dummy@test.local";
const DUMMY_PASSWORD: &str = "dummy_password";

fn generate_code() -> u32 {
    OsRng.gen_range(CODE_RANGE)
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepo>,
    sender: Arc<dyn Sender>,
    hasher: Arc<dyn Hasher>,
    signer: Arc<dyn TokenSigner>,
    code_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        sender: Arc<dyn Sender>,
        hasher: Arc<dyn Hasher>,
        signer: Arc<dyn TokenSigner>,
        code_ttl: chrono::Duration,
    ) -> Self {
        Self {
            users,
            sender,
            hasher,
            signer,
            code_ttl,
        }
    }

    pub async fn register(&self, deadline: &Deadline, req: &RegisterRequest) -> Result<Uuid> {
        log::info!("user service: register {:?} as {:?}", req.email, req.user_type);

        let role: Role = req.user_type.parse()?;
        if !is_valid_email(&req.email) {
            log::warn!("user service: register error: bad mail {:?}", req.email);
            return Err(Error::validation(format!("bad mail {:?}", req.email)));
        }
        if req.password.is_empty() {
            log::warn!("user service: register error: empty password");
            return Err(Error::validation("empty password"));
        }

        let user = User {
            user_id: Uuid::new_v4(),
            mail: req.email.clone(),
            password: self.hasher.hash(&req.password)?,
            role,
        };
        self.users
            .create(deadline, &user)
            .await
            .map_err(|e| Error::store(format!("user service: register {}", user.user_id), e))?;
        Ok(user.user_id)
    }

    /// Creates a throwaway user of the given role and signs a token for it
    /// straight away.
    pub async fn dummy_login(&self, deadline: &Deadline, user_type: &str) -> Result<String> {
        log::info!("user service: dummy login as {:?}", user_type);

        let role: Role = user_type.parse()?;
        let user = User {
            user_id: Uuid::new_v4(),
            mail: DUMMY_MAIL.to_string(),
            password: self.hasher.hash(DUMMY_PASSWORD)?,
            role,
        };
        self.users
            .create(deadline, &user)
            .await
            .map_err(|e| Error::store(format!("user service: dummy login {}", user.user_id), e))?;
        self.signer.issue(user.user_id, role)
    }

    pub async fn start(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
        password: &str,
    ) -> Result<LoginAck> {
        log::info!("user service: login {}", user_id);

        let user = self.fetch_user(deadline, user_id).await?;
        if let Err(e) = self.hasher.verify(&user.password, password) {
            log::warn!("user service: login error for {}: {}", user_id, e);
            return Err(Error::BadCredentials(user_id));
        }

        let code = generate_code();
        let code_hash = self.hasher.hash(&code.to_string())?;
        self.users
            .store_code(deadline, user_id, &code_hash, Utc::now())
            .await
            .map_err(|e| Error::store(format!("user service: store code for {user_id}"), e))?;

        if let Err(e) = self
            .sender
            .send(deadline, &user.mail, &format!("your login code: {code}"))
            .await
        {
            log::warn!("user service: code delivery for {} failed: {}", user_id, e);
            return Err(e.into());
        }

        Ok(LoginAck {
            message: format!("we sent a code to your telegram, {}", user.mail),
        })
    }

    pub async fn finish(&self, deadline: &Deadline, user_id: Uuid, code: u32) -> Result<String> {
        log::info!("user service: confirm login {}", user_id);

        let user = self.fetch_user(deadline, user_id).await?;
        let stored = self
            .users
            .get_code(deadline, user_id)
            .await
            .map_err(|e| Error::store(format!("user service: get code for {user_id}"), e))?
            .ok_or(Error::CodeExpired(user_id))?;

        if Utc::now() - stored.issued_at > self.code_ttl {
            log::warn!(
                "user service: code for {} expired at {}",
                user_id,
                stored.issued_at + self.code_ttl
            );
            return Err(Error::CodeExpired(user_id));
        }
        if !CODE_RANGE.contains(&code) {
            return Err(Error::BadCode(user_id));
        }
        if let Err(e) = self.hasher.verify(&stored.code, &code.to_string()) {
            log::warn!("user service: confirm login error for {}: {}", user_id, e);
            return Err(Error::BadCode(user_id));
        }

        // Consumed codes must not be replayable; the TTL still bounds a
        // code whose delete failed.
        if let Err(e) = self.users.delete_code(deadline, user_id).await {
            log::warn!("user service: could not consume code for {}: {}", user_id, e);
        }

        self.signer.issue(user.user_id, user.role)
    }

    async fn fetch_user(&self, deadline: &Deadline, user_id: Uuid) -> Result<User> {
        self.users
            .get_by_id(deadline, user_id)
            .await
            .map_err(|e| Error::store(format!("user service: get user {user_id}"), e))?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}
