use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("an account with email {0} already exists")]
    EmailTaken(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("session is missing or expired")]
    InvalidSession,
    #[error("account {0} not found")]
    NoAccount(Uuid),
    #[error("failed to hash password")]
    Hashing,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Bearer token presented on later requests.
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

struct StoredAccount {
    account: Account,
    password_hash: String,
}

/// Email/password accounts and their sessions.
#[derive(Clone, Default)]
pub struct Accounts {
    accounts: Arc<DashMap<Uuid, StoredAccount>>,
    by_email: Arc<DashMap<String, Uuid>>,
    sessions: Arc<DashMap<String, Session>>,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AuthError::Hashing)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::Hashing)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, email: &str, password: &str, name: &str) -> Result<Account, AuthError> {
        let email = normalize(email);
        let password_hash = hash_password(password)?;

        let account = Account {
            id: Uuid::now_v7(),
            email: email.clone(),
            name: name.to_owned(),
            created_at: Utc::now(),
        };

        match self.by_email.entry(email) {
            Entry::Occupied(e) => return Err(AuthError::EmailTaken(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(account.id);
            }
        }
        self.accounts.insert(
            account.id,
            StoredAccount {
                account: account.clone(),
                password_hash,
            },
        );

        info!(account_id = %account.id, "account created");
        Ok(account)
    }

    /// Remove an account and every session it owns.
    pub async fn delete(&self, account_id: Uuid) -> Result<(), AuthError> {
        let (_, stored) = self
            .accounts
            .remove(&account_id)
            .ok_or(AuthError::NoAccount(account_id))?;
        self.by_email.remove(&stored.account.email);
        self.sessions.retain(|_, s| s.account_id != account_id);
        Ok(())
    }

    pub async fn create_email_session(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let account_id = *self
            .by_email
            .get(&normalize(email))
            .ok_or(AuthError::InvalidCredentials)?;
        let hash = self
            .accounts
            .get(&account_id)
            .map(|a| a.password_hash.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &hash)?;

        let session = Session {
            id: Uuid::now_v7(),
            account_id,
            secret: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            created_at: Utc::now(),
        };
        self.sessions.insert(session.secret.clone(), session.clone());
        debug!(%account_id, session_id = %session.id, "session created");
        Ok(session)
    }

    pub async fn delete_session(&self, secret: &str) -> Result<(), AuthError> {
        self.sessions
            .remove(secret)
            .map(|_| ())
            .ok_or(AuthError::InvalidSession)
    }

    /// The account behind a session secret.
    pub async fn get(&self, secret: &str) -> Result<Account, AuthError> {
        let account_id = self
            .sessions
            .get(secret)
            .map(|s| s.account_id)
            .ok_or(AuthError::InvalidSession)?;
        self.accounts
            .get(&account_id)
            .map(|a| a.account.clone())
            .ok_or(AuthError::InvalidSession)
    }
}
