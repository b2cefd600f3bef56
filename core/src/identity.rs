//! Identity and session collaborator
//!
//! The engine trusts the owner identity it is handed. [`IdentityService`]
//! is the contract a front end uses to resolve that identity;
//! [`SessionStore`] is an in-process implementation whose lifetime is that
//! of the value that owns it.

use argon2::Argon2;
use async_trait::async_trait;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{WebmailError, WebmailResult};
use crate::message::validate_address;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier
    pub id: String,
    /// Mailbox identity the session resolves to
    pub owner: String,
    /// Token state-changing requests must echo back
    pub csrf_token: String,
    pub created_at: OffsetDateTime,
}

/// Resolve callers to mailbox owners
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Register a new user
    async fn signup(&self, email: &str, password: &str) -> WebmailResult<()>;

    /// Open a session for valid credentials
    async fn login(&self, email: &str, password: &str) -> WebmailResult<Session>;

    /// Resolve a session to its owner
    async fn check_auth(&self, session_id: &str) -> WebmailResult<String>;

    /// Verify the CSRF token bound to a session
    async fn check_csrf(&self, session_id: &str, token: &str) -> WebmailResult<()>;

    /// Close a session
    async fn logout(&self, session_id: &str) -> WebmailResult<()>;
}

struct UserRecord {
    /// Argon2 hash in PHC string form, salt included
    password_hash: String,
}

#[derive(Default)]
struct IdentityState {
    users: HashMap<String, UserRecord>,
    sessions: HashMap<String, Session>,
}

/// Lock-guarded user and session tables
#[derive(Default)]
pub struct SessionStore {
    state: RwLock<IdentityState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sessions
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

fn hash_password(password: &str) -> WebmailResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WebmailError::auth(format!("Password hashing failed: {}", e)))
}

/// Constant-time check of `password` against a stored PHC string
fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

#[async_trait]
impl IdentityService for SessionStore {
    async fn signup(&self, email: &str, password: &str) -> WebmailResult<()> {
        validate_address(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(WebmailError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash = hash_password(password)?;

        let mut state = self.state.write().await;
        if state.users.contains_key(email) {
            return Err(WebmailError::validation(format!("User {} already exists", email)));
        }
        state.users.insert(email.to_string(), UserRecord { password_hash });

        tracing::info!("Registered user {}", email);
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> WebmailResult<Session> {
        let stored_hash = self
            .state
            .read()
            .await
            .users
            .get(email)
            .map(|user| user.password_hash.clone());

        let valid = stored_hash
            .map(|hash| verify_password(password, &hash))
            .unwrap_or(false);
        if !valid {
            return Err(WebmailError::auth("Invalid email or password"));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            owner: email.to_string(),
            csrf_token: Uuid::new_v4().simple().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.state
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());

        tracing::debug!("Opened session for {}", email);
        Ok(session)
    }

    async fn check_auth(&self, session_id: &str) -> WebmailResult<String> {
        let state = self.state.read().await;
        state
            .sessions
            .get(session_id)
            .map(|session| session.owner.clone())
            .ok_or_else(|| WebmailError::auth("Unknown session"))
    }

    async fn check_csrf(&self, session_id: &str, token: &str) -> WebmailResult<()> {
        let state = self.state.read().await;
        match state.sessions.get(session_id) {
            Some(session) if session.csrf_token == token => Ok(()),
            Some(_) => Err(WebmailError::auth("CSRF token mismatch")),
            None => Err(WebmailError::auth("Unknown session")),
        }
    }

    async fn logout(&self, session_id: &str) -> WebmailResult<()> {
        let mut state = self.state.write().await;
        state
            .sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| WebmailError::auth("Unknown session"))
    }
}
