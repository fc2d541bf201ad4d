//! In-memory account store behind the reference API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use rand_core::OsRng;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Avatar, Note, User};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    NotFound,

    #[error("Failed to hash password: {0}")]
    Hash(String),
}

struct Account {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Accounts {
    by_id: HashMap<Uuid, Account>,
    tokens: HashMap<String, Uuid>,
}

impl Accounts {
    fn find_by_username(&self, username: &str) -> Option<Uuid> {
        self.by_id
            .iter()
            .find(|(_, a)| a.user.username.eq_ignore_ascii_case(username))
            .map(|(id, _)| *id)
    }

    fn find_by_email(&self, email: &str) -> Option<Uuid> {
        self.by_id
            .iter()
            .find(|(_, a)| a.user.email.eq_ignore_ascii_case(email))
            .map(|(id, _)| *id)
    }

    fn password_hash(&self, id: Uuid) -> Result<String, BackendError> {
        self.by_id
            .get(&id)
            .map(|a| a.password_hash.clone())
            .ok_or(BackendError::NotFound)
    }

    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, BackendError> {
        self.by_id.get_mut(&id).ok_or(BackendError::NotFound)
    }

    fn issue_token(&mut self, id: Uuid) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), id);
        token
    }
}

/// Shared state of the reference API.
#[derive(Clone, Default)]
pub struct Backend {
    accounts: Arc<Mutex<Accounts>>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().expect("backend lock poisoned")
    }

    pub fn username_available(&self, username: &str) -> bool {
        self.lock().find_by_username(username).is_none()
    }

    pub fn email_available(&self, email: &str) -> bool {
        self.lock().find_by_email(email).is_none()
    }

    pub fn account_for_token(&self, token: &str) -> Option<Uuid> {
        self.lock().tokens.get(token).copied()
    }

    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), BackendError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(BackendError::Invalid(
                "Username, email and password are required".to_string(),
            ));
        }
        let password_hash = hash_password(password)?;

        let mut accounts = self.lock();
        if accounts.find_by_username(username).is_some() {
            return Err(BackendError::Conflict("Username is already taken".to_string()));
        }
        if accounts.find_by_email(email).is_some() {
            return Err(BackendError::Conflict("Email is already registered".to_string()));
        }

        let id = Uuid::new_v4();
        let user = User::new(username, email);
        accounts.by_id.insert(
            id,
            Account {
                user: user.clone(),
                password_hash,
            },
        );
        let token = accounts.issue_token(id);
        tracing::info!("Registered {}", username);
        Ok((user, token))
    }

    /// `identifier` may be the username or the email address.
    pub fn login(&self, identifier: &str, password: &str) -> Result<(User, String), BackendError> {
        let identifier = identifier.trim();
        let (id, hash) = {
            let accounts = self.lock();
            let id = accounts
                .find_by_username(identifier)
                .or_else(|| accounts.find_by_email(identifier))
                .ok_or(BackendError::InvalidCredentials)?;
            (id, accounts.password_hash(id)?)
        };
        if !verify_password(password, &hash) {
            return Err(BackendError::InvalidCredentials);
        }

        let mut accounts = self.lock();
        // The password may have changed or the account vanished while unlocked.
        if accounts.password_hash(id).ok().as_deref() != Some(hash.as_str()) {
            return Err(BackendError::InvalidCredentials);
        }
        let user = accounts.account_mut(id)?.user.clone();
        let token = accounts.issue_token(id);
        Ok((user, token))
    }

    pub fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        self.lock()
            .find_by_email(email.trim())
            .ok_or(BackendError::NotFound)?;
        tracing::info!("Password reset requested for {}", email.trim());
        Ok(())
    }

    pub fn update_username(&self, id: Uuid, username: &str) -> Result<User, BackendError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(BackendError::Invalid("Username is required".to_string()));
        }
        let mut accounts = self.lock();
        if accounts
            .find_by_username(username)
            .is_some_and(|owner| owner != id)
        {
            return Err(BackendError::Conflict("Username is already taken".to_string()));
        }
        let account = accounts.account_mut(id)?;
        account.user.username = username.to_string();
        Ok(account.user.clone())
    }

    pub fn update_email(&self, id: Uuid, email: &str) -> Result<User, BackendError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(BackendError::Invalid("Email is required".to_string()));
        }
        let mut accounts = self.lock();
        if accounts.find_by_email(email).is_some_and(|owner| owner != id) {
            return Err(BackendError::Conflict("Email is already registered".to_string()));
        }
        let account = accounts.account_mut(id)?;
        account.user.email = email.to_string();
        Ok(account.user.clone())
    }

    pub fn update_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), BackendError> {
        if new_password.is_empty() {
            return Err(BackendError::Invalid("New password is required".to_string()));
        }
        let current_hash = self.lock().password_hash(id)?;
        if !verify_password(current_password, &current_hash) {
            return Err(BackendError::InvalidCredentials);
        }
        let new_hash = hash_password(new_password)?;

        let mut accounts = self.lock();
        let account = accounts.account_mut(id)?;
        if account.password_hash != current_hash {
            return Err(BackendError::InvalidCredentials);
        }
        account.password_hash = new_hash;
        Ok(())
    }

    pub fn update_avatar(&self, id: Uuid, url: &str) -> Result<Avatar, BackendError> {
        let mut accounts = self.lock();
        let account = accounts.account_mut(id)?;
        let avatar = Avatar {
            url: url.to_string(),
            updated_at: Utc::now(),
        };
        account.user.avatar = Some(avatar.clone());
        Ok(avatar)
    }

    /// Remove the account and every token issued for it.
    pub fn delete(&self, id: Uuid) -> Result<(), BackendError> {
        let mut accounts = self.lock();
        accounts.by_id.remove(&id).ok_or(BackendError::NotFound)?;
        accounts.tokens.retain(|_, owner| *owner != id);
        Ok(())
    }

    /// Take notes and avatar from the pushed document; identity fields stay
    /// whatever the server holds.
    pub fn sync_user(&self, id: Uuid, pushed: User) -> Result<User, BackendError> {
        let mut accounts = self.lock();
        let account = accounts.account_mut(id)?;
        account.user.notes = pushed.notes;
        if pushed.avatar.is_some() {
            account.user.avatar = pushed.avatar;
        }
        Ok(account.user.clone())
    }

    pub fn sync_notes(&self, id: Uuid, notes: Vec<Note>) -> Result<Vec<Note>, BackendError> {
        let mut accounts = self.lock();
        let account = accounts.account_mut(id)?;
        account.user.notes = notes;
        Ok(account.user.notes.clone())
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.lock().by_id.get(&id).map(|a| a.user.clone())
    }
}

fn hash_password(password: &str) -> Result<String, BackendError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BackendError::Hash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
