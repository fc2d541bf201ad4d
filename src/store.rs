//! Local key-value persistence.
//!
//! Values are JSON blobs addressed by a key in one of two tiers. The secure tier
//! holds credentials, the plain tier holds the user document. Reads look in the
//! secure tier first and fall back to plain; removal clears both.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::User;

/// Key of the persisted user document.
pub const USER_KEY: &str = "user";
/// Key of the persisted bearer token.
pub const TOKEN_KEY: &str = "token";

/// Which storage tier an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Plain,
    Secure,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Secure => "secure",
        }
    }
}

/// Raw string storage backing a [`LocalStore`].
pub trait KeyValueStore: Send + Sync {
    fn read(&self, tier: Tier, key: &str) -> Result<Option<String>>;
    fn write(&self, tier: Tier, key: &str, value: &str) -> Result<()>;
    fn delete(&self, tier: Tier, key: &str) -> Result<()>;
}

/// Typed JSON accessor over any [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = match self.backend.read(Tier::Secure, key)? {
            Some(raw) => Some(raw),
            None => self.backend.read(Tier::Plain, key)?,
        };
        raw.map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("Corrupt value under key {key:?}"))
        })
        .transpose()
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, tier: Tier) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for key {key:?}"))?;
        self.backend.write(tier, key, &raw)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend.delete(Tier::Secure, key)?;
        self.backend.delete(Tier::Plain, key)
    }

    pub fn load_user(&self) -> Result<Option<User>> {
        self.get(USER_KEY)
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        self.set(USER_KEY, user, Tier::Plain)
    }

    pub fn load_token(&self) -> Result<Option<String>> {
        self.get(TOKEN_KEY)
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        self.set(TOKEN_KEY, token, Tier::Secure)
    }

    /// Forget the signed-in account.
    pub fn clear_session(&self) -> Result<()> {
        self.remove(USER_KEY)?;
        self.remove(TOKEN_KEY)
    }
}

/// In-memory [`KeyValueStore`] for tests and throwaway sessions.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(Tier, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(Tier, String), String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, tier: Tier, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(&(tier, key.to_string())).cloned())
    }

    fn write(&self, tier: Tier, key: &str, value: &str) -> Result<()> {
        self.entries()?
            .insert((tier, key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, tier: Tier, key: &str) -> Result<()> {
        self.entries()?.remove(&(tier, key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_stored_as_json_string_in_secure_tier() {
        let backend = MemoryStore::new();
        let store = LocalStore::new(backend.clone());

        store.save_token("abc123").unwrap();

        assert_eq!(
            backend.read(Tier::Secure, TOKEN_KEY).unwrap().as_deref(),
            Some("\"abc123\"")
        );
        assert!(backend.read(Tier::Plain, TOKEN_KEY).unwrap().is_none());
        assert_eq!(store.load_token().unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn secure_tier_wins_over_plain() {
        let backend = MemoryStore::new();
        backend.write(Tier::Plain, "k", "\"plain\"").unwrap();
        backend.write(Tier::Secure, "k", "\"secure\"").unwrap();

        let store = LocalStore::new(backend);
        assert_eq!(store.get::<String>("k").unwrap().as_deref(), Some("secure"));
    }

    #[test]
    fn remove_clears_both_tiers() {
        let backend = MemoryStore::new();
        backend.write(Tier::Plain, "k", "1").unwrap();
        backend.write(Tier::Secure, "k", "2").unwrap();

        let store = LocalStore::new(backend.clone());
        store.remove("k").unwrap();

        assert!(backend.read(Tier::Plain, "k").unwrap().is_none());
        assert!(backend.read(Tier::Secure, "k").unwrap().is_none());
    }

    #[test]
    fn corrupt_value_is_an_error() {
        let backend = MemoryStore::new();
        backend.write(Tier::Plain, USER_KEY, "{not json").unwrap();

        let store = LocalStore::new(backend);
        assert!(store.load_user().is_err());
    }

    #[test]
    fn clear_session_removes_user_and_token() {
        let store = LocalStore::in_memory();
        store.save_user(&User::new("alice", "alice@example.com")).unwrap();
        store.save_token("t").unwrap();

        store.clear_session().unwrap();

        assert!(store.load_user().unwrap().is_none());
        assert!(store.load_token().unwrap().is_none());
    }
}
