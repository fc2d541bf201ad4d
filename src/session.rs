//! The signed-in session.
//!
//! A [`Session`] owns the current user document and token, the local store they
//! are persisted in, the API client and the connectivity signal. It is a cheap
//! cloneable handle; all clones see the same state.
//!
//! Local mutations always persist first, then update memory, then (when online)
//! push the full note collection. Sync is a whole-collection overwrite:
//! whatever the server answers replaces local state. Sync calls for a session
//! run one at a time, and a response is dropped if a local mutation happened
//! after its request was built, because that mutation's own sync carries the
//! newer state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::client::{ApiClient, ClientError};
use crate::connectivity::Connectivity;
use crate::editor::{self, EditOutcome, EditTarget};
use crate::models::api::{ApiResponse, AuthPayload, LoginInput, RegisterInput, UpdatePasswordInput};
use crate::models::{Avatar, Note, NoteDraft, NoteListing, User};
use crate::store::LocalStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not signed in")]
    NotAuthenticated,

    /// The server answered `success: false`; carries its message.
    #[error("{0}")]
    Rejected(String),

    #[error("Server response is missing {0}")]
    Incomplete(&'static str),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of a sync attempt. Sync failures are never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server's copy replaced local state.
    Replaced { notes: usize },
    /// The server answered `success: false`.
    Rejected(String),
    /// Transport, decoding or persistence failure.
    Failed(String),
    /// A local mutation landed while the request was in flight.
    Superseded,
    /// Nothing to sync without a user and token.
    SignedOut,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replaced { notes } => write!(f, "replaced local copy ({} notes)", notes),
            Self::Rejected(message) => write!(f, "rejected by server: {}", message),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::Superseded => f.write_str("superseded by a newer local change"),
            Self::SignedOut => f.write_str("skipped, not signed in"),
        }
    }
}

/// Answer to a username/email availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub message: String,
}

#[derive(Debug, Default)]
struct State {
    user: Option<User>,
    token: Option<String>,
    /// Bumped on every local mutation.
    revision: u64,
}

struct Inner {
    store: LocalStore,
    client: ApiClient,
    connectivity: Connectivity,
    state: RwLock<State>,
    sync_turn: Mutex<()>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api", &self.inner.client.base_url())
            .field("online", &self.inner.connectivity.is_online())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session with nothing signed in.
    pub fn new(store: LocalStore, client: ApiClient, connectivity: Connectivity) -> Self {
        Self::with_state(store, client, connectivity, State::default())
    }

    /// Start a session from whatever the local store holds. Unreadable entries
    /// are logged and treated as absent.
    pub fn restore(store: LocalStore, client: ApiClient, connectivity: Connectivity) -> Self {
        let user = store.load_user().unwrap_or_else(|e| {
            tracing::warn!("Ignoring stored user document: {:#}", e);
            None
        });
        let token = store.load_token().unwrap_or_else(|e| {
            tracing::warn!("Ignoring stored token: {:#}", e);
            None
        });
        let state = State {
            user,
            token,
            revision: 0,
        };
        Self::with_state(store, client, connectivity, state)
    }

    fn with_state(
        store: LocalStore,
        client: ApiClient,
        connectivity: Connectivity,
        state: State,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                connectivity,
                state: RwLock::new(state),
                sync_turn: Mutex::new(()),
            }),
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner.state.read().await.user.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.state.read().await.token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        let state = self.inner.state.read().await;
        state.user.is_some() && state.token.is_some()
    }

    /// Every local note, tombstones included, in collection order.
    pub async fn notes(&self) -> Vec<Note> {
        self.inner
            .state
            .read()
            .await
            .user
            .as_ref()
            .map(|u| u.notes.clone())
            .unwrap_or_default()
    }

    pub async fn note(&self, id: &str) -> Option<Note> {
        let state = self.inner.state.read().await;
        state.user.as_ref()?.find_note(id).cloned()
    }

    /// Live notes grouped for display.
    pub async fn listing(&self) -> NoteListing {
        let state = self.inner.state.read().await;
        state
            .user
            .as_ref()
            .map(|u| NoteListing::from_notes(&u.notes))
            .unwrap_or_default()
    }

    async fn require_token(&self) -> Result<String, SessionError> {
        self.token().await.ok_or(SessionError::NotAuthenticated)
    }

    // ============================================================
    // Note mutations
    // ============================================================

    /// Save what the editor holds when the user leaves it.
    pub async fn save_note(
        &self,
        target: &EditTarget,
        draft: &NoteDraft,
    ) -> Result<EditOutcome, SessionError> {
        self.mutate_notes(|notes, now| editor::plan(notes, target, draft, now))
            .await
    }

    /// Soft-delete a note by id.
    pub async fn delete_note(&self, id: &str) -> Result<EditOutcome, SessionError> {
        self.mutate_notes(|notes, now| editor::plan_delete(notes, id, now))
            .await
    }

    async fn mutate_notes(
        &self,
        decide: impl FnOnce(&[Note], DateTime<Utc>) -> EditOutcome,
    ) -> Result<EditOutcome, SessionError> {
        let outcome = {
            let mut state = self.inner.state.write().await;
            let user = state.user.as_ref().ok_or(SessionError::NotAuthenticated)?;
            let outcome = decide(&user.notes, Utc::now());
            if outcome.is_write() {
                let mut next = user.clone();
                editor::apply(&mut next.notes, &outcome);
                self.inner.store.save_user(&next)?;
                state.user = Some(next);
                state.revision += 1;
            } else if outcome == EditOutcome::Missing {
                tracing::warn!("Edited note is no longer in the local collection");
            }
            outcome
        };

        if outcome.is_write() && self.is_online() {
            let synced = self.sync_notes().await;
            tracing::debug!("Post-edit sync: {}", synced);
        }
        Ok(outcome)
    }

    // ============================================================
    // Sync
    // ============================================================

    /// Push the full note collection and replace it with the server's answer.
    pub async fn sync_notes(&self) -> SyncOutcome {
        let _turn = self.inner.sync_turn.lock().await;
        let Some((user, token, revision)) = self.snapshot().await else {
            return SyncOutcome::SignedOut;
        };

        let response = match self.inner.client.sync_notes(&user.notes, &token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Note sync failed: {}", e);
                return SyncOutcome::Failed(e.to_string());
            }
        };
        if !response.success {
            tracing::warn!("Note sync rejected: {}", response.message);
            return SyncOutcome::Rejected(response.message);
        }
        let Some(notes) = response.data.notes else {
            tracing::warn!("Note sync response carried no notes");
            return SyncOutcome::Failed("response carried no notes".to_string());
        };

        self.apply_remote(revision, |user| user.notes = notes).await
    }

    /// Push the whole user document and replace it with the server's answer.
    pub async fn push_user(&self) -> SyncOutcome {
        let _turn = self.inner.sync_turn.lock().await;
        let Some((user, token, revision)) = self.snapshot().await else {
            return SyncOutcome::SignedOut;
        };

        let response = match self.inner.client.sync_user(&user, &token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("User sync failed: {}", e);
                return SyncOutcome::Failed(e.to_string());
            }
        };
        if !response.success {
            tracing::warn!("User sync rejected: {}", response.message);
            return SyncOutcome::Rejected(response.message);
        }
        let Some(server_user) = response.data.user else {
            tracing::warn!("User sync response carried no user");
            return SyncOutcome::Failed("response carried no user".to_string());
        };

        self.apply_remote(revision, |user| *user = server_user).await
    }

    async fn snapshot(&self) -> Option<(User, String, u64)> {
        let state = self.inner.state.read().await;
        Some((state.user.clone()?, state.token.clone()?, state.revision))
    }

    async fn apply_remote(&self, revision: u64, replace: impl FnOnce(&mut User)) -> SyncOutcome {
        let mut state = self.inner.state.write().await;
        if state.revision != revision {
            tracing::debug!(
                "Dropping sync response for revision {} (now {})",
                revision,
                state.revision
            );
            return SyncOutcome::Superseded;
        }
        let Some(mut next) = state.user.clone() else {
            return SyncOutcome::SignedOut;
        };
        replace(&mut next);
        if let Err(e) = self.inner.store.save_user(&next) {
            tracing::warn!("Could not persist synced user: {:#}", e);
            return SyncOutcome::Failed(format!("{:#}", e));
        }
        let notes = next.notes.len();
        state.user = Some(next);
        tracing::info!("Synced, {} notes held locally", notes);
        SyncOutcome::Replaced { notes }
    }

    // ============================================================
    // Authentication
    // ============================================================

    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, SessionError> {
        let input = LoginInput {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let response = self.inner.client.login(&input).await?;
        self.establish(response).await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let input = RegisterInput {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.inner.client.register(&input).await?;
        self.establish(response).await
    }

    /// Replace whatever was stored with the freshly authenticated account.
    async fn establish(&self, response: ApiResponse<AuthPayload>) -> Result<User, SessionError> {
        if !response.success {
            return Err(SessionError::Rejected(response.message));
        }
        let user = response.data.user.ok_or(SessionError::Incomplete("user"))?;
        let token = response.data.token.ok_or(SessionError::Incomplete("token"))?;

        let mut state = self.inner.state.write().await;
        self.inner.store.save_user(&user)?;
        self.inner.store.save_token(&token)?;
        state.user = Some(user.clone());
        state.token = Some(token);
        state.revision += 1;
        tracing::info!("Signed in as {}", user.username);
        Ok(user)
    }

    /// Drop the stored user and token and clear in-memory state.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.write().await;
        self.inner.store.clear_session()?;
        state.user = None;
        state.token = None;
        state.revision += 1;
        tracing::info!("Signed out");
        Ok(())
    }

    pub async fn delete_account(&self) -> Result<String, SessionError> {
        let token = self.require_token().await?;
        let response = self.inner.client.delete_user(&token).await?;
        if !response.success {
            return Err(SessionError::Rejected(response.message));
        }
        self.logout().await?;
        Ok(response.message)
    }

    pub async fn send_reset_password(&self, email: &str) -> Result<String, SessionError> {
        let response = self.inner.client.send_reset_password(email).await?;
        if response.success {
            Ok(response.message)
        } else {
            Err(SessionError::Rejected(response.message))
        }
    }

    pub async fn check_username(&self, username: &str) -> Result<Availability, SessionError> {
        let response = self.inner.client.check_username_availability(username).await?;
        Ok(Availability {
            available: response.success,
            message: response.message,
        })
    }

    pub async fn check_email(&self, email: &str) -> Result<Availability, SessionError> {
        let response = self.inner.client.check_email_availability(email).await?;
        Ok(Availability {
            available: response.success,
            message: response.message,
        })
    }

    // ============================================================
    // Profile
    // ============================================================

    pub async fn update_username(&self, username: &str) -> Result<User, SessionError> {
        let token = self.require_token().await?;
        let response = self.inner.client.update_username(username, &token).await?;
        if !response.success {
            return Err(SessionError::Rejected(response.message));
        }
        let user = response.data.user.ok_or(SessionError::Incomplete("user"))?;
        self.replace_user(user).await
    }

    pub async fn update_email(&self, email: &str) -> Result<User, SessionError> {
        let token = self.require_token().await?;
        let response = self.inner.client.update_email(email, &token).await?;
        if !response.success {
            return Err(SessionError::Rejected(response.message));
        }
        let user = response.data.user.ok_or(SessionError::Incomplete("user"))?;
        self.replace_user(user).await
    }

    pub async fn update_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, SessionError> {
        let token = self.require_token().await?;
        let input = UpdatePasswordInput {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let response = self.inner.client.update_password(&input, &token).await?;
        if response.success {
            Ok(response.message)
        } else {
            Err(SessionError::Rejected(response.message))
        }
    }

    /// Set the avatar locally, then let the server's record replace it when
    /// online. Server failures are logged and leave the local choice in place.
    pub async fn change_avatar(&self, url: &str) -> Result<Avatar, SessionError> {
        let local = Avatar::new(url);
        self.edit_user(|user| user.avatar = Some(local.clone())).await?;

        if !self.is_online() {
            return Ok(local);
        }
        let token = self.require_token().await?;
        match self.inner.client.update_avatar(url, &token).await {
            Ok(response) if response.success => match response.data.avatar {
                Some(remote) => {
                    self.edit_user(|user| user.avatar = Some(remote.clone())).await?;
                    Ok(remote)
                }
                None => Ok(local),
            },
            Ok(response) => {
                tracing::warn!("Avatar update rejected: {}", response.message);
                Ok(local)
            }
            Err(e) => {
                tracing::warn!("Avatar update failed: {}", e);
                Ok(local)
            }
        }
    }

    async fn replace_user(&self, user: User) -> Result<User, SessionError> {
        self.edit_user(|current| *current = user).await
    }

    async fn edit_user(&self, edit: impl FnOnce(&mut User)) -> Result<User, SessionError> {
        let mut state = self.inner.state.write().await;
        let mut next = state.user.clone().ok_or(SessionError::NotAuthenticated)?;
        edit(&mut next);
        self.inner.store.save_user(&next)?;
        state.user = Some(next.clone());
        state.revision += 1;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, Tier, USER_KEY};

    fn offline_session(store: LocalStore) -> Session {
        // Nothing listens here; offline sessions never reach the network.
        Session::restore(
            store,
            ApiClient::new("http://127.0.0.1:9/api"),
            Connectivity::offline(),
        )
    }

    fn signed_in_store() -> LocalStore {
        let store = LocalStore::in_memory();
        store.save_user(&User::new("alice", "alice@example.com")).unwrap();
        store.save_token("token-1").unwrap();
        store
    }

    #[tokio::test]
    async fn restore_reads_user_and_token() {
        let session = offline_session(signed_in_store());
        assert!(session.is_authenticated().await);
        assert_eq!(session.user().await.unwrap().username, "alice");
        assert_eq!(session.token().await.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn restore_ignores_corrupt_user_document() {
        let backend = MemoryStore::new();
        backend.write(Tier::Plain, USER_KEY, "{oops").unwrap();
        let session = offline_session(LocalStore::new(backend));
        assert!(session.user().await.is_none());
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn mutations_require_a_user() {
        let session = offline_session(LocalStore::in_memory());
        let err = session
            .save_note(&EditTarget::New, &NoteDraft::new("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn offline_save_persists_before_returning() {
        let store = signed_in_store();
        let session = offline_session(store.clone());

        let outcome = session
            .save_note(&EditTarget::New, &NoteDraft::new("A", ""))
            .await
            .unwrap();
        assert!(matches!(outcome, EditOutcome::Created(_)));

        let persisted = store.load_user().unwrap().unwrap();
        assert_eq!(persisted.notes.len(), 1);
        assert_eq!(persisted.notes, session.notes().await);
    }

    #[tokio::test]
    async fn sync_without_session_is_skipped() {
        let session = offline_session(LocalStore::in_memory());
        assert_eq!(session.sync_notes().await, SyncOutcome::SignedOut);
        assert_eq!(session.push_user().await, SyncOutcome::SignedOut);
    }

    #[tokio::test]
    async fn offline_avatar_change_stays_local() {
        let store = signed_in_store();
        let session = offline_session(store.clone());

        let avatar = session.change_avatar("https://img.example/a.png").await.unwrap();
        assert_eq!(avatar.url, "https://img.example/a.png");
        assert_eq!(
            store.load_user().unwrap().unwrap().avatar.map(|a| a.url),
            Some("https://img.example/a.png".to_string())
        );
    }

    #[test]
    fn outcome_display_is_human_readable() {
        assert_eq!(
            SyncOutcome::Replaced { notes: 3 }.to_string(),
            "replaced local copy (3 notes)"
        );
        assert_eq!(
            SyncOutcome::Rejected("Unauthorized".into()).to_string(),
            "rejected by server: Unauthorized"
        );
    }
}
