//! User registry and session state.
//!
//! Backs the sign-in/sign-up screens; the forms themselves live in the UI.
//! Users and the current session are persisted in the same key-value
//! medium as the library data, under their own keys, and the signed-in
//! user determines which storage namespace the rest of the core operates
//! on (see [`namespace_key`]).
//!
//! Passwords are compared and stored in plain text. That is a documented
//! limitation inherited from the storage format, not an oversight: this
//! is a single-user local app with no real authentication security.

use crate::model::User;
use crate::store::kv::KvStore;
use crate::store::{Store, namespace_key};
use chrono::Utc;
use log::error;
use uuid::Uuid;

/// Key under which the user list is persisted.
pub const USERS_KEY: &str = "shelfmark-users";

/// Key under which the signed-in user is persisted.
pub const CURRENT_USER_KEY: &str = "shelfmark-current-user";

#[non_exhaustive]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("email already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,
}

pub struct Auth {
    kv: KvStore,
    users: Vec<User>,
    current: Option<User>,
}

impl Auth {
    /// Loads the registry and any persisted session from the store's
    /// medium. Unreadable or malformed records fall back to an empty
    /// registry and no session; sign-in state is never worth crashing for.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per session"
    )]
    pub async fn open(store: &Store) -> Self {
        let kv = store.kv_handle();
        let users = read_record(&kv, USERS_KEY).await.unwrap_or_default();
        let current = read_record(&kv, CURRENT_USER_KEY).await.flatten();

        Self { kv, users, current }
    }

    #[must_use]
    #[inline]
    pub const fn current_user(&self) -> Option<&User> {
        self.current.as_ref()
    }

    #[must_use]
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Storage namespace key for the active session: per-user when signed
    /// in, the shared guest namespace otherwise.
    #[must_use]
    #[inline]
    pub fn namespace(&self) -> String {
        namespace_key(self.current.as_ref().map(|user| user.id.as_str()))
    }

    /// Creates an account and signs it in, returning the new user.
    ///
    /// # Errors
    /// [`AuthError::EmailTaken`] when the email is already registered.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        if self.users.iter().any(|user| user.email == email) {
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.users.push(user.clone());
        self.current = Some(user.clone());
        self.persist_users().await;
        self.persist_current().await;

        Ok(user)
    }

    /// Signs in an existing account, returning the matched user.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] when no account matches.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, AuthError> {
        let found = self
            .users
            .iter()
            .find(|user| user.email == email && user.password == password)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        self.current = Some(found.clone());
        self.persist_current().await;

        Ok(found)
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn logout(&mut self) {
        self.current = None;
        self.persist_current().await;
    }

    async fn persist_users(&self) {
        write_record(&self.kv, USERS_KEY, &self.users).await;
    }

    async fn persist_current(&self) {
        write_record(&self.kv, CURRENT_USER_KEY, &self.current).await;
    }
}

async fn read_record<T: serde::de::DeserializeOwned>(kv: &KvStore, key: &str) -> Option<T> {
    match kv.get(key).await {
        Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
        Ok(None) => None,
        Err(read_error) => {
            error!("Failed to read auth record \"{key}\": {read_error}");
            None
        }
    }
}

async fn write_record<T: serde::Serialize>(kv: &KvStore, key: &str, record: &T) {
    let payload = match serde_json::to_string(record) {
        Ok(payload) => payload,
        Err(serialize_error) => {
            error!("Failed to serialize auth record \"{key}\": {serialize_error}");
            return;
        }
    };

    if let Err(write_error) = kv.set(key, &payload).await {
        error!("Failed to persist auth record \"{key}\": {write_error}");
    }
}
