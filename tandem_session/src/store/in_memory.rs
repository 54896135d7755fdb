//! A volatile token store

use std::sync::{PoisonError, RwLock};

use super::{StoredSession, TokenStore};
use crate::{AccessToken, RefreshToken};

/// An in-memory token store
///
/// Nothing survives the process. Useful for tests and for clients that do not
/// want to keep a session across restarts.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    session: RwLock<StoredSession>,
}

impl InMemoryTokenStore {
    /// Constructs a new, empty in-memory token store
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a store pre-populated with the given session
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn access_token(&self) -> Option<AccessToken> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    fn set_access_token(&self, token: AccessToken) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token = Some(token);
    }

    fn set_refresh_token(&self, token: Option<RefreshToken>) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token = token;
    }

    fn clear(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = StoredSession::default();
    }

    fn snapshot(&self) -> StoredSession {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
