//! Durable storage for the session's token pair

use serde::{Deserialize, Serialize};

use crate::{AccessToken, RefreshToken};

#[cfg(feature = "file")]
pub mod file;
pub mod in_memory;

#[cfg(feature = "file")]
pub use file::FileTokenStore;
pub use in_memory::InMemoryTokenStore;

/// The persisted token pair
///
/// Both halves are independently optional. Serialized under the fixed keys
/// `accessToken` and `refreshToken`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// The current access token, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,

    /// The current refresh token, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

impl StoredSession {
    /// Whether neither token is present
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// A synchronous key/value store holding at most one [`StoredSession`]
///
/// Writes must be visible to subsequent reads on the same store immediately,
/// whether or not they have reached durable storage yet.
pub trait TokenStore: Send + Sync {
    /// Gets the stored access token
    fn access_token(&self) -> Option<AccessToken>;

    /// Gets the stored refresh token
    fn refresh_token(&self) -> Option<RefreshToken>;

    /// Replaces the stored access token
    fn set_access_token(&self, token: AccessToken);

    /// Replaces or removes the stored refresh token
    fn set_refresh_token(&self, token: Option<RefreshToken>);

    /// Removes both tokens
    fn clear(&self);

    /// Gets a copy of both tokens
    fn snapshot(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        }
    }
}

impl<T: TokenStore + ?Sized> TokenStore for std::sync::Arc<T> {
    fn access_token(&self) -> Option<AccessToken> {
        T::access_token(self)
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        T::refresh_token(self)
    }

    fn set_access_token(&self, token: AccessToken) {
        T::set_access_token(self, token)
    }

    fn set_refresh_token(&self, token: Option<RefreshToken>) {
        T::set_refresh_token(self, token)
    }

    fn clear(&self) {
        T::clear(self)
    }

    fn snapshot(&self) -> StoredSession {
        T::snapshot(self)
    }
}
