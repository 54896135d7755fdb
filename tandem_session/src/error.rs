use std::fmt;

use thiserror::Error;

/// The broad reason a session could not be authenticated
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum AuthFailureKind {
    /// No token, or a token whose payload could not be read
    Decode,
    /// The token was readable but is past its expiry
    Expired,
    /// A new access token could not be obtained
    RefreshFailed,
}

impl fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode failure",
            Self::Expired => "expired token",
            Self::RefreshFailed => "refresh failed",
        })
    }
}

/// A tagged authentication failure
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct AuthFailure {
    kind: AuthFailureKind,
    message: String,
}

impl AuthFailure {
    pub(crate) fn new(kind: AuthFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The kind of failure
    #[inline]
    pub fn kind(&self) -> AuthFailureKind {
        self.kind
    }

    /// A human-readable description
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}
