//! The authentication exchange endpoints the session depends on
//!
//! The backend's login, registration, refresh and password-reset endpoints
//! are opaque to the session. [`AuthService`] is the seam; [`HttpAuthService`]
//! is the implementation that talks to a real backend.

use std::error;

use async_trait::async_trait;
use thiserror::Error;

use crate::{AccessToken, RefreshTokenRef};

pub mod dto;
#[cfg(feature = "http")]
pub mod http;

pub use dto::{IssuedTokens, LoginCredentials, PasswordReset, Registration};
#[cfg(feature = "http")]
pub use self::http::{AuthEndpoints, HttpAuthService};

/// An asynchronous source of session tokens
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchanges a username and password for session tokens
    async fn login(&self, credentials: &LoginCredentials) -> Result<IssuedTokens, AuthServiceError>;

    /// Creates a new account
    async fn register(&self, registration: &Registration) -> Result<(), AuthServiceError>;

    /// Exchanges the refresh token for a new access token
    async fn refresh(
        &self,
        refresh_token: Option<&RefreshTokenRef>,
    ) -> Result<AccessToken, AuthServiceError>;

    /// Starts a password reset for the account with the given email address
    async fn forgot_password(&self, email: &str) -> Result<(), AuthServiceError>;

    /// Checks whether a password reset token is still usable
    async fn validate_reset_token(&self, token: &str) -> Result<bool, AuthServiceError>;

    /// Completes a password reset
    async fn reset_password(&self, reset: &PasswordReset) -> Result<(), AuthServiceError>;
}

/// An error while talking to the authentication service
#[derive(Debug, Error)]
pub enum AuthServiceError {
    /// The service answered with an error status
    #[error("authentication service returned status {status}: {body}")]
    ErrorWithBody {
        /// The HTTP status code
        status: u16,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the response body
    #[error("error deserializing response body from authentication service")]
    TokenBodyError(#[from] serde_json::Error),
    /// The response did not carry a token under any recognized field
    #[error("response from authentication service did not contain a token")]
    MissingToken,
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] Box<dyn error::Error + Send + Sync + 'static>),
    /// Unable to send the request
    #[error("error sending request to authentication service")]
    RequestSend(#[source] Box<dyn error::Error + Send + Sync + 'static>),
}

impl AuthServiceError {
    /// The HTTP status the service answered with, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ErrorWithBody { status, .. } => Some(*status),
            _ => None,
        }
    }
}
