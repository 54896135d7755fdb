//! Test doubles for code built on top of a [`Session`][crate::Session]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tandem_clock::UnixTime;
use tokio::sync::Notify;

use crate::{
    service::{
        AuthService, AuthServiceError, IssuedTokens, LoginCredentials, PasswordReset,
        Registration,
    },
    AccessToken, RefreshToken, RefreshTokenRef,
};

/// Builds an unsigned token carrying the given identity claims
pub fn token_for(username: &str, role: &str, iat: UnixTime, exp: UnixTime) -> AccessToken {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": "42",
        "username": username,
        "email": format!("{}@example.com", username),
        "role": role,
        "iat": iat.0,
        "exp": exp.0,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    AccessToken::new(format!("{}.{}.signature", header, payload))
}

/// An in-process [`AuthService`] with scripted answers
///
/// Refreshes fail with a 401 unless a token has been provided with
/// [`refreshing_to`][Self::refreshing_to]. Logins fail with a 401 unless
/// tokens have been provided with [`with_login`][Self::with_login].
#[derive(Debug, Default)]
pub struct FakeAuthService {
    refresh_calls: AtomicUsize,
    refreshed_with: Mutex<Vec<Option<RefreshToken>>>,
    next_refresh: Mutex<Option<AccessToken>>,
    login_tokens: Mutex<Option<IssuedTokens>>,
    gate: Option<Arc<Notify>>,
}

impl FakeAuthService {
    /// Constructs a service where every call fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes will succeed with `token`
    pub fn refreshing_to(self, token: AccessToken) -> Self {
        *self.next_refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self
    }

    /// Logins will succeed with `tokens`
    pub fn with_login(self, tokens: IssuedTokens) -> Self {
        *self.login_tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        self
    }

    /// Refreshes will wait until the returned gate is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Number of refresh calls received so far
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::Acquire)
    }

    /// The refresh tokens presented to each refresh call, in order
    pub fn refreshed_with(&self) -> Vec<Option<RefreshToken>> {
        self.refreshed_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn unauthorized() -> AuthServiceError {
        AuthServiceError::ErrorWithBody {
            status: 401,
            body: "unauthorized".to_owned(),
        }
    }
}

#[async_trait]
impl AuthService for FakeAuthService {
    async fn login(&self, _: &LoginCredentials) -> Result<IssuedTokens, AuthServiceError> {
        self.login_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(Self::unauthorized)
    }

    async fn register(&self, _: &Registration) -> Result<(), AuthServiceError> {
        Ok(())
    }

    async fn refresh(
        &self,
        refresh_token: Option<&RefreshTokenRef>,
    ) -> Result<AccessToken, AuthServiceError> {
        self.refresh_calls.fetch_add(1, Ordering::AcqRel);
        self.refreshed_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(refresh_token.map(ToOwned::to_owned));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.next_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(Self::unauthorized)
    }

    async fn forgot_password(&self, _: &str) -> Result<(), AuthServiceError> {
        Ok(())
    }

    async fn validate_reset_token(&self, _: &str) -> Result<bool, AuthServiceError> {
        Ok(true)
    }

    async fn reset_password(&self, _: &PasswordReset) -> Result<(), AuthServiceError> {
        Ok(())
    }
}
