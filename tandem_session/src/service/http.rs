//! An authentication service reached over HTTP

use async_trait::async_trait;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;

use super::{
    dto::{self, ForgotPassword, RefreshRequest, ResetTokenCheck},
    AuthService, AuthServiceError, IssuedTokens, LoginCredentials, PasswordReset, Registration,
};
use crate::{AccessToken, RefreshTokenRef};

/// Locations of the authentication exchange endpoints
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// Login endpoint
    pub login: Url,
    /// Registration endpoint
    pub register: Url,
    /// Token refresh endpoint
    pub refresh: Url,
    /// Forgotten password endpoint
    pub forgot_password: Url,
    /// Reset token validation endpoint
    pub validate_reset_token: Url,
    /// Password reset endpoint
    pub reset_password: Url,
}

impl AuthEndpoints {
    /// Constructs the default endpoint layout under `base_url`
    ///
    /// The endpoints are `login`, `register`, `refresh-token`,
    /// `forgot-password`, `validate-reset-token`, and `reset-password`,
    /// each relative to the base URL.
    pub fn new(mut base_url: Url) -> Result<Self, url::ParseError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            login: base_url.join("login")?,
            register: base_url.join("register")?,
            refresh: base_url.join("refresh-token")?,
            forgot_password: base_url.join("forgot-password")?,
            validate_reset_token: base_url.join("validate-reset-token")?,
            reset_password: base_url.join("reset-password")?,
        })
    }
}

/// An [`AuthService`] that posts JSON to the backend's exchange endpoints
#[derive(Clone, Debug)]
pub struct HttpAuthService {
    client: ClientWithMiddleware,
    endpoints: AuthEndpoints,
}

impl HttpAuthService {
    /// Constructs a new HTTP authentication service
    pub fn new(client: impl Into<ClientWithMiddleware>, endpoints: AuthEndpoints) -> Self {
        Self {
            client: client.into(),
            endpoints,
        }
    }

    /// The endpoints this service talks to
    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    #[tracing::instrument(err, skip(self, url, payload), fields(url = %url))]
    async fn post_json<P>(&self, url: &Url, payload: &P) -> Result<Value, AuthServiceError>
    where
        P: Serialize + Sync + ?Sized,
    {
        tracing::trace!("sending request to authentication service");

        let resp = self
            .client
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| AuthServiceError::RequestSend(e.into()))?;

        let status = resp.status();

        tracing::debug!(
            response.status = status.as_u16(),
            "received response from authentication service"
        );

        if !status.is_success() {
            let body = resp
                .text()
                .await
                .map_err(|e| AuthServiceError::BodyReadError(e.into()))?;
            return Err(AuthServiceError::ErrorWithBody {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AuthServiceError::BodyReadError(e.into()))?;

        if body.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(serde_json::from_slice(&body)?)
        }
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<IssuedTokens, AuthServiceError> {
        let body = self.post_json(&self.endpoints.login, credentials).await?;
        let tokens = dto::extract_tokens(&body)?;

        tracing::info!(
            username = %credentials.username,
            has_refresh_token = tokens.refresh_token.is_some(),
            "received session tokens"
        );

        Ok(tokens)
    }

    async fn register(&self, registration: &Registration) -> Result<(), AuthServiceError> {
        self.post_json(&self.endpoints.register, registration)
            .await
            .map(drop)
    }

    async fn refresh(
        &self,
        refresh_token: Option<&RefreshTokenRef>,
    ) -> Result<AccessToken, AuthServiceError> {
        let body = self
            .post_json(&self.endpoints.refresh, &RefreshRequest { refresh_token })
            .await?;

        Ok(dto::extract_tokens(&body)?.access_token)
    }

    async fn forgot_password(&self, email: &str) -> Result<(), AuthServiceError> {
        self.post_json(&self.endpoints.forgot_password, &ForgotPassword { email })
            .await
            .map(drop)
    }

    async fn validate_reset_token(&self, token: &str) -> Result<bool, AuthServiceError> {
        match self
            .post_json(&self.endpoints.validate_reset_token, &ResetTokenCheck { token })
            .await
        {
            Ok(body) => Ok(dto::reset_token_validity(&body)),
            Err(AuthServiceError::ErrorWithBody { status, .. }) if (400..500).contains(&status) => {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    async fn reset_password(&self, reset: &PasswordReset) -> Result<(), AuthServiceError> {
        self.post_json(&self.endpoints.reset_password, reset)
            .await
            .map(drop)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Arc, Mutex};

    use reqwest::{Request, Response};
    use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next, Result};

    /// A request as seen by [`CannedResponder`]
    #[derive(Clone, Debug)]
    pub struct SeenRequest {
        pub path: String,
        pub body: serde_json::Value,
    }

    /// Answers every request with the same status and body without touching the network
    #[derive(Clone)]
    pub struct CannedResponder {
        status: u16,
        body: String,
        pub seen: Arc<Mutex<Vec<SeenRequest>>>,
    }

    impl CannedResponder {
        pub fn new(status: u16, body: impl Into<String>) -> Self {
            Self {
                status,
                body: body.into(),
                seen: Arc::default(),
            }
        }

        pub fn client(&self) -> ClientWithMiddleware {
            ClientBuilder::new(reqwest::Client::new())
                .with(self.clone())
                .build()
        }

        pub fn seen(&self) -> Vec<SeenRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Middleware for CannedResponder {
        async fn handle(
            &self,
            req: Request,
            _: &mut http::Extensions,
            _: Next<'_>,
        ) -> Result<Response> {
            let body = req
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| serde_json::from_slice(b).unwrap())
                .unwrap_or(serde_json::Value::Null);

            self.seen.lock().unwrap().push(SeenRequest {
                path: req.url().path().to_owned(),
                body,
            });

            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .unwrap();
            Ok(resp.into())
        }
    }
}
