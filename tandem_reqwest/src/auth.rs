use bytes::{BufMut, BytesMut};
use predicates::Predicate;
use reqwest::{header, Request, Response, StatusCode};
use reqwest_middleware::{Middleware, Next, Result};
use tandem_session::{AccessTokenRef, Session};

use crate::ExchangeEndpoints;

/// A middleware that authorizes outgoing requests with the session's access token
///
/// Requests to exchange endpoints are passed through untouched. Any other
/// request is sent with `Authorization: Bearer <token>` if the session holds
/// an access token and the caller has not set the header already.
///
/// When a request comes back `401 Unauthorized`, the middleware asks the
/// session for a refresh. If that succeeds, the request is sent once more
/// with the new token. If it fails, the original response is returned; the
/// session has been cleared by then. Requests whose body cannot be cloned
/// are not retried, and neither are requests sent without a token.
#[derive(Clone, Debug)]
pub struct SessionAuthMiddleware<P = ExchangeEndpoints> {
    session: Session,
    exchange: P,
}

impl SessionAuthMiddleware {
    /// Construct a new middleware for the given session
    ///
    /// By default, requests are recognized as exchange requests with
    /// [`ExchangeEndpoints::default()`]. To change this behavior, provide a
    /// custom predicate with [`with_exchange_predicate()`][Self::with_exchange_predicate()].
    pub fn new(session: Session) -> Self {
        Self {
            session,
            exchange: ExchangeEndpoints::default(),
        }
    }

    /// Replaces the predicate that recognizes exchange requests
    pub fn with_exchange_predicate<P>(self, exchange: P) -> SessionAuthMiddleware<P> {
        SessionAuthMiddleware {
            session: self.session,
            exchange,
        }
    }
}

impl<P> SessionAuthMiddleware<P> {
    fn current_token(&self) -> Option<header::HeaderValue> {
        let token = self.session.access_token()?;

        if tracing::enabled!(tracing::Level::TRACE) {
            let now = self.session.now();
            match tandem_session::decode::decode(&token) {
                Some(identity) => tracing::trace!(
                    token.username = %identity.username,
                    token.issued = identity.issued_at.0,
                    token.expiry = identity.expires_at.0,
                    token.until_expired = identity.until_expired_at(now).0,
                    "obtained access token"
                ),
                None => tracing::trace!("obtained undecodable access token"),
            }
        }

        bearer(&token)
    }
}

pub(crate) fn bearer(token: &AccessTokenRef) -> Option<header::HeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());

    match header::HeaderValue::from_maybe_shared(header_value) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("access token is not a valid header value, not attaching");
            None
        }
    }
}

#[async_trait::async_trait]
impl<P> Middleware for SessionAuthMiddleware<P>
where
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if self.exchange.eval(&req) {
            return next.run(req, extensions).await;
        }

        if req.headers().contains_key(header::AUTHORIZATION) {
            tracing::trace!("request already carries authorization, leaving it in place");
            return next.run(req, extensions).await;
        }

        let Some(value) = self.current_token() else {
            tracing::trace!("no access token, sending request without authorization");
            return next.run(req, extensions).await;
        };
        req.headers_mut().insert(header::AUTHORIZATION, value);

        let retry = req.try_clone();
        let response = next.clone().run(req, extensions).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let mut retry = match retry {
            Some(retry) => retry,
            None => {
                tracing::debug!(
                    url = %response.url(),
                    "request was unauthorized but its body cannot be replayed, not retrying"
                );
                return Ok(response);
            }
        };

        tracing::debug!(
            url = %response.url(),
            "request was unauthorized, refreshing access token"
        );

        match self.session.refresh().await {
            Ok(token) => {
                match bearer(&token) {
                    Some(value) => {
                        retry.headers_mut().insert(header::AUTHORIZATION, value);
                    }
                    None => return Ok(response),
                }
                tracing::debug!(
                    url = %retry.url(),
                    "retrying request with refreshed access token"
                );
                next.run(retry, extensions).await
            }
            Err(error) => {
                tracing::warn!(
                    url = %response.url(),
                    error = (&error as &dyn std::error::Error),
                    "unable to refresh access token after unauthorized response"
                );
                Ok(response)
            }
        }
    }
}
