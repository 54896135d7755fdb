//! Middleware to tie outgoing requests to a Tandem session
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`SessionAuthMiddleware`] in the middleware stack to send the
//! session's current access token with each outbound request. A request that
//! comes back `401 Unauthorized` triggers a single coordinated refresh and is
//! then retried once with the new token.
//!
//! If a request already has specified an `Authorization` header value by
//! the time that the middleware executes, the existing value will be left
//! in place, allowing overrides to be specified as required.
//!
//! [`ErrorReportingMiddleware`] hands failed requests to an [`ErrorReporter`].
//! It belongs outside the authenticator, which [`pipeline()`] takes care of.
//!
//! ```
//! use std::sync::Arc;
//!
//! use reqwest::Client;
//! use tandem_reqwest::TracingReporter;
//! # use tandem_session::{store::InMemoryTokenStore, testing::FakeAuthService, Session};
//! #
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! # let session = Session::start(Arc::new(InMemoryTokenStore::new()), Arc::new(FakeAuthService::new()));
//!
//! let client = tandem_reqwest::pipeline(Client::default(), session, TracingReporter);
//!
//! let req = client
//!     .get("https://api.example.com/couples/42/notes");
//! # async move { req
//!     .send()
//!     .await
//!     .unwrap();
//! # };
//! # }
//! ```
//!
//! The middleware recognizes the authentication exchange endpoints by the
//! last segment of the request path. The names can be replaced, or any other
//! [`Predicate`](predicates::Predicate) over requests can be used instead.
//!
//! ```
//! use tandem_reqwest::{ExchangeEndpoints, SessionAuthMiddleware};
//! # use std::sync::Arc;
//! # use tandem_session::{store::InMemoryTokenStore, testing::FakeAuthService, Session};
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! # let session = Session::start(Arc::new(InMemoryTokenStore::new()), Arc::new(FakeAuthService::new()));
//!
//! SessionAuthMiddleware::new(session)
//!     .with_exchange_predicate(ExchangeEndpoints::new(["sign-in", "renew"]));
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tandem_session::Session;

mod auth;
mod endpoints;
mod report;

pub use auth::SessionAuthMiddleware;
pub use endpoints::{ExchangeEndpoints, DEFAULT_EXCHANGE_ENDPOINTS};
pub use report::{ErrorReport, ErrorReporter, ErrorReportingMiddleware, Failure, TracingReporter};

/// Builds a client whose requests are reported on failure and authorized by the session
///
/// The error reporter runs outermost, so it sees each request's final
/// outcome after any refresh-and-retry by the authenticator.
pub fn pipeline<R>(
    client: reqwest::Client,
    session: Session,
    reporter: R,
) -> ClientWithMiddleware
where
    R: ErrorReporter + 'static,
{
    ClientBuilder::new(client)
        .with(ErrorReportingMiddleware::new(reporter))
        .with(SessionAuthMiddleware::new(session))
        .build()
}
