//! Session and token lifecycle management for the Tandem client
//!
//! A [`Session`] owns the client's access and refresh tokens. It persists them
//! through a [`TokenStore`][store::TokenStore], decodes the access token into a
//! [`DecodedIdentity`] and publishes that identity to anyone watching.
//!
//! Access tokens are short-lived. When one expires or is rejected, every caller
//! that needs a new one goes through the session's [`RefreshCoordinator`],
//! which makes sure that only one call to the refresh endpoint is in flight
//! at a time. When that call fails, the session is cleared and a single
//! [`SessionEvent::LoggedOut`] is broadcast.
//!
//! A [`ProactiveRefreshScheduler`] can be spawned to refresh the access token
//! shortly before it expires, so that requests rarely see a 401 at all.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tandem_session::{
//!     service::{AuthEndpoints, HttpAuthService},
//!     store::InMemoryTokenStore,
//!     ProactiveRefreshScheduler, Session,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoints = AuthEndpoints::new("https://api.example.com/auth".parse()?)?;
//! let service = HttpAuthService::new(reqwest::Client::new(), endpoints);
//!
//! let session = Session::start(Arc::new(InMemoryTokenStore::new()), Arc::new(service));
//! let scheduler = ProactiveRefreshScheduler::new(session.clone()).spawn();
//!
//! let mut identity = session.watch_identity();
//! tokio::spawn(async move {
//!     while let Ok(current) = identity.changed().await {
//!         tracing::info!(logged_in = current.is_some(), "identity changed");
//!     }
//! });
//! # scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! The following features are supported by this crate:
//!
//! * `file` (default): Provides [`FileTokenStore`][store::FileTokenStore], a
//!   token store persisted to the local filesystem.
//! * `http` (default): Provides [`HttpAuthService`][service::HttpAuthService],
//!   which talks to the authentication endpoints over [reqwest].
//! * `test-util`: Provides test doubles in the [`testing`] module.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod config;
pub mod decode;
mod error;
pub mod refresh;
pub mod scheduler;
pub mod service;
mod session;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
mod watcher;

pub use braids::*;
pub use config::SessionConfig;
pub use decode::DecodedIdentity;
pub use error::{AuthFailure, AuthFailureKind};
pub use refresh::{RefreshCoordinator, RefreshError, RefreshStatus};
pub use scheduler::{ProactiveRefreshScheduler, SchedulerHandle, TickOutcome};
pub use session::{LogoutReason, Session, SessionBuilder, SessionError, SessionEvent};
pub use watcher::{IdentityWatcher, SessionClosed};
