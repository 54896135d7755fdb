//! Route access guards for the Tandem client
//!
//! A [`Guard`] looks at the current session and the metadata of the route
//! being navigated to, and decides whether to [allow][Decision::Allow] the
//! navigation or [redirect][Decision::Redirect] elsewhere. Guards only read
//! the session; acting on the decision is up to the routing layer.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tandem_guard::{AllOf, AuthGuard, Decision, Guard, RedirectTarget, RoleGuard, RouteMeta};
//! use tandem_session::Role;
//! # use tandem_session::{store::InMemoryTokenStore, testing::FakeAuthService, Session};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! # let session = Session::start(Arc::new(InMemoryTokenStore::new()), Arc::new(FakeAuthService::new()));
//! let guard = AllOf::new()
//!     .and(AuthGuard::new(session.clone()))
//!     .and(RoleGuard::new(session));
//!
//! let route = RouteMeta::new("/admin/users").requiring([Role::admin()]);
//!
//! // Nobody is logged in yet
//! assert_eq!(
//!     guard.check(&route).await,
//!     Decision::Redirect(RedirectTarget::Login)
//! );
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
    unused_must_use
)]
#![forbid(unsafe_code)]

mod auth;
mod decision;
mod guard;
mod pairing;
mod role;

pub use auth::AuthGuard;
pub use decision::{Decision, RedirectTarget, RouteMeta};
pub use guard::{AllOf, Guard};
pub use pairing::{PairingGuard, PairingLookup, PairingLookupError, PairingStatus};
pub use role::RoleGuard;
