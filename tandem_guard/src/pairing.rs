use std::{error, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use tandem_session::{Session, UsernameRef};
use thiserror::Error;

use crate::{AuthGuard, Decision, Guard, RedirectTarget, RouteMeta};

/// A user's partner pairing, as reported by the backend
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatus {
    /// The partner the user is paired with, if any
    #[serde(default)]
    pub partner_id: Option<String>,
}

impl PairingStatus {
    /// Whether the user has a partner
    #[inline]
    pub fn is_paired(&self) -> bool {
        self.partner_id.is_some()
    }
}

/// Unable to determine a user's pairing
#[derive(Debug, Error)]
#[error("unable to look up pairing status")]
pub struct PairingLookupError(#[source] Box<dyn error::Error + Send + Sync + 'static>);

impl PairingLookupError {
    /// Wraps the underlying cause
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync + 'static>>,
    {
        Self(source.into())
    }
}

/// Looks up the partner pairing of a user
#[async_trait]
pub trait PairingLookup: Send + Sync {
    /// Fetches the pairing status of the user with the given username
    async fn pairing_of(
        &self,
        username: &UsernameRef,
    ) -> Result<PairingStatus, PairingLookupError>;
}

#[async_trait]
impl<T> PairingLookup for Arc<T>
where
    T: PairingLookup + ?Sized,
{
    async fn pairing_of(
        &self,
        username: &UsernameRef,
    ) -> Result<PairingStatus, PairingLookupError> {
        T::pairing_of(self, username).await
    }
}

#[async_trait]
impl<T> PairingLookup for Box<T>
where
    T: PairingLookup + ?Sized,
{
    async fn pairing_of(
        &self,
        username: &UsernameRef,
    ) -> Result<PairingStatus, PairingLookupError> {
        T::pairing_of(self, username).await
    }
}

/// Allows navigation only to users who have a partner
///
/// Unauthenticated navigation goes to login, as does navigation for which the
/// pairing could not be looked up. A user without a partner is sent to create
/// a pairing.
#[derive(Clone, Debug)]
pub struct PairingGuard<L> {
    auth: AuthGuard,
    lookup: L,
}

impl<L> PairingGuard<L> {
    /// Constructs a guard over the given session, consulting `lookup`
    pub fn new(session: Session, lookup: L) -> Self {
        Self {
            auth: AuthGuard::new(session),
            lookup,
        }
    }
}

#[async_trait]
impl<L> Guard for PairingGuard<L>
where
    L: PairingLookup,
{
    async fn check(&self, route: &RouteMeta) -> Decision {
        let identity = match self.auth.identity(route) {
            Ok(identity) => identity,
            Err(redirect) => return redirect,
        };

        match self.lookup.pairing_of(&identity.username).await {
            Ok(status) if status.is_paired() => Decision::Allow,
            Ok(_) => {
                tracing::debug!(
                    route = %route.path,
                    username = %identity.username,
                    "user has no partner, redirecting to pairing creation"
                );
                Decision::Redirect(RedirectTarget::CreatePairing)
            }
            Err(error) => {
                tracing::warn!(
                    route = %route.path,
                    username = %identity.username,
                    error = (&error as &dyn error::Error),
                    "pairing lookup failed, redirecting to login"
                );
                Decision::Redirect(RedirectTarget::Login)
            }
        }
    }
}
