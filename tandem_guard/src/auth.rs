use async_trait::async_trait;
use tandem_session::{DecodedIdentity, Session};

use crate::{Decision, Guard, RedirectTarget, RouteMeta};

/// Allows navigation only while the session holds an unexpired access token
///
/// Anything else is sent to the login screen. The guard does not refresh an
/// expired token.
#[derive(Clone, Debug)]
pub struct AuthGuard {
    session: Session,
}

impl AuthGuard {
    /// Constructs a guard over the given session
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The current identity, or the redirect to send the navigation to
    pub(crate) fn identity(&self, route: &RouteMeta) -> Result<DecodedIdentity, Decision> {
        self.session.validate().map_err(|failure| {
            tracing::debug!(
                route = %route.path,
                %failure,
                "not authenticated, redirecting to login"
            );
            Decision::Redirect(RedirectTarget::Login)
        })
    }
}

#[async_trait]
impl Guard for AuthGuard {
    async fn check(&self, route: &RouteMeta) -> Decision {
        match self.identity(route) {
            Ok(_) => Decision::Allow,
            Err(redirect) => redirect,
        }
    }
}
