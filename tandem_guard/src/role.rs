use async_trait::async_trait;
use tandem_session::Session;

use crate::{AuthGuard, Decision, Guard, RedirectTarget, RouteMeta};

/// Allows navigation only to users holding one of the route's required roles
///
/// Unauthenticated navigation goes to login. A user lacking the role is sent
/// to the landing area for the role they do hold.
#[derive(Clone, Debug)]
pub struct RoleGuard {
    auth: AuthGuard,
}

impl RoleGuard {
    /// Constructs a guard over the given session
    pub fn new(session: Session) -> Self {
        Self {
            auth: AuthGuard::new(session),
        }
    }
}

#[async_trait]
impl Guard for RoleGuard {
    async fn check(&self, route: &RouteMeta) -> Decision {
        let identity = match self.auth.identity(route) {
            Ok(identity) => identity,
            Err(redirect) => return redirect,
        };

        if route.admits(&identity.role) {
            return Decision::Allow;
        }

        let target = RedirectTarget::home_for(&identity.role);
        tracing::debug!(
            route = %route.path,
            role = %identity.role,
            redirect = %target,
            "role not permitted on route"
        );
        Decision::Redirect(target)
    }
}

#[cfg(test)]
mod tests {
    use tandem_session::Role;

    use super::*;
    use crate::test_util::{logged_in_as, logged_out};

    fn admin_route() -> RouteMeta {
        RouteMeta::new("/admin/users").requiring([Role::admin()])
    }

    #[tokio::test]
    async fn no_required_roles_allows_any_authenticated_user() {
        let guard = RoleGuard::new(logged_in_as("ana", "USER"));
        assert_eq!(
            guard.check(&RouteMeta::new("/notes")).await,
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn unauthenticated_users_go_to_login_first() {
        let guard = RoleGuard::new(logged_out());
        assert_eq!(
            guard.check(&RouteMeta::new("/notes")).await,
            Decision::Redirect(RedirectTarget::Login)
        );
    }

    #[tokio::test]
    async fn user_is_denied_an_admin_route_and_sent_home() {
        let guard = RoleGuard::new(logged_in_as("ana", "USER"));
        assert_eq!(
            guard.check(&admin_route()).await,
            Decision::Redirect(RedirectTarget::UserHome)
        );
    }

    #[tokio::test]
    async fn admin_is_allowed_an_admin_route() {
        let guard = RoleGuard::new(logged_in_as("root", "ADMIN"));
        assert_eq!(guard.check(&admin_route()).await, Decision::Allow);
    }

    #[tokio::test]
    async fn admin_is_denied_a_user_route_and_sent_to_admin_home() {
        let guard = RoleGuard::new(logged_in_as("root", "ADMIN"));
        let route = RouteMeta::new("/user/pairing").requiring([Role::user()]);
        assert_eq!(
            guard.check(&route).await,
            Decision::Redirect(RedirectTarget::AdminHome)
        );
    }

    #[tokio::test]
    async fn any_of_several_roles_is_enough() {
        let guard = RoleGuard::new(logged_in_as("ana", "USER"));
        let route = RouteMeta::new("/notes").requiring([Role::admin(), Role::user()]);
        assert_eq!(guard.check(&route).await, Decision::Allow);
    }
}
