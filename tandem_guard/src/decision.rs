use std::fmt;

use serde::Deserialize;
use tandem_session::{Role, RoleRef};

/// Where to send a navigation that a guard refused
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RedirectTarget {
    /// The login screen
    Login,
    /// The landing area for administrators
    AdminHome,
    /// The landing area for regular users
    UserHome,
    /// The screen for creating a partner pairing
    CreatePairing,
}

impl RedirectTarget {
    /// The default route path for this target
    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::AdminHome => "/admin",
            Self::UserHome => "/user",
            Self::CreatePairing => "/pairing/create",
        }
    }

    /// The landing area for a user holding `role`
    pub fn home_for(role: &RoleRef) -> Self {
        if role.is_admin() {
            Self::AdminHome
        } else {
            Self::UserHome
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// The outcome of a guard
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    /// The navigation may proceed
    Allow,
    /// The navigation must go somewhere else instead
    Redirect(RedirectTarget),
}

impl Decision {
    /// Whether the navigation may proceed
    #[inline]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The redirect target, if the navigation was refused
    #[inline]
    pub const fn redirect(self) -> Option<RedirectTarget> {
        match self {
            Self::Allow => None,
            Self::Redirect(target) => Some(target),
        }
    }
}

/// The metadata of a route that guards decide on
///
/// Routing tables can be deserialized directly, with the role list under
/// `requiredRoles`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    /// The route's path
    pub path: String,

    /// Roles of which the user must hold at least one; empty means any role
    #[serde(default)]
    pub required_roles: Vec<Role>,
}

impl RouteMeta {
    /// A route open to any authenticated user
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            required_roles: Vec::new(),
        }
    }

    /// Restricts the route to users holding one of `roles`
    pub fn requiring<I>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        self.required_roles.extend(roles);
        self
    }

    /// Whether a user holding `role` meets the route's role requirement
    pub fn admits(&self, role: &RoleRef) -> bool {
        self.required_roles.is_empty() || self.required_roles.iter().any(|r| **r == *role)
    }
}
