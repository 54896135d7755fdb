use aliri_braid::braid;
use std::fmt;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(&self.0, &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// A short-lived bearer credential
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

limited_reveal!(AccessTokenRef: "ACCESS TOKEN", 15);

/// A longer-lived credential used to obtain a new access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 5);

/// An account password, only ever sent to the login and reset endpoints
#[braid(serde, debug = "owned", display = "owned")]
pub struct Password;

limited_reveal!(PasswordRef: "PASSWORD", 0);

/// The account name carried in the `username` claim
#[braid(serde)]
pub struct Username;

/// An account role as carried in the `role` claim
#[braid(serde)]
pub struct Role;

impl Role {
    /// The administrator role
    pub const ADMIN: &'static str = "ADMIN";

    /// The regular member role
    pub const USER: &'static str = "USER";

    /// Constructs the administrator role
    pub fn admin() -> Self {
        Self::from_static(Self::ADMIN)
    }

    /// Constructs the regular member role
    pub fn user() -> Self {
        Self::from_static(Self::USER)
    }
}

impl RoleRef {
    /// Whether this is the administrator role
    pub fn is_admin(&self) -> bool {
        self.as_str() == Role::ADMIN
    }
}
