use std::{collections::BTreeSet, fmt};

use predicates::{reflection, Predicate};
use reqwest::Request;

/// The path segments that identify token exchange endpoints by default
pub const DEFAULT_EXCHANGE_ENDPOINTS: &[&str] = &[
    "login",
    "register",
    "forgot-password",
    "validate-reset-token",
    "reset-password",
    "refresh-token",
];

/// Matches requests to the authentication exchange endpoints
///
/// A request matches when the last non-empty segment of its URL path is one
/// of the configured names. Exchange endpoints are sent without the session's
/// access token, and a 401 from one of them is an answer rather than a reason
/// to refresh.
#[derive(Clone, Debug)]
pub struct ExchangeEndpoints {
    names: BTreeSet<String>,
}

impl ExchangeEndpoints {
    /// Matches requests whose last path segment is one of `names`
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    fn endpoint_of(req: &Request) -> Option<&str> {
        req.url()
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
    }
}

impl Default for ExchangeEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_ENDPOINTS.iter().copied())
    }
}

impl Predicate<Request> for ExchangeEndpoints {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        Self::endpoint_of(req).map_or(false, |name| self.names.contains(name))
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "endpoint",
                    Self::endpoint_of(req).unwrap_or("<none>").to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for ExchangeEndpoints {}
impl fmt::Display for ExchangeEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("endpoint in [")?;
        for (idx, name) in self.names.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str("]")
    }
}
