//! Session lifetime configuration

use std::time::Duration;

use serde::Deserialize;
use tandem_clock::DurationSecs;

/// Nominal lifetime of an access token issued by the backend
pub const ACCESS_TOKEN_LIFETIME: DurationSecs = DurationSecs(900);

/// Nominal lifetime of a refresh token issued by the backend
///
/// Refresh tokens are opaque to the client. Once one lapses, the next refresh
/// fails and the session ends.
pub const REFRESH_TOKEN_LIFETIME: DurationSecs = DurationSecs(7 * 24 * 60 * 60);

/// How close to expiry an access token may get before it is refreshed ahead of time
pub const REFRESH_THRESHOLD: DurationSecs = DurationSecs(300);

/// Period of the proactive refresh timer
///
/// Fourteen minutes sits inside the access token lifetime with a margin to spare.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(840_000);

/// Configuration for how the session keeps its access token fresh
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    access_token_lifetime: DurationSecs,
    refresh_threshold: DurationSecs,
    #[serde(with = "millis")]
    refresh_interval: Duration,
}

impl Default for SessionConfig {
    /// Default session configuration
    ///
    /// Uses a 900 second access token lifetime, a 300 second refresh threshold
    /// and a 14 minute proactive refresh interval.
    fn default() -> Self {
        Self {
            access_token_lifetime: ACCESS_TOKEN_LIFETIME,
            refresh_threshold: REFRESH_THRESHOLD,
            refresh_interval: REFRESH_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Sets the nominal lifetime of access tokens issued by the backend
    pub fn with_access_token_lifetime(mut self, access_token_lifetime: DurationSecs) -> Self {
        self.access_token_lifetime = access_token_lifetime;
        self
    }

    /// Sets the threshold within which a token still counts as due for refresh
    pub fn with_refresh_threshold(mut self, refresh_threshold: DurationSecs) -> Self {
        self.refresh_threshold = refresh_threshold;
        self
    }

    /// Sets the period of the proactive refresh timer
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Nominal access token lifetime
    ///
    /// A refresh interval at least this long lets tokens expire between
    /// proactive refreshes.
    #[inline]
    pub fn access_token_lifetime(&self) -> DurationSecs {
        self.access_token_lifetime
    }

    /// Threshold before expiry at which a refresh is due
    #[inline]
    pub fn refresh_threshold(&self) -> DurationSecs {
        self.refresh_threshold
    }

    /// Period of the proactive refresh timer
    #[inline]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_fits_inside_the_access_token_lifetime() {
        let config = SessionConfig::default();
        assert!(config.refresh_interval() < Duration::from(config.access_token_lifetime()));
        assert_eq!(config.refresh_interval(), Duration::from_secs(14 * 60));
    }

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "refreshThreshold": 120, "refreshInterval": 60000 }"#)
                .unwrap();

        assert_eq!(config.refresh_threshold(), DurationSecs(120));
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.access_token_lifetime(), ACCESS_TOKEN_LIFETIME);
    }
}
