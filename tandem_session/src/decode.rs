//! Reading identity claims out of an access token
//!
//! The payload is read without verifying the signature. The client only uses
//! these claims to decide what to show and when to refresh; the backend is the
//! one that actually trusts or rejects the token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use tandem_clock::{DurationSecs, UnixTime};

use crate::{AccessTokenRef, AuthFailure, AuthFailureKind, Role, Username};

/// The identity claims carried by an access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedIdentity {
    /// The `sub` claim
    pub subject_id: String,
    /// The `username` claim
    pub username: Username,
    /// The `email` claim
    pub email: String,
    /// The `role` claim
    pub role: Role,
    /// The `iat` claim
    pub issued_at: UnixTime,
    /// The `exp` claim
    pub expires_at: UnixTime,
}

impl DecodedIdentity {
    /// Whether the token this identity came from is past its expiry at `now`
    #[inline]
    pub fn is_expired_at(&self, now: UnixTime) -> bool {
        self.expires_at < now
    }

    /// Time remaining until expiry as of `now`, zero once expired
    #[inline]
    pub fn until_expired_at(&self, now: UnixTime) -> DurationSecs {
        self.expires_at - now
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: Subject,
    username: Username,
    email: String,
    role: Role,
    iat: UnixTime,
    exp: UnixTime,
}

/// Backends disagree on whether the subject is a string or a numeric id
#[derive(Deserialize)]
#[serde(untagged)]
enum Subject {
    Text(String),
    Number(u64),
}

impl From<Subject> for String {
    fn from(sub: Subject) -> Self {
        match sub {
            Subject::Text(s) => s,
            Subject::Number(n) => n.to_string(),
        }
    }
}

/// Decodes the identity claims from an access token
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload carrying the expected claims.
pub fn decode(token: &AccessTokenRef) -> Option<DecodedIdentity> {
    match try_decode(token) {
        Ok(identity) => Some(identity),
        Err(failure) => {
            tracing::trace!(%failure, "access token could not be decoded");
            None
        }
    }
}

pub(crate) fn try_decode(token: &AccessTokenRef) -> Result<DecodedIdentity, AuthFailure> {
    let mut segments = token.as_str().split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(AuthFailure::new(
                AuthFailureKind::Decode,
                "token does not have three segments",
            ))
        }
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthFailure::new(AuthFailureKind::Decode, e.to_string()))?;

    let claims: Claims = serde_json::from_slice(&raw)
        .map_err(|e| AuthFailure::new(AuthFailureKind::Decode, e.to_string()))?;

    Ok(DecodedIdentity {
        subject_id: claims.sub.into(),
        username: claims.username,
        email: claims.email,
        role: claims.role,
        issued_at: claims.iat,
        expires_at: claims.exp,
    })
}

/// Whether a token should be treated as expired at `now`
///
/// Absent and undecodable tokens count as expired.
pub fn is_expired(token: Option<&AccessTokenRef>, now: UnixTime) -> bool {
    token
        .and_then(decode)
        .map_or(true, |identity| identity.is_expired_at(now))
}

/// Whether a token is expired or will expire within `threshold` of `now`
pub fn expires_within(
    token: Option<&AccessTokenRef>,
    now: UnixTime,
    threshold: DurationSecs,
) -> bool {
    token.and_then(decode).map_or(true, |identity| {
        identity.is_expired_at(now) || identity.until_expired_at(now) <= threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::token_for, AccessToken};

    const NOW: UnixTime = UnixTime(1_700_000_000);

    mod decode {
        use super::*;

        #[test]
        fn reads_all_identity_claims() {
            let token = token_for("ana", "USER", NOW, NOW + DurationSecs(900));

            let identity = super::super::decode(&token).unwrap();

            assert_eq!(identity.subject_id, "42");
            assert_eq!(identity.username.as_str(), "ana");
            assert_eq!(identity.email, "ana@example.com");
            assert_eq!(identity.role, Role::user());
            assert_eq!(identity.issued_at, NOW);
            assert_eq!(identity.expires_at, UnixTime(1_700_000_900));
        }

        #[test]
        fn accepts_numeric_subjects_and_padded_payloads() {
            let payload = base64::engine::general_purpose::URL_SAFE.encode(
                serde_json::json!({
                    "sub": 7,
                    "username": "bo",
                    "email": "bo@example.com",
                    "role": "ADMIN",
                    "iat": 1,
                    "exp": 2,
                })
                .to_string(),
            );
            let token = AccessToken::new(format!("h.{}.s", payload));

            let identity = super::super::decode(&token).unwrap();
            assert_eq!(identity.subject_id, "7");
            assert!(identity.role.is_admin());
        }

        #[test]
        fn malformed_tokens_decode_to_none() {
            let cases = [
                "",
                "h.p.s",
                "only-one-segment",
                "two.segments",
                "a.b.c.d",
                "h.!!!not-base64!!!.s",
                "h.bm90IGpzb24.s",
            ];

            for case in cases {
                let token = AccessToken::new(case.to_owned());
                assert_eq!(super::super::decode(&token), None, "case {:?}", case);
            }
        }

        #[test]
        fn missing_claims_decode_to_none() {
            let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"1","username":"ana"}"#);
            let token = AccessToken::new(format!("h.{}.s", payload));
            assert_eq!(super::super::decode(&token), None);
        }
    }

    mod is_expired {
        use super::*;

        #[test]
        fn absent_token_is_expired() {
            assert!(super::super::is_expired(None, NOW));
        }

        #[test]
        fn undecodable_token_is_expired() {
            let token = AccessToken::from_static("h.p.s");
            assert!(super::super::is_expired(Some(&token), NOW));
        }

        #[test]
        fn past_expiry_is_expired() {
            let token = token_for("ana", "USER", NOW - DurationSecs(1000), NOW - DurationSecs(1));
            assert!(super::super::is_expired(Some(&token), NOW));
        }

        #[test]
        fn future_expiry_is_not_expired() {
            let token = token_for("ana", "USER", NOW, NOW + DurationSecs(900));
            assert!(!super::super::is_expired(Some(&token), NOW));
        }

        #[test]
        fn expiring_exactly_now_is_not_yet_expired() {
            let token = token_for("ana", "USER", NOW - DurationSecs(900), NOW);
            assert!(!super::super::is_expired(Some(&token), NOW));
        }
    }

    mod expires_within {
        use super::*;

        const THRESHOLD: DurationSecs = DurationSecs(300);

        #[test]
        fn token_inside_threshold_is_due() {
            let token = token_for("ana", "USER", NOW, NOW + DurationSecs(299));
            assert!(super::super::expires_within(Some(&token), NOW, THRESHOLD));
        }

        #[test]
        fn token_outside_threshold_is_not_due() {
            let token = token_for("ana", "USER", NOW, NOW + DurationSecs(301));
            assert!(!super::super::expires_within(Some(&token), NOW, THRESHOLD));
        }

        #[test]
        fn absent_token_is_due() {
            assert!(super::super::expires_within(None, NOW, THRESHOLD));
        }
    }
}
