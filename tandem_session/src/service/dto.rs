//! DTOs for the authentication exchange endpoints

use serde::Serialize;
use serde_json::Value;

use super::AuthServiceError;
use crate::{AccessToken, Password, RefreshToken, RefreshTokenRef, Username};

/// Field names that may carry the access token in a login or refresh response
///
/// Backends in the wild disagree on the name, so the first non-empty string
/// found in this order wins. This is a compatibility shim: a backend that
/// starts returning two of these with different values will be read silently
/// by whichever comes first.
pub const TOKEN_FIELDS: &[&str] = &["token", "jwttoken", "accessToken", "access_token", "jwt"];

/// Field names that may carry the refresh token, checked in order
pub const REFRESH_TOKEN_FIELDS: &[&str] = &["refreshToken", "refresh_token"];

/// Login credentials
#[derive(Debug, Serialize)]
pub struct LoginCredentials {
    /// The account name
    pub username: Username,

    /// The account password
    pub password: Password,
}

/// A new account
#[derive(Debug, Serialize)]
pub struct Registration {
    /// The requested account name
    pub username: Username,

    /// The contact email address
    pub email: String,

    /// The initial password
    pub password: Password,
}

/// A completed password reset
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    /// The reset token delivered out of band
    pub token: String,

    /// The replacement password
    pub new_password: Password,
}

#[derive(Debug, Serialize)]
pub(crate) struct ForgotPassword<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetTokenCheck<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: Option<&'a RefreshTokenRef>,
}

/// Tokens issued by a successful login
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedTokens {
    /// The new access token
    pub access_token: AccessToken,

    /// The new refresh token, if the backend issued one
    pub refresh_token: Option<RefreshToken>,
}

fn first_string<'a>(body: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|field| body.get(field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}

/// Reads the issued tokens out of a response body using the recognized field names
pub fn extract_tokens(body: &Value) -> Result<IssuedTokens, AuthServiceError> {
    let access_token = first_string(body, TOKEN_FIELDS).ok_or(AuthServiceError::MissingToken)?;
    let refresh_token = first_string(body, REFRESH_TOKEN_FIELDS);

    Ok(IssuedTokens {
        access_token: AccessToken::new(access_token.to_owned()),
        refresh_token: refresh_token.map(|t| RefreshToken::new(t.to_owned())),
    })
}

/// Reads whether a reset token is valid, assuming it is if the service does not say
pub(crate) fn reset_token_validity(body: &Value) -> bool {
    body.get("valid").and_then(Value::as_bool).unwrap_or(true)
}
