use std::convert::Infallible;
use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

pub const USER_HEADER: &str = "x-user";

const BEARER_PREFIX: &str = "Bearer ";

const JWT_PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Who is calling, as far as the request headers say.
///
/// Only `bearer_token` ever reaches the cluster. `user` and
/// `claimed_subject` are for audit logs and are never verified.
#[derive(Clone, Default)]
pub struct CallerIdentity {
    pub bearer_token: Option<String>,
    pub user: Option<String>,
    pub claimed_subject: Option<String>,
}

impl CallerIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let user = headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string);

        let claimed_subject = bearer_token.as_deref().and_then(unverified_jwt_subject);

        Self {
            bearer_token,
            user,
            claimed_subject,
        }
    }

    /// The `X-User` header, or `unknown`.
    pub fn user_label(&self) -> &str {
        self.user.as_deref().unwrap_or("unknown")
    }

    /// The JWT `sub` claim as sent by the caller, or an empty string.
    pub fn claimed_subject_label(&self) -> &str {
        self.claimed_subject.as_deref().unwrap_or("")
    }
}

impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerIdentity")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("claimed_subject", &self.claimed_subject)
            .finish()
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: Option<serde_json::Value>,
}

/// Reads the `sub` claim out of a JWT payload without checking the signature.
pub fn unverified_jwt_subject(token: &str) -> Option<String> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let payload = JWT_PAYLOAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;
    match claims.sub? {
        serde_json::Value::String(sub) => Some(sub),
        _ => None,
    }
}
