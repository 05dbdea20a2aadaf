use thiserror::Error;

/// Errors surfaced by the session and token lifecycle.
///
/// Transport failures are folded into `AuthenticationFailed` so callers see a
/// single failure surface for auth problems. The enum is `Clone` because one
/// renewal outcome is delivered to every caller queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The service returned a structurally invalid success payload.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The service rejected the credentials or token, or the request never
    /// completed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A renewal was attempted with no refresh token on record.
    #[error("no refresh token on record")]
    MissingRefreshToken,
}

/// Maximum length for error response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid carrying excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => AuthError::AuthenticationFailed("unauthorized".to_string()),
            _ => AuthError::AuthenticationFailed(format!(
                "status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::MalformedResponse(err.to_string())
        } else {
            AuthError::AuthenticationFailed(err.to_string())
        }
    }
}
