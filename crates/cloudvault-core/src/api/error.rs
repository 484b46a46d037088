use reqwest::StatusCode;
use thiserror::Error;

/// A request that never produced an HTTP response.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Unreachable(String),
}

/// Why a token refresh did not produce a new access token.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("refresh request failed: {0}")]
    Transport(#[source] TransportError),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("session was cleared while the refresh was in flight")]
    SessionCleared,
}

/// Failures surfaced by the authenticated gateway.
///
/// HTTP error statuses are not gateway errors: they come back as ordinary
/// responses and are interpreted by the typed client.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The access token expired and could not be refreshed. Both tokens have
    /// been cleared by the time this is returned.
    #[error("Session expired - please log in again")]
    SessionExpired(#[source] RefreshError),
}

impl GatewayError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, GatewayError::SessionExpired(_))
    }
}

/// Check whether any error in the chain is a forced logout.
pub fn is_session_expired(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<GatewayError>()
            .is_some_and(GatewayError::is_session_expired)
    })
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the human-readable message out of `{"error": ..}` / `{"detail": ..}`
    /// bodies, falling back to the (truncated) raw body.
    fn message_from_body(body: &str) -> String {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
            for key in ["error", "detail"] {
                if let Some(serde_json::Value::String(message)) = map.get(key) {
                    return message.clone();
                }
            }
        }
        Self::truncate_body(body)
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body);
        match status.as_u16() {
            400 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "bad"),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, ""),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::CONFLICT, ""),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, ""),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_error_message_extracted_from_body() {
        let err = ApiError::from_status(StatusCode::NOT_FOUND, r#"{"error": "File not found"}"#);
        assert_eq!(err.to_string(), "Resource not found: File not found");

        let err = ApiError::from_status(
            StatusCode::FORBIDDEN,
            r#"{"detail": "You do not have permission"}"#,
        );
        assert_eq!(err.to_string(), "Access denied: You do not have permission");

        // Not a message object: keep the raw body
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"username": ["taken"]}"#);
        assert_eq!(err.to_string(), r#"Bad request: {"username": ["taken"]}"#);
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 520 total bytes)"));

        // Never split a multi-byte character
        let cyrillic = "ф".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&cyrillic);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_is_session_expired_through_context() {
        let err = anyhow::Error::from(GatewayError::SessionExpired(RefreshError::MissingRefreshToken));
        assert!(is_session_expired(&err));

        let wrapped: anyhow::Result<()> = Err(GatewayError::SessionExpired(
            RefreshError::MissingRefreshToken,
        ))
        .context("Failed to list files");
        assert!(is_session_expired(&wrapped.unwrap_err()));

        let other = anyhow::Error::from(ApiError::Unauthorized);
        assert!(!is_session_expired(&other));
    }
}
