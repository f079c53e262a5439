use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::views::ViewError;

/// JSON error body: `{"error": "...", "message": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// An error as the API reports it.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn unauthorized(error: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn internal(err: &dyn std::error::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        )
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials => {
                Self::unauthorized("invalid_credentials", message)
            }
            AuthError::RateLimited => Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message),
            AuthError::EmailTaken(_) => Self::new(StatusCode::CONFLICT, "email_taken", message),
            AuthError::InvalidToken => Self::unauthorized("invalid_token", message),
            AuthError::SessionExpired => Self::unauthorized("session_expired", message),
            AuthError::ProviderUnavailable(_) => {
                Self::new(StatusCode::BAD_REQUEST, "provider_unavailable", message)
            }
            ref e if e.is_validation() => Self::new(StatusCode::BAD_REQUEST, "invalid_input", message),
            ref e => Self::internal(e),
        }
    }
}

impl From<ViewError> for ApiError {
    fn from(err: ViewError) -> Self {
        let message = err.to_string();
        match err {
            ViewError::NotFound => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            ViewError::AccessDenied => Self::new(StatusCode::FORBIDDEN, "access_denied", message),
            ViewError::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            ViewError::InviteMismatch(_) => {
                Self::new(StatusCode::CONFLICT, "invite_mismatch", message)
            }
            ViewError::MissingField(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
            }
            ViewError::Auth(e) => e.into(),
            ref e => Self::internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (AuthError::RateLimited.into(), StatusCode::TOO_MANY_REQUESTS),
            (
                AuthError::EmailTaken("a@x.com".into()).into(),
                StatusCode::CONFLICT,
            ),
            (AuthError::WeakPassword(6).into(), StatusCode::BAD_REQUEST),
            (ViewError::NotFound.into(), StatusCode::NOT_FOUND),
            (ViewError::AccessDenied.into(), StatusCode::FORBIDDEN),
            (ViewError::Forbidden(Role::Viewer).into(), StatusCode::FORBIDDEN),
            (
                ViewError::Auth(AuthError::SessionExpired).into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ViewError::Store(sqlx::Error::PoolClosed).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{:?}", err);
        }
    }
}
