//! Error-to-response mapping.
//!
//! Infrastructure details are logged here and replaced by a generic message;
//! clients never see store or hashing errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::{AdminError, LoginError, ResetError};

pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Service temporarily unavailable. Please try again later.";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<String>,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub(crate) fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub(crate) fn internal(err: &anyhow::Error) -> Self {
        error!("Internal error: {err:#}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVICE_UNAVAILABLE_MESSAGE)
    }

    pub(crate) fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    #[cfg(test)]
    pub(crate) const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
            }
            LoginError::TooManyAttempts => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please try again later.",
            ),
            LoginError::AccountDisabled => Self::new(
                StatusCode::FORBIDDEN,
                "Your account has been disabled. Please contact an administrator.",
            ),
            LoginError::NoPasswordSet => Self::new(
                StatusCode::UNAUTHORIZED,
                "No password set for this account. Please request a password reset.",
            ),
            LoginError::Internal(err) => Self::internal(&err),
        }
    }
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::InvalidToken => {
                Self::new(StatusCode::BAD_REQUEST, "Invalid or expired reset link")
            }
            ResetError::Policy(violation) => {
                Self::new(StatusCode::BAD_REQUEST, "Password does not meet requirements")
                    .with_details(violation.messages().into_iter().map(str::to_string).collect())
            }
            ResetError::Internal(err) => Self::internal(&err),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Forbidden => Self::new(StatusCode::FORBIDDEN, "Admin role required"),
            AdminError::NotFound => Self::new(StatusCode::NOT_FOUND, "User not found"),
            AdminError::Blocked(reason) => Self::new(StatusCode::CONFLICT, reason),
            AdminError::InvalidEmail => Self::new(StatusCode::BAD_REQUEST, "Invalid email"),
            AdminError::EmailTaken => {
                Self::new(StatusCode::CONFLICT, "Email is already registered")
            }
            AdminError::Policy(violation) => {
                Self::new(StatusCode::BAD_REQUEST, "Password does not meet requirements")
                    .with_details(violation.messages().into_iter().map(str::to_string).collect())
            }
            AdminError::Internal(err) => Self::internal(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{PolicyRule, PolicyViolation};

    #[test]
    fn credential_errors_share_one_status() {
        assert_eq!(
            ApiError::from(LoginError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(LoginError::TooManyAttempts).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(LoginError::AccountDisabled).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(LoginError::Internal(anyhow::anyhow!("db password wrong")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, SERVICE_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn policy_violations_are_itemized() {
        let err = ApiError::from(ResetError::Policy(PolicyViolation(vec![
            PolicyRule::Uppercase,
            PolicyRule::Symbol,
        ])));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.details.len(), 2);
    }

    #[test]
    fn blocked_admin_change_is_a_conflict() {
        let err = ApiError::from(AdminError::Blocked("last admin"));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message, "last admin");
    }
}
