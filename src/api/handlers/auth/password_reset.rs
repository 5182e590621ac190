//! Self-service password reset.
//!
//! The request endpoint answers identically whether or not the email belongs
//! to an account, in content and in timing: the token write and email send
//! run on a background task and the outcome is only visible in logs.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, info};

use super::{
    session::clear_session_cookie,
    types::{
        MessageResponse, PasswordResetRequest, ResetCompleteRequest, ResetTokenQuery,
        ResetTokenResponse,
    },
    utils::extract_session_token,
};
use crate::{
    api::handlers::error::{ApiError, ErrorResponse},
    auth::{
        AuthService, ResetRequestOutcome,
        utils::{normalize_email, valid_email},
    },
};

pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Request accepted", body = MessageResponse),
        (status = 400, description = "Malformed email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn request_reset(
    Extension(auth): Extension<Arc<AuthService>>,
    Json(request): Json<PasswordResetRequest>,
) -> impl IntoResponse {
    if !valid_email(&normalize_email(&request.email)) {
        return ApiError::new(StatusCode::BAD_REQUEST, "Invalid email").into_response();
    }

    tokio::spawn(async move {
        match auth.request_password_reset(&request.email).await {
            Ok(ResetRequestOutcome::Sent | ResetRequestOutcome::NoSuchUser) => {}
            Ok(ResetRequestOutcome::DeliveryFailed { .. }) => {
                info!("Password reset link left for out-of-band delivery");
            }
            // Errors only occur for existing accounts, so they must look the same.
            Err(err) => error!("Failed to issue password reset: {err:#}"),
        }
    });

    let response = MessageResponse {
        message: RESET_REQUESTED_MESSAGE.to_string(),
    };
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/password-reset/verify",
    params(ResetTokenQuery),
    responses(
        (status = 200, description = "Token is valid; any presented session was revoked", body = ResetTokenResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_reset(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Query(query): Query<ResetTokenQuery>,
) -> impl IntoResponse {
    let presented = extract_session_token(&headers, auth.config().cookie_name());
    let result = auth.open_reset_link(&query.token, presented.as_deref()).await;

    // A browser that opened the link must authenticate again afterwards.
    let mut response_headers = HeaderMap::new();
    if presented.is_some() {
        if let Ok(cookie) = clear_session_cookie(auth.config()) {
            response_headers.insert(SET_COOKIE, cookie);
        }
    }

    match result {
        Ok(record) => {
            let response = ResetTokenResponse {
                email: record.email,
                expires_at: record.expires_at,
            };
            (StatusCode::OK, response_headers, Json(response)).into_response()
        }
        Err(err) => (response_headers, ApiError::from(err)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/complete",
    request_body = ResetCompleteRequest,
    responses(
        (status = 200, description = "Password updated; all sessions revoked", body = MessageResponse),
        (status = 400, description = "Invalid token or password policy violation", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn complete_reset(
    auth: Extension<Arc<AuthService>>,
    Json(request): Json<ResetCompleteRequest>,
) -> impl IntoResponse {
    match auth
        .complete_password_reset(&request.token, &request.new_password)
        .await
    {
        Ok(()) => {
            let response = MessageResponse {
                message: "Password updated. Please log in with your new password.".to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
