use axum::{
    Json,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, warn};

use super::{
    session::session_cookie,
    types::{LoginRequest, LoginResponse, UserResponse},
    utils::request_context,
};
use crate::{
    api::handlers::error::{ApiError, ErrorResponse},
    auth::{AuthService, LoginError},
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 401, description = "Invalid credentials or no password set", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse),
        (status = 500, description = "Service unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let ctx = request_context(&headers, peer, auth.config().trust_proxy_headers());
    let success = match auth
        .login(&request.email, &request.password, request.remember, &ctx)
        .await
    {
        Ok(success) => success,
        Err(err) => {
            if !matches!(err, LoginError::Internal(_)) {
                warn!(origin = ?ctx.origin, "Login failed: {err}");
            }
            return ApiError::from(err).into_response();
        }
    };

    // Session row is persisted by now; the cookie goes out last.
    let max_age = success.session.max_age_seconds(auth.now());
    let cookie = match session_cookie(auth.config(), &success.session.token, max_age) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return ApiError::internal(&anyhow::anyhow!("invalid session cookie")).into_response();
        }
    };
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    let response = LoginResponse {
        user: UserResponse::from(success.user),
        token: success.session.token,
        expires_at: success.session.expires_at,
    };
    (StatusCode::OK, response_headers, Json(response)).into_response()
}
