//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    types::{SessionResponse, UserResponse},
    utils::extract_session_token,
};
use crate::{
    api::handlers::error::ApiError,
    auth::{AuthConfig, AuthService, Principal},
};

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    // Any rejection reads as "no session" to avoid leaking auth state.
    match authenticate(&headers, &auth).await {
        Ok(principal) => {
            let expires_at = chrono::DateTime::from_timestamp(principal.claims.exp, 0)
                .unwrap_or_else(|| auth.now());
            let response = SessionResponse {
                user: UserResponse::from(principal.user),
                expires_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Resolve the presented credential into a principal.
///
/// # Errors
/// `401` for any missing, invalid, expired or revoked credential.
pub(crate) async fn authenticate(
    headers: &HeaderMap,
    auth: &AuthService,
) -> Result<Principal, ApiError> {
    let Some(token) = extract_session_token(headers, auth.config().cookie_name()) else {
        return Err(ApiError::unauthenticated());
    };
    auth.verify_session(&token).await.map_err(|err| {
        debug!("Session rejected: {err}");
        ApiError::unauthenticated()
    })
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked and cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers, auth.config().cookie_name()) {
        if let Err(err) = auth.logout(&token).await {
            error!("Failed to revoke session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
    max_age_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    append_cookie_attributes(config, &mut cookie);
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    append_cookie_attributes(config, &mut cookie);
    HeaderValue::from_str(&cookie)
}

fn append_cookie_attributes(config: &AuthConfig, cookie: &mut String) {
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    // Only mark cookies secure when the portal is served over HTTPS.
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_has_hardening_attributes() {
        let config = AuthConfig::new();
        let cookie = session_cookie(&config, "tok", 3600).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "sso_token=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600; Secure"
        );
    }

    #[test]
    fn cookie_domain_and_insecure_dev_mode() {
        let config = AuthConfig::new()
            .with_cookie_domain(Some(".portal.test".to_string()))
            .with_cookie_secure(false);
        let cookie = session_cookie(&config, "tok", 60).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "sso_token=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Domain=.portal.test"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(&AuthConfig::new()).unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("sso_token=;"));
        assert!(value.contains("Max-Age=0"));
    }
}
