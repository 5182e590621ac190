use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{
    CreateUserRequest, CreateUserResponse, RevokeSessionsResponse, UpdateUserRequest,
    UserListResponse,
};
use crate::{
    api::handlers::{
        auth::{
            authenticate,
            types::{ResetOutcomeResponse, UserResponse},
        },
        error::{ApiError, ErrorResponse},
    },
    auth::AuthService,
};

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "All portal users", body = UserListResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn list_users(headers: HeaderMap, auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let actor = match authenticate(&headers, &auth).await {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match auth.admin_list_users(&actor).await {
        Ok(users) => {
            let response = UserListResponse {
                users: users.into_iter().map(UserResponse::from).collect(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreateUserResponse),
        (status = 400, description = "Invalid email or weak password", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn create_user(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Json(request): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let actor = match authenticate(&headers, &auth).await {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match auth.admin_create_user(&actor, request.into()).await {
        Ok((user, reset)) => {
            let response = CreateUserResponse {
                user: UserResponse::from(user),
                reset: reset.map(ResetOutcomeResponse::from),
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/admin/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Weak password", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Would remove the last active admin", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn update_user(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let actor = match authenticate(&headers, &auth).await {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match auth.admin_set_user(&actor, user_id, request.into()).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/admin/users/{id}/password-reset",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Reset issued; link included if email failed", body = ResetOutcomeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn send_reset(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let actor = match authenticate(&headers, &auth).await {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match auth.admin_send_reset(&actor, user_id).await {
        Ok(outcome) => (StatusCode::OK, Json(ResetOutcomeResponse::from(outcome))).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/admin/users/{id}/sessions",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Live sessions revoked", body = RevokeSessionsResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn revoke_sessions(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let actor = match authenticate(&headers, &auth).await {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    match auth.admin_revoke_sessions(&actor, user_id).await {
        Ok(revoked) => (StatusCode::OK, Json(RevokeSessionsResponse { revoked })).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}
