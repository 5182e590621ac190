//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{ResetRequestOutcome, Role, User};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub avatar_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_active: user.is_active,
            last_login: user.last_login,
            avatar_ref: user.avatar_ref,
            created_at: user.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// Same value as the session cookie, for clients using bearer auth.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct ResetTokenQuery {
    /// Raw token from the reset link.
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetTokenResponse {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetCompleteRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResetDeliveryStatus {
    Sent,
    DeliveryFailed,
    NoSuchUser,
}

/// Reset outcome as reported to admins. `reset_url` is only present when the
/// email could not be delivered.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetOutcomeResponse {
    pub status: ResetDeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_url: Option<String>,
}

impl From<ResetRequestOutcome> for ResetOutcomeResponse {
    fn from(outcome: ResetRequestOutcome) -> Self {
        match outcome {
            ResetRequestOutcome::Sent => Self {
                status: ResetDeliveryStatus::Sent,
                reset_url: None,
            },
            ResetRequestOutcome::DeliveryFailed { reset_url } => Self {
                status: ResetDeliveryStatus::DeliveryFailed,
                reset_url: Some(reset_url),
            },
            ResetRequestOutcome::NoSuchUser => Self {
                status: ResetDeliveryStatus::NoSuchUser,
                reset_url: None,
            },
        }
    }
}
