use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    api::handlers::auth::types::{ResetOutcomeResponse, UserResponse},
    auth::{AdminUserUpdate, NewAccount, Role},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    /// Optional initial password; must satisfy the password policy.
    #[serde(default)]
    pub password: Option<String>,
    /// Email the new user a reset link.
    #[serde(default)]
    pub send_reset: bool,
}

const fn default_role() -> Role {
    Role::User
}

impl From<CreateUserRequest> for NewAccount {
    fn from(request: CreateUserRequest) -> Self {
        Self {
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
            password: request.password.filter(|password| !password.is_empty()),
            send_reset: request.send_reset,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetOutcomeResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateUserRequest {
    pub role: Role,
    pub is_active: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

impl From<UpdateUserRequest> for AdminUserUpdate {
    fn from(request: UpdateUserRequest) -> Self {
        Self {
            role: request.role,
            is_active: request.is_active,
            first_name: request.first_name.map(|name| name.trim().to_string()),
            last_name: request.last_name.map(|name| name.trim().to_string()),
            new_password: request.new_password.filter(|password| !password.is_empty()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokeSessionsResponse {
    pub revoked: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults_to_user_role() {
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"email":"a@example.com"}"#).unwrap();
        let account = NewAccount::from(request);
        assert_eq!(account.role, Role::User);
        assert!(account.password.is_none());
        assert!(!account.send_reset);
    }

    #[test]
    fn empty_password_means_none() {
        let request: UpdateUserRequest =
            serde_json::from_str(r#"{"role":"admin","is_active":true,"new_password":""}"#).unwrap();
        let update = AdminUserUpdate::from(request);
        assert_eq!(update.role, Role::Admin);
        assert!(update.new_password.is_none());
    }
}
