//! Domain records shared by the auth core, the stores and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use super::utils::sha256_hex;

/// Portal role. Stored as `User`/`Admin`, parsed case-insensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(alias = "user")]
    User,
    #[serde(alias = "admin")]
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Admin => "Admin",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("user") {
            Ok(Self::User)
        } else if trimmed.eq_ignore_ascii_case("admin") {
            Ok(Self::Admin)
        } else {
            Err(UnknownRole(trimmed.to_string()))
        }
    }
}

/// A portal account as persisted by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub avatar_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Whether this account counts toward the last-admin invariant.
    #[must_use]
    pub const fn is_active_admin(&self) -> bool {
        self.is_active && self.role.is_admin()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "***"),
            )
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("last_login", &self.last_login)
            .field("avatar_ref", &self.avatar_ref)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Fields for provisioning a new account.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Admin edit of an existing account. `None` keeps the stored value.
#[derive(Clone, Debug)]
pub struct UserUpdate {
    pub role: Role,
    pub is_active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Per-request client details, passed explicitly to every operation that
/// records or audits the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(origin: Option<String>, user_agent: Option<String>) -> Self {
        Self { origin, user_agent }
    }

    /// SHA-256 of the user agent, stored with the session for audit.
    #[must_use]
    pub fn user_agent_hash(&self) -> String {
        sha256_hex(self.user_agent.as_deref().unwrap_or_default())
    }
}

/// Server-side half of a session: the revocation ledger row keyed by `jti`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub jti: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub remember: bool,
    pub origin: Option<String>,
    pub user_agent_hash: String,
}

/// Append-only login audit row, also the rate limiter's input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginAttempt {
    pub email: String,
    pub user_id: Option<i64>,
    pub origin: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// A live (unused, unexpired) password-reset token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetRecord {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" ADMIN ".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("User".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_round_trips_through_display() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn user_debug_redacts_password_hash() {
        let user = User {
            id: 1,
            email: "a@example.com".to_string(),
            password_hash: Some("$argon2id$secret".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::User,
            is_active: true,
            last_login: None,
            avatar_ref: None,
            created_at: Utc::now(),
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("secret"));
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn user_agent_hash_is_hex_sha256() {
        let ctx = RequestContext::new(None, Some("curl/8".to_string()));
        let hash = ctx.user_agent_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash, RequestContext::default().user_agent_hash());
    }
}
