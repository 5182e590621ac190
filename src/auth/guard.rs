//! Last-admin guard.
//!
//! Decides whether a role/active-flag change may proceed without leaving the
//! portal with zero active administrators.

use super::types::{Role, User};

pub const LAST_ADMIN_REASON: &str =
    "Cannot remove admin privileges or deactivate the last active Admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Blocked { reason: &'static str },
}

impl GuardDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Whether the change demotes or deactivates an admin account.
///
/// Judged on the stored role alone, so an already disabled admin is covered
/// too. Only such changes need the admin count.
#[must_use]
pub fn demotes_admin(current: &User, new_role: Role, new_active: bool) -> bool {
    current.role.is_admin() && (!new_role.is_admin() || !new_active)
}

/// `active_admins` must be read in the same serialized unit as the write
/// that follows an `Allowed` decision.
#[must_use]
pub fn evaluate(current: &User, new_role: Role, new_active: bool, active_admins: i64) -> GuardDecision {
    if demotes_admin(current, new_role, new_active) && active_admins <= 1 {
        GuardDecision::Blocked {
            reason: LAST_ADMIN_REASON,
        }
    } else {
        GuardDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role, is_active: bool) -> User {
        User {
            id: 7,
            email: "admin@example.com".to_string(),
            password_hash: None,
            first_name: "Ada".to_string(),
            last_name: "Admin".to_string(),
            role,
            is_active,
            last_login: None,
            avatar_ref: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn blocks_demoting_sole_admin() {
        let admin = user(Role::Admin, true);
        assert_eq!(
            evaluate(&admin, Role::User, true, 1),
            GuardDecision::Blocked {
                reason: LAST_ADMIN_REASON
            }
        );
    }

    #[test]
    fn blocks_deactivating_sole_admin() {
        let admin = user(Role::Admin, true);
        assert!(!evaluate(&admin, Role::Admin, false, 1).is_allowed());
    }

    #[test]
    fn allows_demotion_with_another_admin() {
        let admin = user(Role::Admin, true);
        assert!(evaluate(&admin, Role::User, true, 2).is_allowed());
    }

    #[test]
    fn allows_no_op_on_sole_admin() {
        let admin = user(Role::Admin, true);
        assert!(evaluate(&admin, Role::Admin, true, 1).is_allowed());
    }

    #[test]
    fn ignores_regular_users() {
        let regular = user(Role::User, true);
        assert!(evaluate(&regular, Role::User, false, 0).is_allowed());
        assert!(evaluate(&regular, Role::Admin, true, 1).is_allowed());
    }

    #[test]
    fn disabled_admin_follows_the_same_rule() {
        let disabled = user(Role::Admin, false);
        assert!(demotes_admin(&disabled, Role::User, false));
        assert!(!evaluate(&disabled, Role::User, false, 1).is_allowed());
        assert!(evaluate(&disabled, Role::User, false, 2).is_allowed());
    }

    #[test]
    fn reactivating_disabled_admin_is_not_a_demotion() {
        let disabled = user(Role::Admin, false);
        assert!(!demotes_admin(&disabled, Role::Admin, true));
        assert!(evaluate(&disabled, Role::Admin, true, 0).is_allowed());
    }
}
