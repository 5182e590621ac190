//! Admin-only account management.
//!
//! Every operation takes the acting `Principal` (already verified, user row
//! re-read) and refuses non-admins with `Forbidden`.

use tracing::{info, warn};

use super::{
    AuthService,
    error::AdminError,
    guard::{self, GuardDecision},
    reset::ResetRequestOutcome,
    session::Principal,
    store::{BootstrapOutcome, GuardedUpdateOutcome, InsertUserOutcome},
    types::{NewUser, Role, User, UserUpdate},
    utils::{normalize_email, valid_email},
};

/// Target state for an admin edit. Names and password are optional.
#[derive(Clone, Debug)]
pub struct AdminUserUpdate {
    pub role: Role,
    pub is_active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub new_password: Option<String>,
}

/// Account provisioned by an admin. Without a password the user can only get
/// in through a reset link.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password: Option<String>,
    pub send_reset: bool,
}

impl AuthService {
    /// # Errors
    /// `Forbidden` unless the principal currently holds the Admin role.
    pub fn require_admin(&self, actor: &Principal) -> Result<(), AdminError> {
        if actor.is_admin() {
            Ok(())
        } else {
            warn!(user_id = actor.user.id, email = %actor.user.email, "Admin action refused");
            Err(AdminError::Forbidden)
        }
    }

    /// Preview whether a role/active change would be allowed right now.
    ///
    /// Advisory only; `admin_set_user` re-evaluates inside its transaction.
    ///
    /// # Errors
    /// `NotFound` for unknown targets, `Internal` on store failures.
    pub async fn can_mutate(
        &self,
        target_id: i64,
        new_role: Role,
        new_active: bool,
    ) -> Result<GuardDecision, AdminError> {
        let target = self
            .store
            .find_user_by_id(target_id)
            .await?
            .ok_or(AdminError::NotFound)?;
        if !guard::demotes_admin(&target, new_role, new_active) {
            return Ok(GuardDecision::Allowed);
        }
        let active_admins = self.store.count_active_admins().await?;
        Ok(guard::evaluate(&target, new_role, new_active, active_admins))
    }

    /// # Errors
    /// `Forbidden`, `NotFound`, `Policy` for a weak new password, or
    /// `Blocked` when the change would leave no active admin.
    pub async fn admin_set_user(
        &self,
        actor: &Principal,
        target_id: i64,
        update: AdminUserUpdate,
    ) -> Result<User, AdminError> {
        self.require_admin(actor)?;

        let password_hash = match update.new_password.as_deref() {
            Some(password) => Some(self.hash_new_password(password).await?),
            None => None,
        };
        let update = UserUpdate {
            role: update.role,
            is_active: update.is_active,
            first_name: update.first_name,
            last_name: update.last_name,
            password_hash,
        };

        match self
            .store
            .guarded_update_user(target_id, &update, self.now())
            .await?
        {
            GuardedUpdateOutcome::Applied(user) => {
                info!(
                    actor_id = actor.user.id,
                    user_id = user.id,
                    role = %user.role,
                    is_active = user.is_active,
                    "Admin updated user"
                );
                Ok(user)
            }
            GuardedUpdateOutcome::Blocked(GuardDecision::Blocked { reason }) => {
                warn!(actor_id = actor.user.id, user_id = target_id, "{reason}");
                Err(AdminError::Blocked(reason))
            }
            GuardedUpdateOutcome::Blocked(GuardDecision::Allowed) => Err(AdminError::Internal(
                anyhow::anyhow!("store reported an allowed decision as blocked"),
            )),
            GuardedUpdateOutcome::NotFound => Err(AdminError::NotFound),
        }
    }

    /// # Errors
    /// `Forbidden`, `InvalidEmail`, `EmailTaken` or `Policy`.
    pub async fn admin_create_user(
        &self,
        actor: &Principal,
        account: NewAccount,
    ) -> Result<(User, Option<ResetRequestOutcome>), AdminError> {
        self.require_admin(actor)?;

        let email = normalize_email(&account.email);
        if !valid_email(&email) {
            return Err(AdminError::InvalidEmail);
        }
        let password_hash = match account.password.as_deref() {
            Some(password) => Some(self.hash_new_password(password).await?),
            None => None,
        };
        let new_user = NewUser {
            email,
            first_name: account.first_name.trim().to_string(),
            last_name: account.last_name.trim().to_string(),
            role: account.role,
            password_hash,
        };

        let user = match self.store.insert_user(&new_user, self.now()).await? {
            InsertUserOutcome::Created(user) => user,
            InsertUserOutcome::Conflict => return Err(AdminError::EmailTaken),
        };
        info!(actor_id = actor.user.id, user_id = user.id, role = %user.role, "Admin created user");

        let reset = if account.send_reset {
            Some(self.issue_reset(user.id, &user.email).await?)
        } else {
            None
        };
        Ok((user, reset))
    }

    /// # Errors
    /// `Forbidden` or `Internal`.
    pub async fn admin_list_users(&self, actor: &Principal) -> Result<Vec<User>, AdminError> {
        self.require_admin(actor)?;
        Ok(self.store.list_users().await?)
    }

    /// Issue a reset link for a user. The outcome, including a fallback link,
    /// goes back to the admin.
    ///
    /// # Errors
    /// `Forbidden`, `NotFound` or `Internal`.
    pub async fn admin_send_reset(
        &self,
        actor: &Principal,
        target_id: i64,
    ) -> Result<ResetRequestOutcome, AdminError> {
        self.require_admin(actor)?;
        let target = self
            .store
            .find_user_by_id(target_id)
            .await?
            .ok_or(AdminError::NotFound)?;
        info!(actor_id = actor.user.id, user_id = target.id, "Admin triggered password reset");
        Ok(self.issue_reset(target.id, &target.email).await?)
    }

    /// # Errors
    /// `Forbidden`, `NotFound` or `Internal`.
    pub async fn admin_revoke_sessions(
        &self,
        actor: &Principal,
        target_id: i64,
    ) -> Result<u64, AdminError> {
        self.require_admin(actor)?;
        if self.store.find_user_by_id(target_id).await?.is_none() {
            return Err(AdminError::NotFound);
        }
        let revoked = self
            .store
            .revoke_user_sessions(target_id, self.now())
            .await?;
        info!(actor_id = actor.user.id, user_id = target_id, revoked, "Admin revoked sessions");
        Ok(revoked)
    }

    /// Create the first admin account when none exists yet, then send it a
    /// reset link so it can choose a password.
    ///
    /// Returns `None` when an admin already exists.
    ///
    /// # Errors
    /// `InvalidEmail` or `Internal`.
    pub async fn bootstrap_admin(
        &self,
        email: &str,
    ) -> Result<Option<(User, ResetRequestOutcome)>, AdminError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AdminError::InvalidEmail);
        }
        let new_user = NewUser {
            email,
            first_name: String::new(),
            last_name: String::new(),
            role: Role::Admin,
            password_hash: None,
        };
        match self.store.bootstrap_admin(&new_user, self.now()).await? {
            BootstrapOutcome::Inserted(user) => {
                info!(user_id = user.id, "Bootstrapped first admin");
                let outcome = self.issue_reset(user.id, &user.email).await?;
                Ok(Some((user, outcome)))
            }
            BootstrapOutcome::Closed => Ok(None),
        }
    }
}
