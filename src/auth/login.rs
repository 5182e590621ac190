//! Credential check and session issuance.
//!
//! Flow Overview:
//! 1) Normalize the email and consult the rate limiter. A refused attempt is
//!    not recorded, so throttled clients cannot extend their own lockout.
//! 2) Look up the user. Unknown emails still spend one Argon2 hash so timing
//!    does not reveal whether the account exists.
//! 3) Verify the password, then the active flag, recording the outcome.
//! 4) On success, upgrade an outdated hash, issue a session and stamp
//!    `last_login`.

use tracing::{info, warn};

use super::{
    AuthService,
    error::LoginError,
    rate_limit::RateLimitDecision,
    session::IssuedSession,
    types::{LoginAttempt, RequestContext, User},
    utils::normalize_email,
};

#[derive(Clone, Debug)]
pub struct LoginSuccess {
    pub user: User,
    pub session: IssuedSession,
}

impl AuthService {
    /// # Errors
    /// See `LoginError`. Unknown email and wrong password both yield
    /// `InvalidCredentials`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
        ctx: &RequestContext,
    ) -> Result<LoginSuccess, LoginError> {
        let email = normalize_email(email);
        let now = self.now();

        let decision = self
            .rate_limiter
            .check(self.store.as_ref(), &email, ctx.origin.as_deref(), now)
            .await?;
        if decision == RateLimitDecision::Limited {
            warn!(origin = ?ctx.origin, "Login rate limited");
            return Err(LoginError::TooManyAttempts);
        }

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            self.hasher.equalize(password).await;
            self.record_attempt(&email, None, ctx, false).await?;
            return Err(LoginError::InvalidCredentials);
        };

        let Some(stored_hash) = user.password_hash.as_deref() else {
            self.record_attempt(&email, Some(user.id), ctx, false).await?;
            return Err(LoginError::NoPasswordSet);
        };

        if !self.hasher.verify(password, stored_hash).await? {
            self.record_attempt(&email, Some(user.id), ctx, false).await?;
            return Err(LoginError::InvalidCredentials);
        }

        if !user.is_active {
            self.record_attempt(&email, Some(user.id), ctx, false).await?;
            return Err(LoginError::AccountDisabled);
        }

        self.record_attempt(&email, Some(user.id), ctx, true).await?;
        if self.hasher.needs_rehash(stored_hash) {
            let upgraded = self.hasher.hash(password).await?;
            self.store.update_password_hash(user.id, &upgraded).await?;
            info!(user_id = user.id, "Upgraded password hash parameters");
        }
        let session = self.issue_session(&user, remember, ctx, now).await?;
        self.store.touch_last_login(user.id, now).await?;
        info!(user_id = user.id, remember, "User logged in");

        Ok(LoginSuccess { user, session })
    }

    async fn record_attempt(
        &self,
        email: &str,
        user_id: Option<i64>,
        ctx: &RequestContext,
        success: bool,
    ) -> anyhow::Result<()> {
        self.store
            .record_login_attempt(&LoginAttempt {
                email: email.to_string(),
                user_id,
                origin: ctx.origin.clone(),
                success,
                created_at: self.now(),
            })
            .await
    }
}
