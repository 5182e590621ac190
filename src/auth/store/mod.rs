//! Credential, session, reset-token and login-attempt persistence.
//!
//! Every write that the auth core relies on for an invariant is a single
//! store call, so each implementation can make it atomic on its own terms:
//! `PgStore` uses a transaction (plus an advisory lock where a count gates a
//! write) and `MemoryStore` holds one mutex for the whole call.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    guard::GuardDecision,
    types::{LoginAttempt, NewUser, ResetRecord, SessionRecord, User, UserUpdate},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertUserOutcome {
    Created(User),
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedUpdateOutcome {
    Applied(User),
    Blocked(GuardDecision),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Inserted(User),
    Closed,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<()>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Insert a new account. Email uniqueness is enforced by the store.
    async fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<InsertUserOutcome>;

    /// Insert the first admin only while no admin exists.
    async fn bootstrap_admin(&self, user: &NewUser, now: DateTime<Utc>)
    -> Result<BootstrapOutcome>;

    async fn touch_last_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<()>;

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<()>;

    async fn count_active_admins(&self) -> Result<i64>;

    /// Apply an admin edit under the last-admin guard.
    ///
    /// The guard is evaluated against a count read inside the same serialized
    /// unit as the write. Deactivation revokes the user's sessions in that
    /// same unit.
    async fn guarded_update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<GuardedUpdateOutcome>;

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<()>;

    /// Failed attempts after `since` matching the email OR the origin.
    async fn recent_failure_count(
        &self,
        email: &str,
        origin: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    async fn insert_session(&self, session: &SessionRecord) -> Result<()>;

    /// The session row for `jti` if it is neither revoked nor expired.
    async fn find_active_session(
        &self,
        jti: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>>;

    /// Mark one session revoked. Returns whether a live row was changed.
    async fn revoke_session(&self, jti: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Mark every live session of a user revoked. Returns how many changed.
    async fn revoke_user_sessions(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64>;

    /// Store a new reset token hash, superseding the user's unused ones.
    async fn insert_password_reset(
        &self,
        user_id: i64,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// The unused, unexpired reset token matching `token_hash`.
    async fn find_password_reset(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRecord>>;

    /// Consume a live reset token, store the new password hash and revoke all
    /// of the user's sessions as one unit. Returns the user id, or `None` when
    /// the token was not live (including when another request consumed it
    /// first).
    async fn consume_password_reset(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>>;
}
