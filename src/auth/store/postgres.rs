//! Postgres-backed store.
//!
//! Flow Overview:
//! 1) Plain lookups run directly on the pool.
//! 2) Writes that must be atomic (guarded admin edits, reset consumption,
//!    bootstrap) run in one transaction.
//! 3) Count-then-write paths take `pg_advisory_xact_lock` first so concurrent
//!    transactions serialize on the same decision.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::Instrument;

use super::{AuthStore, BootstrapOutcome, GuardedUpdateOutcome, InsertUserOutcome};
use crate::auth::{
    guard::{self, GuardDecision},
    types::{LoginAttempt, NewUser, ResetRecord, Role, SessionRecord, User, UserUpdate},
};

/// Serializes every write that depends on the active-admin count.
const ADMIN_GUARD_LOCK_ID: i64 = 7_310_042;

/// Schema applied by `portal-auth server --apply-schema`.
pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create missing tables and indexes. Safe to run repeatedly.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = "sql/schema.sql"
        );
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        role: role
            .parse::<Role>()
            .map_err(|err| anyhow!("invalid role stored for user: {err}"))?,
        is_active: row.try_get("is_active")?,
        last_login: row.try_get("last_login")?,
        avatar_ref: row.try_get("avatar_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn acquire_guard_lock(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    let lock_query = "SELECT pg_advisory_xact_lock($1)";
    let lock_span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = lock_query
    );
    sqlx::query(lock_query)
        .bind(ADMIN_GUARD_LOCK_ID)
        .execute(&mut **tx)
        .instrument(lock_span)
        .await
        .context("failed to acquire admin guard lock")?;
    Ok(())
}

async fn revoke_user_sessions_in(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let query = r"
        UPDATE sessions
        SET revoked_at = $2
        WHERE user_id = $1
          AND revoked_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(now)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke user sessions")?;
    Ok(result.rows_affected())
}

#[async_trait]
impl AuthStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let query = "SELECT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("database ping failed")?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, first_name, last_name, role,
                   is_active, last_login, avatar_ref, created_at
            FROM users
            WHERE email = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, first_name, last_name, role,
                   is_active, last_login, avatar_ref, created_at
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let query = r"
            SELECT id, email, password_hash, first_name, last_name, role,
                   is_active, last_login, avatar_ref, created_at
            FROM users
            ORDER BY id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list users")?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<InsertUserOutcome> {
        let query = r"
            INSERT INTO users (email, password_hash, first_name, last_name, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            RETURNING id, email, password_hash, first_name, last_name, role,
                      is_active, last_login, avatar_ref, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;
        match result {
            Ok(row) => Ok(InsertUserOutcome::Created(user_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn bootstrap_admin(
        &self,
        user: &NewUser,
        now: DateTime<Utc>,
    ) -> Result<BootstrapOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin bootstrap transaction")?;
        acquire_guard_lock(&mut tx).await?;

        let count_query = "SELECT COUNT(*) AS count FROM users WHERE role = 'Admin'";
        let count_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = count_query
        );
        let row = sqlx::query(count_query)
            .fetch_one(&mut *tx)
            .instrument(count_span)
            .await
            .context("failed to count admins")?;
        let count: i64 = row.try_get("count")?;
        if count != 0 {
            tx.rollback()
                .await
                .context("failed to rollback bootstrap transaction")?;
            return Ok(BootstrapOutcome::Closed);
        }

        let insert_query = r"
            INSERT INTO users (email, password_hash, first_name, last_name, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, 'Admin', TRUE, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, password_hash, first_name, last_name, role,
                      is_active, last_login, avatar_ref, created_at
        ";
        let insert_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert_query
        );
        let row = sqlx::query(insert_query)
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(insert_span)
            .await
            .context("failed to insert bootstrap admin")?;
        let Some(row) = row else {
            tx.rollback()
                .await
                .context("failed to rollback bootstrap transaction")?;
            return Ok(BootstrapOutcome::Closed);
        };
        let admin = user_from_row(&row)?;

        tx.commit()
            .await
            .context("failed to commit bootstrap transaction")?;
        Ok(BootstrapOutcome::Inserted(admin))
    }

    async fn touch_last_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE users SET last_login = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update last login")?;
        Ok(())
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }

    async fn count_active_admins(&self) -> Result<i64> {
        let query = "SELECT COUNT(*) AS count FROM users WHERE role = 'Admin' AND is_active";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count active admins")?;
        Ok(row.try_get("count")?)
    }

    async fn guarded_update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<GuardedUpdateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin user update transaction")?;
        acquire_guard_lock(&mut tx).await?;

        let select_query = r"
            SELECT id, email, password_hash, first_name, last_name, role,
                   is_active, last_login, avatar_ref, created_at
            FROM users
            WHERE id = $1
            FOR UPDATE
        ";
        let select_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = select_query
        );
        let row = sqlx::query(select_query)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .instrument(select_span)
            .await
            .context("failed to lock user row")?;
        let Some(row) = row else {
            tx.rollback()
                .await
                .context("failed to rollback user update transaction")?;
            return Ok(GuardedUpdateOutcome::NotFound);
        };
        let current = user_from_row(&row)?;

        if guard::demotes_admin(&current, update.role, update.is_active) {
            let count_query =
                "SELECT COUNT(*) AS count FROM users WHERE role = 'Admin' AND is_active";
            let count_span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = count_query
            );
            let row = sqlx::query(count_query)
                .fetch_one(&mut *tx)
                .instrument(count_span)
                .await
                .context("failed to count active admins")?;
            let active_admins: i64 = row.try_get("count")?;
            let decision = guard::evaluate(&current, update.role, update.is_active, active_admins);
            if let GuardDecision::Blocked { .. } = decision {
                tx.rollback()
                    .await
                    .context("failed to rollback user update transaction")?;
                return Ok(GuardedUpdateOutcome::Blocked(decision));
            }
        }

        let update_query = r"
            UPDATE users
            SET role = $2,
                is_active = $3,
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                password_hash = COALESCE($6, password_hash)
            WHERE id = $1
            RETURNING id, email, password_hash, first_name, last_name, role,
                      is_active, last_login, avatar_ref, created_at
        ";
        let update_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = update_query
        );
        let row = sqlx::query(update_query)
            .bind(user_id)
            .bind(update.role.as_str())
            .bind(update.is_active)
            .bind(update.first_name.as_deref())
            .bind(update.last_name.as_deref())
            .bind(update.password_hash.as_deref())
            .fetch_one(&mut *tx)
            .instrument(update_span)
            .await
            .context("failed to update user")?;
        let updated = user_from_row(&row)?;

        if !updated.is_active {
            revoke_user_sessions_in(&mut tx, user_id, now).await?;
        }

        tx.commit()
            .await
            .context("failed to commit user update transaction")?;
        Ok(GuardedUpdateOutcome::Applied(updated))
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        let query = r"
            INSERT INTO login_attempts (email, user_id, origin_address, success, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&attempt.email)
            .bind(attempt.user_id)
            .bind(attempt.origin.as_deref())
            .bind(attempt.success)
            .bind(attempt.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;
        Ok(())
    }

    async fn recent_failure_count(
        &self,
        email: &str,
        origin: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let query = r"
            SELECT COUNT(*) AS count
            FROM login_attempts
            WHERE success = FALSE
              AND created_at > $3
              AND (email = $1 OR ($2::text IS NOT NULL AND origin_address = $2))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(origin)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count recent login failures")?;
        Ok(row.try_get("count")?)
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let query = r"
            INSERT INTO sessions (jti, user_id, created_at, expires_at, remember, origin_address, user_agent_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&session.jti)
            .bind(session.user_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .bind(session.remember)
            .bind(session.origin.as_deref())
            .bind(&session.user_agent_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn find_active_session(
        &self,
        jti: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT jti, user_id, created_at, expires_at, revoked_at, remember,
                   origin_address, user_agent_hash
            FROM sessions
            WHERE jti = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        row.map(|row| {
            Ok::<_, anyhow::Error>(SessionRecord {
                jti: row.try_get("jti")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
                revoked_at: row.try_get("revoked_at")?,
                remember: row.try_get("remember")?,
                origin: row.try_get("origin_address")?,
                user_agent_hash: row.try_get("user_agent_hash")?,
            })
        })
        .transpose()
    }

    async fn revoke_session(&self, jti: &str, now: DateTime<Utc>) -> Result<bool> {
        let query = r"
            UPDATE sessions
            SET revoked_at = $2
            WHERE jti = $1
              AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(jti)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_sessions(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin revoke transaction")?;
        let revoked = revoke_user_sessions_in(&mut tx, user_id, now).await?;
        tx.commit()
            .await
            .context("failed to commit revoke transaction")?;
        Ok(revoked)
    }

    async fn insert_password_reset(
        &self,
        user_id: i64,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin password reset transaction")?;

        let supersede_query = r"
            UPDATE password_resets
            SET used_at = $2
            WHERE user_id = $1
              AND used_at IS NULL
        ";
        let supersede_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = supersede_query
        );
        sqlx::query(supersede_query)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(supersede_span)
            .await
            .context("failed to supersede previous reset tokens")?;

        let insert_query = r"
            INSERT INTO password_resets (user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
        ";
        let insert_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert_query
        );
        sqlx::query(insert_query)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .bind(now)
            .execute(&mut *tx)
            .instrument(insert_span)
            .await
            .context("failed to insert password reset token")?;

        tx.commit()
            .await
            .context("failed to commit password reset transaction")?;
        Ok(())
    }

    async fn find_password_reset(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRecord>> {
        let query = r"
            SELECT pr.id, pr.user_id, u.email, pr.expires_at
            FROM password_resets pr
            JOIN users u ON u.id = pr.user_id
            WHERE pr.token_hash = $1
              AND pr.used_at IS NULL
              AND pr.expires_at > $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup password reset token")?;
        row.map(|row| {
            Ok::<_, anyhow::Error>(ResetRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                email: row.try_get("email")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn consume_password_reset(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin reset completion transaction")?;

        let consume_query = r"
            UPDATE password_resets
            SET used_at = $2
            WHERE token_hash = $1
              AND used_at IS NULL
              AND expires_at > $2
            RETURNING user_id
        ";
        let consume_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = consume_query
        );
        let row = sqlx::query(consume_query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(consume_span)
            .await
            .context("failed to consume password reset token")?;
        let Some(row) = row else {
            tx.rollback()
                .await
                .context("failed to rollback reset completion transaction")?;
            return Ok(None);
        };
        let user_id: i64 = row.try_get("user_id")?;

        let password_query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let password_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = password_query
        );
        sqlx::query(password_query)
            .bind(user_id)
            .bind(new_password_hash)
            .execute(&mut *tx)
            .instrument(password_span)
            .await
            .context("failed to update password hash")?;

        revoke_user_sessions_in(&mut tx, user_id, now).await?;

        tx.commit()
            .await
            .context("failed to commit reset completion transaction")?;
        Ok(Some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_every_table() {
        for table in ["users", "sessions", "password_resets", "login_attempts"] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "schema is missing {table}"
            );
        }
    }

    #[test]
    fn is_unique_violation_ignores_non_database_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
