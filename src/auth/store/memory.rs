//! In-process store for tests and single-node demos.
//!
//! All state sits behind one async mutex, held for the full duration of each
//! call, which makes every trait method atomic.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{AuthStore, BootstrapOutcome, GuardedUpdateOutcome, InsertUserOutcome};
use crate::auth::{
    guard::{self, GuardDecision},
    types::{LoginAttempt, NewUser, ResetRecord, Role, SessionRecord, User, UserUpdate},
};

#[derive(Debug, Clone)]
struct ResetRow {
    id: i64,
    user_id: i64,
    token_hash: Vec<u8>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<i64, User>,
    next_user_id: i64,
    sessions: HashMap<String, SessionRecord>,
    resets: Vec<ResetRow>,
    next_reset_id: i64,
    attempts: Vec<LoginAttempt>,
}

impl State {
    fn active_admins(&self) -> i64 {
        let count = self
            .users
            .values()
            .filter(|user| user.is_active_admin())
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn create_user(&mut self, user: &NewUser, now: DateTime<Utc>) -> User {
        self.next_user_id += 1;
        let created = User {
            id: self.next_user_id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            is_active: true,
            last_login: None,
            avatar_ref: None,
            created_at: now,
        };
        self.users.insert(created.id, created.clone());
        created
    }

    fn revoke_for_user(&mut self, user_id: i64, now: DateTime<Utc>) -> u64 {
        let mut revoked = 0;
        for session in self.sessions.values_mut() {
            if session.user_id == user_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        revoked
    }

    fn live_reset(&self, token_hash: &[u8], now: DateTime<Utc>) -> Option<usize> {
        self.resets.iter().position(|row| {
            row.token_hash == token_hash && row.used_at.is_none() && row.expires_at > now
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded login attempt, oldest first.
    pub async fn login_attempts(&self) -> Vec<LoginAttempt> {
        self.state.lock().await.attempts.clone()
    }

    pub async fn session(&self, jti: &str) -> Option<SessionRecord> {
        self.state.lock().await.sessions.get(jti).cloned()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.state.lock().await.users.values().cloned().collect())
    }

    async fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<InsertUserOutcome> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|existing| existing.email == user.email) {
            return Ok(InsertUserOutcome::Conflict);
        }
        Ok(InsertUserOutcome::Created(state.create_user(user, now)))
    }

    async fn bootstrap_admin(
        &self,
        user: &NewUser,
        now: DateTime<Utc>,
    ) -> Result<BootstrapOutcome> {
        let mut state = self.state.lock().await;
        let has_admin = state.users.values().any(|existing| existing.role.is_admin());
        if has_admin || state.users.values().any(|existing| existing.email == user.email) {
            return Ok(BootstrapOutcome::Closed);
        }
        let admin = NewUser {
            role: Role::Admin,
            ..user.clone()
        };
        Ok(BootstrapOutcome::Inserted(state.create_user(&admin, now)))
    }

    async fn touch_last_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.last_login = Some(now);
        }
        Ok(())
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
        }
        Ok(())
    }

    async fn count_active_admins(&self) -> Result<i64> {
        Ok(self.state.lock().await.active_admins())
    }

    async fn guarded_update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<GuardedUpdateOutcome> {
        let mut state = self.state.lock().await;
        let active_admins = state.active_admins();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(GuardedUpdateOutcome::NotFound);
        };

        let decision = guard::evaluate(user, update.role, update.is_active, active_admins);
        if let GuardDecision::Blocked { .. } = decision {
            return Ok(GuardedUpdateOutcome::Blocked(decision));
        }

        user.role = update.role;
        user.is_active = update.is_active;
        if let Some(first_name) = &update.first_name {
            first_name.clone_into(&mut user.first_name);
        }
        if let Some(last_name) = &update.last_name {
            last_name.clone_into(&mut user.last_name);
        }
        if let Some(hash) = &update.password_hash {
            user.password_hash = Some(hash.clone());
        }
        let updated = user.clone();

        if !updated.is_active {
            state.revoke_for_user(user_id, now);
        }
        Ok(GuardedUpdateOutcome::Applied(updated))
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        self.state.lock().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn recent_failure_count(
        &self,
        email: &str,
        origin: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let state = self.state.lock().await;
        let count = state
            .attempts
            .iter()
            .filter(|attempt| !attempt.success && attempt.created_at > since)
            .filter(|attempt| {
                attempt.email == email
                    || origin.is_some_and(|origin| attempt.origin.as_deref() == Some(origin))
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        self.state
            .lock()
            .await
            .sessions
            .insert(session.jti.clone(), session.clone());
        Ok(())
    }

    async fn find_active_session(
        &self,
        jti: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .get(jti)
            .filter(|session| session.revoked_at.is_none() && session.expires_at > now)
            .cloned())
    }

    async fn revoke_session(&self, jti: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(jti) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_sessions(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64> {
        Ok(self.state.lock().await.revoke_for_user(user_id, now))
    }

    async fn insert_password_reset(
        &self,
        user_id: i64,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        for row in &mut state.resets {
            if row.user_id == user_id && row.used_at.is_none() {
                row.used_at = Some(now);
            }
        }
        state.next_reset_id += 1;
        let id = state.next_reset_id;
        state.resets.push(ResetRow {
            id,
            user_id,
            token_hash: token_hash.to_vec(),
            expires_at,
            used_at: None,
        });
        Ok(())
    }

    async fn find_password_reset(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRecord>> {
        let state = self.state.lock().await;
        let Some(index) = state.live_reset(token_hash, now) else {
            return Ok(None);
        };
        let row = &state.resets[index];
        Ok(state.users.get(&row.user_id).map(|user| ResetRecord {
            id: row.id,
            user_id: row.user_id,
            email: user.email.clone(),
            expires_at: row.expires_at,
        }))
    }

    async fn consume_password_reset(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let mut state = self.state.lock().await;
        let Some(index) = state.live_reset(token_hash, now) else {
            return Ok(None);
        };
        let user_id = state.resets[index].user_id;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.password_hash = Some(new_password_hash.to_string());
        state.resets[index].used_at = Some(now);
        state.revoke_for_user(user_id, now);
        Ok(Some(user_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            password_hash: None,
        }
    }

    fn session(jti: &str, user_id: i64, now: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            jti: jti.to_string(),
            user_id,
            created_at: now,
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            remember: false,
            origin: None,
            user_agent_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn insert_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.insert_user(&new_user("a@example.com", Role::User), now).await.unwrap();
        assert!(matches!(first, InsertUserOutcome::Created(_)));
        let second = store.insert_user(&new_user("a@example.com", Role::User), now).await.unwrap();
        assert_eq!(second, InsertUserOutcome::Conflict);
    }

    #[tokio::test]
    async fn bootstrap_admin_closes_after_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.bootstrap_admin(&new_user("root@example.com", Role::User), now).await.unwrap();
        match first {
            BootstrapOutcome::Inserted(user) => assert_eq!(user.role, Role::Admin),
            BootstrapOutcome::Closed => panic!("expected bootstrap insert"),
        }
        let second = store.bootstrap_admin(&new_user("other@example.com", Role::User), now).await.unwrap();
        assert_eq!(second, BootstrapOutcome::Closed);
    }

    #[tokio::test]
    async fn deactivation_revokes_sessions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let InsertUserOutcome::Created(user) = store
            .insert_user(&new_user("a@example.com", Role::User), now)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        store.insert_session(&session("j1", user.id, now)).await.unwrap();

        let update = UserUpdate {
            role: Role::User,
            is_active: false,
            first_name: None,
            last_name: None,
            password_hash: None,
        };
        let outcome = store.guarded_update_user(user.id, &update, now).await.unwrap();
        assert!(matches!(outcome, GuardedUpdateOutcome::Applied(ref u) if !u.is_active));
        assert!(store.find_active_session("j1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_count_matches_email_or_origin_within_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (email, origin, success, age) in [
            ("a@example.com", "10.0.0.1", false, 1),
            ("b@example.com", "10.0.0.2", false, 2),
            ("c@example.com", "10.0.0.2", false, 3),
            ("a@example.com", "10.0.0.9", true, 1),
            ("a@example.com", "10.0.0.9", false, 30),
        ] {
            store
                .record_login_attempt(&LoginAttempt {
                    email: email.to_string(),
                    user_id: None,
                    origin: Some(origin.to_string()),
                    success,
                    created_at: now - Duration::minutes(age),
                })
                .await
                .unwrap();
        }
        let since = now - Duration::minutes(15);
        assert_eq!(store.recent_failure_count("a@example.com", Some("10.0.0.2"), since).await.unwrap(), 3);
        assert_eq!(store.recent_failure_count("a@example.com", None, since).await.unwrap(), 1);
        assert_eq!(store.recent_failure_count("z@example.com", None, since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn new_reset_supersedes_previous() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let InsertUserOutcome::Created(user) = store
            .insert_user(&new_user("a@example.com", Role::User), now)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        let expires = now + Duration::hours(1);
        store.insert_password_reset(user.id, b"first", expires, now).await.unwrap();
        store.insert_password_reset(user.id, b"second", expires, now).await.unwrap();
        assert!(store.find_password_reset(b"first", now).await.unwrap().is_none());
        assert!(store.find_password_reset(b"second", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reset_consumption_is_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let InsertUserOutcome::Created(user) = store
            .insert_user(&new_user("a@example.com", Role::User), now)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        store
            .insert_password_reset(user.id, b"tok", now + Duration::hours(1), now)
            .await
            .unwrap();
        store.insert_session(&session("j1", user.id, now)).await.unwrap();

        assert_eq!(store.consume_password_reset(b"tok", "hash", now).await.unwrap(), Some(user.id));
        assert_eq!(store.consume_password_reset(b"tok", "hash2", now).await.unwrap(), None);
        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("hash"));
        assert!(store.session("j1").await.unwrap().revoked_at.is_some());
    }
}
