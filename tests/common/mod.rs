#![allow(dead_code, clippy::unwrap_used)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_auth::auth::{
    AuthConfig, AuthService, AuthStore, Clock, EmailMessage, EmailSender, ManualClock, MemoryStore,
    PasswordHasher, Principal, RequestContext, Role, TokenSigner, User,
    store::InsertUserOutcome,
    types::{NewUser, UserUpdate},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;

pub const BASE_URL: &str = "https://portal.test";
pub const STRONG_PASSWORD: &str = "Sturdy#Passw0rd";

/// Email sender that keeps every message and can be told to fail or stall.
#[derive(Default)]
pub struct CapturingSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl CapturingSender {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Poll until at least `count` messages were captured, or give up after two seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..200 {
            let sent = self.sent().await;
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent().await
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// Token from the most recent reset email.
    pub async fn last_reset_token(&self) -> Option<String> {
        let sent = self.sent.lock().await;
        sent.last().and_then(|message| token_from_text(&message.body))
    }
}

#[async_trait]
impl EmailSender for CapturingSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("smtp unavailable");
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

pub fn token_from_text(text: &str) -> Option<String> {
    let (_, rest) = text.split_once("token=")?;
    let token: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if token.is_empty() { None } else { Some(token) }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap()
}

pub struct Harness {
    pub auth: Arc<AuthService>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub mail: Arc<CapturingSender>,
    pub hasher: PasswordHasher,
    pub signer: TokenSigner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::new().with_base_url(BASE_URL))
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(start_time());
        let mail = Arc::new(CapturingSender::default());
        let hasher = PasswordHasher::with_params(8, 1, 1).unwrap();
        let signer = TokenSigner::generate("test-key");

        let auth = AuthService::new(
            config,
            store.clone() as Arc<dyn AuthStore>,
            signer.clone(),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_email_sender(mail.clone() as Arc<dyn EmailSender>)
        .with_hasher(hasher.clone());

        Self {
            auth: Arc::new(auth),
            store,
            clock,
            mail,
            hasher,
            signer,
        }
    }

    pub async fn seed_user(&self, email: &str, password: Option<&str>, role: Role) -> User {
        let password_hash = match password {
            Some(password) => Some(self.hasher.hash(password).await.unwrap()),
            None => None,
        };
        let new_user = NewUser {
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            password_hash,
        };
        match self.store.insert_user(&new_user, self.clock.now()).await.unwrap() {
            InsertUserOutcome::Created(user) => user,
            InsertUserOutcome::Conflict => panic!("duplicate seed email {email}"),
        }
    }

    /// Flip `is_active` directly in the store, bypassing the admin guard's actor checks.
    pub async fn set_active(&self, user: &User, is_active: bool) {
        let update = UserUpdate {
            role: user.role,
            is_active,
            first_name: None,
            last_name: None,
            password_hash: None,
        };
        self.store
            .guarded_update_user(user.id, &update, self.clock.now())
            .await
            .unwrap();
    }

    /// Log in and verify, yielding the acting principal and its token.
    pub async fn principal(&self, email: &str, password: &str) -> (Principal, String) {
        let success = self
            .auth
            .login(email, password, false, &ctx())
            .await
            .unwrap();
        let principal = self
            .auth
            .verify_session(&success.session.token)
            .await
            .unwrap();
        (principal, success.session.token)
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new(
        Some("203.0.113.7".to_string()),
        Some("integration-test".to_string()),
    )
}

pub fn ctx_from(origin: &str) -> RequestContext {
    RequestContext::new(Some(origin.to_string()), Some("integration-test".to_string()))
}
